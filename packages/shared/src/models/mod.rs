pub mod color;
pub mod matchmaking;
pub mod messages;
pub mod presence;
pub mod time_control;
pub mod user;
