pub mod clock;
pub mod errors;
pub mod invite_service;
pub mod lobby_service;
pub mod matchmaking_service;
pub mod player;
pub mod presence_service;
pub mod room;
pub mod room_matcher;
