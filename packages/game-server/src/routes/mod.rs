pub mod game;
pub mod health;
pub mod invite;
pub mod livedata;
pub mod play;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ClockQuery {
    pub clock: u32,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}
