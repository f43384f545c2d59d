use std::sync::Arc;

use shared::services::lobby_service::LobbyService;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub lobby: LobbyService,
    pub config: Arc<Config>,
}
