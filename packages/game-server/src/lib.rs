use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use shared::services::lobby_service::LobbyService;
use tower_http::cors::CorsLayer;
use tracing::warn;

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod websocket;

use config::Config;
use middleware::session::{USERNAME_HEADER, USER_ID_HEADER};
use state::AppState;

/// Builds the full router around a running lobby.
pub fn app(lobby: LobbyService, config: Config) -> Router {
    let cors = cors_layer(&config.allowed_origin);
    let app_state = AppState {
        lobby,
        config: Arc::new(config),
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::play::routes())
        .merge(routes::invite::routes())
        .merge(routes::game::routes())
        .merge(routes::livedata::routes())
        .layer(cors)
        .with_state(app_state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USERNAME_HEADER),
        ])
        .expose_headers([HeaderName::from_static(USER_ID_HEADER)])
        .allow_credentials(true);

    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("Ignoring unusable allowed origin {:?}: {}", allowed_origin, e);
            layer
        }
    }
}
