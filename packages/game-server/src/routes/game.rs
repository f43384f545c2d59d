use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::{error::ApiError, middleware::session::Session, state::AppState, websocket};

#[derive(Debug, Deserialize)]
pub struct GameQuery {
    pub id: String,
    pub clock: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/game", get(join_room))
}

async fn join_room(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<GameQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = session.require()?;
    state.lobby.check_seat(&query.id, &user, query.clock).await?;

    let pong_wait = state.config.pong_wait;
    Ok(ws
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let connection = websocket::into_connection(socket, pong_wait);
            if let Err(e) = state
                .lobby
                .attach_to_room(&query.id, &user, query.clock, connection)
                .await
            {
                warn!("{} could not join match {}: {}", user.id, query.id, e);
            }
        }))
}
