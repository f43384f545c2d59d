use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};

use crate::{middleware::session::Session, state::AppState, websocket};

pub fn routes() -> Router<AppState> {
    Router::new().route("/livedata", get(live_data))
}

async fn live_data(State(state): State<AppState>, session: Session, ws: WebSocketUpgrade) -> Response {
    let user = session.or_mint(&state.config.lobby.default_username);
    let pong_wait = state.config.pong_wait;

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let connection = websocket::into_connection(socket, pong_wait);
            state.lobby.subscribe_presence(&user, connection).await;
        })
}
