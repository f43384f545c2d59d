use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use shared::models::matchmaking::MatchResponse;
use tracing::info;

use super::ClockQuery;
use crate::{
    error::ApiError,
    middleware::session::{Session, USER_ID_HEADER},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/play", get(quick_match))
}

/// Waits for a quick-match opponent. Visitors without a session get a
/// fresh id, echoed back in the `x-user-id` header for the game socket.
async fn quick_match(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ClockQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = session.or_mint(&state.config.lobby.default_username);
    info!("{} is looking for a {} minute game", user.id, query.clock);

    let outcome = state.lobby.request_quick_match(&user, query.clock).await?;

    Ok((
        [(USER_ID_HEADER, user.id)],
        Json(MatchResponse::from(outcome)),
    ))
}
