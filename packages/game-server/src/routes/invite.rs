use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::models::matchmaking::MatchResponse;
use tracing::info;

use super::{ClockQuery, IdQuery};
use crate::{error::ApiError, middleware::session::Session, state::AppState, websocket};

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteCreated {
    #[serde(rename = "inviteId")]
    pub invite_id: String,
    pub clock: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invite", post(create_invite))
        .route("/invite/join", post(join_invite))
        .route("/invite/wait", get(wait_for_opponent))
}

async fn create_invite(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ClockQuery>,
) -> Result<Json<InviteCreated>, ApiError> {
    let host = session.require()?;
    let invite = state.lobby.create_invite(&host, query.clock).await?;

    Ok(Json(InviteCreated {
        invite_id: invite.invite_id,
        clock: invite.time_control.minutes(),
    }))
}

async fn join_invite(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<IdQuery>,
) -> Result<Json<MatchResponse>, ApiError> {
    let joiner = session.require()?;
    let assignment = state.lobby.join_invite(&query.id, &joiner).await?;

    Ok(Json(MatchResponse::from(assignment)))
}

/// Holds the host's socket open until the invite is joined or expires.
async fn wait_for_opponent(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<IdQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let host = session.require()?;
    state.lobby.check_invite_host(&query.id, &host).await?;

    let pong_wait = state.config.pong_wait;
    Ok(ws
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let connection = websocket::into_connection(socket, pong_wait);
            let outcome = state.lobby.wait_on_invite(&query.id, connection).await;
            info!("Invite {} settled: {:?}", query.id, outcome);
        }))
}
