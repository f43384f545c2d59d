use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use shared::services::errors::{
    invite_service_errors::InviteServiceError, lobby_service_errors::LobbyServiceError,
    matchmaking_service_errors::MatchmakingServiceError,
};
use tracing::{debug, error};

#[derive(Debug)]
pub enum ApiError {
    Lobby(LobbyServiceError),
    BadRequest(String),
    Unauthorized,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Lobby(err) => write!(f, "{}", err),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized => write!(f, "No session"),
        }
    }
}

impl From<LobbyServiceError> for ApiError {
    fn from(error: LobbyServiceError) -> Self {
        ApiError::Lobby(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Lobby(LobbyServiceError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ApiError::Lobby(LobbyServiceError::MatchNotFound) => StatusCode::NOT_FOUND,
            ApiError::Lobby(LobbyServiceError::NotAParticipant) => StatusCode::FORBIDDEN,

            ApiError::Lobby(LobbyServiceError::Matchmaking(
                MatchmakingServiceError::ValidationError(_)
                | MatchmakingServiceError::UnsupportedTimeControl(_),
            )) => StatusCode::BAD_REQUEST,
            ApiError::Lobby(LobbyServiceError::Matchmaking(
                MatchmakingServiceError::RepositoryError(_),
            )) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::Lobby(LobbyServiceError::Invite(InviteServiceError::NotFound)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Lobby(LobbyServiceError::Invite(
                InviteServiceError::SelfJoin | InviteServiceError::ValidationError(_),
            )) => StatusCode::BAD_REQUEST,
            ApiError::Lobby(LobbyServiceError::Invite(InviteServiceError::AlreadyJoined)) => {
                StatusCode::CONFLICT
            }
            ApiError::Lobby(LobbyServiceError::Invite(InviteServiceError::RepositoryError(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected with {}: {}", status, self);
        }

        (status, self.to_string()).into_response()
    }
}
