use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::services::errors::{
    invite_service_errors::InviteServiceError,
    matchmaking_service_errors::MatchmakingServiceError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyServiceError {
    ValidationError(String),
    MatchNotFound,
    NotAParticipant,
    Matchmaking(MatchmakingServiceError),
    Invite(InviteServiceError),
}

impl std::fmt::Display for LobbyServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            LobbyServiceError::MatchNotFound => write!(f, "Match not found"),
            LobbyServiceError::NotAParticipant => {
                write!(f, "User is not a participant of this match")
            }
            LobbyServiceError::Matchmaking(err) => write!(f, "Matchmaking error: {}", err),
            LobbyServiceError::Invite(err) => write!(f, "Invite error: {}", err),
        }
    }
}

impl std::error::Error for LobbyServiceError {}

impl From<MatchmakingServiceError> for LobbyServiceError {
    fn from(err: MatchmakingServiceError) -> Self {
        match err {
            MatchmakingServiceError::UnsupportedTimeControl(minutes) => {
                LobbyServiceError::ValidationError(format!(
                    "unsupported time control: {} minutes",
                    minutes
                ))
            }
            other => LobbyServiceError::Matchmaking(other),
        }
    }
}

impl From<InviteServiceError> for LobbyServiceError {
    fn from(err: InviteServiceError) -> Self {
        LobbyServiceError::Invite(err)
    }
}

impl From<MatchRepositoryError> for LobbyServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        match err {
            MatchRepositoryError::NotFound => LobbyServiceError::MatchNotFound,
            other => LobbyServiceError::Matchmaking(MatchmakingServiceError::RepositoryError(other)),
        }
    }
}
