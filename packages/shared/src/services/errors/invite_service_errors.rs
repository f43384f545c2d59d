use crate::repositories::errors::{
    invite_repository_errors::InviteRepositoryError,
    match_repository_errors::MatchRepositoryError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteServiceError {
    NotFound,
    SelfJoin,
    AlreadyJoined,
    ValidationError(String),
    RepositoryError(String),
}

impl std::fmt::Display for InviteServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InviteServiceError::NotFound => write!(f, "Invite not found"),
            InviteServiceError::SelfJoin => write!(f, "Host cannot join their own invite"),
            InviteServiceError::AlreadyJoined => write!(f, "Invite already has an opponent"),
            InviteServiceError::ValidationError(msg) => {
                write!(f, "Validation error: {}", msg)
            }
            InviteServiceError::RepositoryError(msg) => {
                write!(f, "Repository error: {}", msg)
            }
        }
    }
}

impl std::error::Error for InviteServiceError {}

impl From<InviteRepositoryError> for InviteServiceError {
    fn from(err: InviteRepositoryError) -> Self {
        match err {
            InviteRepositoryError::NotFound => InviteServiceError::NotFound,
            InviteRepositoryError::AlreadyConsumed => InviteServiceError::AlreadyJoined,
            other => InviteServiceError::RepositoryError(other.to_string()),
        }
    }
}

impl From<MatchRepositoryError> for InviteServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        InviteServiceError::RepositoryError(err.to_string())
    }
}
