use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingServiceError {
    RepositoryError(MatchRepositoryError),
    ValidationError(String),
    UnsupportedTimeControl(u32),
}

impl std::fmt::Display for MatchmakingServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchmakingServiceError::RepositoryError(err) => {
                write!(f, "Repository error: {}", err)
            }
            MatchmakingServiceError::ValidationError(msg) => {
                write!(f, "Validation error: {}", msg)
            }
            MatchmakingServiceError::UnsupportedTimeControl(minutes) => {
                write!(f, "Unsupported time control: {} minutes", minutes)
            }
        }
    }
}

impl std::error::Error for MatchmakingServiceError {}

impl From<MatchRepositoryError> for MatchmakingServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        MatchmakingServiceError::RepositoryError(err)
    }
}
