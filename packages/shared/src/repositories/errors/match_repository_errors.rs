#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRepositoryError {
    NotFound,
    AlreadyExists,
}

impl std::fmt::Display for MatchRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRepositoryError::NotFound => write!(f, "Match not found"),
            MatchRepositoryError::AlreadyExists => write!(f, "Match already exists"),
        }
    }
}

impl std::error::Error for MatchRepositoryError {}
