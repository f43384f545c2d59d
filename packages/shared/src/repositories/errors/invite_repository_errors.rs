#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteRepositoryError {
    NotFound,
    AlreadyExists,
    AlreadyConsumed,
}

impl std::fmt::Display for InviteRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InviteRepositoryError::NotFound => write!(f, "Invite not found"),
            InviteRepositoryError::AlreadyExists => write!(f, "Invite already exists"),
            InviteRepositoryError::AlreadyConsumed => {
                write!(f, "Invite pairing channel already consumed")
            }
        }
    }
}

impl std::error::Error for InviteRepositoryError {}
