use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque identity paired with the display name shown to opponents.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
}

impl User {
    pub fn new(id: &str, username: &str) -> Self {
        User {
            id: id.to_string(),
            username: username.to_string(),
        }
    }

    /// Mints a fresh identity for a visitor without a session.
    pub fn with_fresh_id(username: &str) -> Self {
        User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = User::with_fresh_id("anonymous");
        let b = User::with_fresh_id("anonymous");

        assert_ne!(a.id, b.id);
        assert_eq!(a.username, b.username);
    }
}
