use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::matchmaking::MatchRecord;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

/// Directory of live pairings, shared by the quick-match waiting room,
/// the invite registry and the room lifecycle.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn create_match(&self, record: &MatchRecord) -> Result<(), MatchRepositoryError>;

    async fn get_match(&self, match_id: &str) -> Result<MatchRecord, MatchRepositoryError>;

    async fn swap_colors(&self, match_id: &str) -> Result<MatchRecord, MatchRepositoryError>;

    async fn remove_match(&self, match_id: &str) -> Result<MatchRecord, MatchRepositoryError>;

    async fn active_matches(&self) -> usize;
}

#[derive(Default)]
struct MatchTable {
    matches: HashMap<String, MatchRecord>,
    created_total: u64,
}

#[derive(Default)]
pub struct InMemoryMatchRepository {
    table: Mutex<MatchTable>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairings ever recorded, including ones already cleaned up.
    pub fn created_total(&self) -> u64 {
        self.lock().created_total
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MatchTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn create_match(&self, record: &MatchRecord) -> Result<(), MatchRepositoryError> {
        let mut table = self.lock();
        if table.matches.contains_key(&record.match_id) {
            return Err(MatchRepositoryError::AlreadyExists);
        }
        table
            .matches
            .insert(record.match_id.clone(), record.clone());
        table.created_total += 1;
        Ok(())
    }

    async fn get_match(&self, match_id: &str) -> Result<MatchRecord, MatchRepositoryError> {
        self.lock()
            .matches
            .get(match_id)
            .cloned()
            .ok_or(MatchRepositoryError::NotFound)
    }

    async fn swap_colors(&self, match_id: &str) -> Result<MatchRecord, MatchRepositoryError> {
        let mut table = self.lock();
        let record = table
            .matches
            .get_mut(match_id)
            .ok_or(MatchRepositoryError::NotFound)?;
        record.swap_colors();
        Ok(record.clone())
    }

    async fn remove_match(&self, match_id: &str) -> Result<MatchRecord, MatchRepositoryError> {
        self.lock()
            .matches
            .remove(match_id)
            .ok_or(MatchRepositoryError::NotFound)
    }

    async fn active_matches(&self) -> usize {
        self.lock().matches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{color::Color, time_control::TimeControl, user::User};

    fn record() -> MatchRecord {
        MatchRecord::new(
            User::new("u-1", "alice"),
            User::new("u-2", "bob"),
            TimeControl::ThreeMinutes,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_match() {
        let repository = InMemoryMatchRepository::new();
        let record = record();

        repository.create_match(&record).await.unwrap();

        let stored = repository.get_match(&record.match_id).await.unwrap();
        assert_eq!(stored, record);
        assert_eq!(stored.color_of("u-2"), Some(Color::Black));
        assert_eq!(repository.active_matches().await, 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_match_is_rejected() {
        let repository = InMemoryMatchRepository::new();
        let record = record();
        repository.create_match(&record).await.unwrap();

        let result = repository.create_match(&record).await;

        assert_eq!(result, Err(MatchRepositoryError::AlreadyExists));
        assert_eq!(repository.created_total(), 1);
    }

    #[tokio::test]
    async fn test_swap_colors_updates_directory() {
        let repository = InMemoryMatchRepository::new();
        let record = record();
        repository.create_match(&record).await.unwrap();

        repository.swap_colors(&record.match_id).await.unwrap();

        let stored = repository.get_match(&record.match_id).await.unwrap();
        assert_eq!(stored.color_of("u-1"), Some(Color::Black));
        assert_eq!(stored.color_of("u-2"), Some(Color::White));
    }

    #[tokio::test]
    async fn test_remove_match() {
        let repository = InMemoryMatchRepository::new();
        let record = record();
        repository.create_match(&record).await.unwrap();

        repository.remove_match(&record.match_id).await.unwrap();

        assert_eq!(
            repository.get_match(&record.match_id).await,
            Err(MatchRepositoryError::NotFound)
        );
        assert_eq!(
            repository.remove_match(&record.match_id).await,
            Err(MatchRepositoryError::NotFound)
        );
        assert_eq!(repository.active_matches().await, 0);
        assert_eq!(repository.created_total(), 1);
    }
}
