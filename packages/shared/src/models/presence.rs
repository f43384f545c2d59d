use serde::{Deserialize, Serialize};

/// Aggregate counts pushed to every presence subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub online: usize,
    pub games: usize,
}

impl PresenceSnapshot {
    pub fn compute(subscribers: usize, playing: usize) -> Self {
        PresenceSnapshot {
            online: subscribers + playing,
            games: playing / 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_counts_players_in_games_as_online() {
        let snapshot = PresenceSnapshot::compute(3, 4);

        assert_eq!(snapshot.online, 7);
        assert_eq!(snapshot.games, 2);
    }

    #[test]
    fn test_odd_playing_count_rounds_down() {
        // One side of a match has attached, the other has not yet.
        assert_eq!(PresenceSnapshot::compute(0, 3).games, 1);
    }

    #[test]
    fn test_snapshot_serialization() {
        let serialized = serde_json::to_string(&PresenceSnapshot::compute(1, 2)).unwrap();
        assert_eq!(serialized, r#"{"online":3,"games":1}"#);
    }
}
