use std::time::Duration;

/// Timing and capacity knobs shared by every lobby component.
#[derive(Debug, Clone)]
pub struct LobbySettings {
    pub quick_match_wait: Duration,
    pub invite_wait: Duration,
    pub reconnect_grace: Duration,
    pub ping_period: Duration,
    pub chat_queue_capacity: usize,
    pub presence_queue_capacity: usize,
    pub default_username: String,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            quick_match_wait: Duration::from_secs(5),
            invite_wait: Duration::from_secs(60),
            reconnect_grace: Duration::from_secs(5),
            ping_period: Duration::from_secs(54),
            chat_queue_capacity: 128,
            presence_queue_capacity: 256,
            default_username: "anonymous".to_string(),
        }
    }
}
