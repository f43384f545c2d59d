use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use shared::settings::LobbySettings;
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Origin allowed by CORS
    pub allowed_origin: String,
    pub log_level: Level,
    /// Read deadline for game and presence sockets; any frame (pongs
    /// included) resets it
    pub pong_wait: Duration,
    pub max_message_size: usize,
    pub lobby: LobbySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
            allowed_origin: "http://localhost:8080".to_string(),
            log_level: Level::INFO,
            pong_wait: Duration::from_secs(60),
            max_message_size: 512,
            lobby: LobbySettings::default(),
        }
    }
}

impl Config {
    /// Create a configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset keys keep their
    /// defaults; set keys that fail to parse are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(address) = parse(&lookup, "BIND_ADDRESS")? {
            config.bind_address = address;
        }
        if let Some(port) = parse(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            config.allowed_origin = origin;
        }
        if let Some(level) = parse(&lookup, "LOG_LEVEL")? {
            config.log_level = level;
        }
        if let Some(secs) = parse(&lookup, "PONG_WAIT_SECS")? {
            config.pong_wait = Duration::from_secs(secs);
        }
        if let Some(size) = parse(&lookup, "MAX_MESSAGE_SIZE")? {
            config.max_message_size = size;
        }

        let lobby = &mut config.lobby;
        if let Some(secs) = parse(&lookup, "QUICK_MATCH_WAIT_SECS")? {
            lobby.quick_match_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "INVITE_WAIT_SECS")? {
            lobby.invite_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "RECONNECT_GRACE_SECS")? {
            lobby.reconnect_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "PING_PERIOD_SECS")? {
            lobby.ping_period = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse(&lookup, "CHAT_QUEUE_CAPACITY")? {
            lobby.chat_queue_capacity = capacity;
        }
        if let Some(capacity) = parse(&lookup, "PRESENCE_QUEUE_CAPACITY")? {
            lobby.presence_queue_capacity = capacity;
        }
        if let Some(username) = lookup("DEFAULT_USERNAME") {
            lobby.default_username = username;
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.max_message_size, 512);
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.lobby.quick_match_wait, Duration::from_secs(5));
        assert_eq!(config.lobby.invite_wait, Duration::from_secs(60));
        assert_eq!(config.lobby.default_username, "anonymous");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = config_from(&[
            ("PORT", "9100"),
            ("BIND_ADDRESS", "0.0.0.0"),
            ("LOG_LEVEL", "debug"),
            ("RECONNECT_GRACE_SECS", "2"),
            ("CHAT_QUEUE_CAPACITY", "16"),
            ("DEFAULT_USERNAME", "guest"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:9100");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.lobby.reconnect_grace, Duration::from_secs(2));
        assert_eq!(config.lobby.chat_queue_capacity, 16);
        assert_eq!(config.lobby.default_username, "guest");
    }

    #[test_case("PORT", "eighty" ; "non numeric port")]
    #[test_case("PORT", "70000" ; "port out of range")]
    #[test_case("QUICK_MATCH_WAIT_SECS", "-1" ; "negative wait")]
    #[test_case("MAX_MESSAGE_SIZE", "" ; "empty size")]
    #[test_case("LOG_LEVEL", "loud" ; "unknown level")]
    #[test_case("BIND_ADDRESS", "localhost:80" ; "address with port")]
    fn test_invalid_values_are_rejected(key: &'static str, value: &str) {
        let result = config_from(&[(key, value)]);

        assert_eq!(
            result.unwrap_err(),
            ConfigError::InvalidValue {
                key,
                value: value.to_string()
            }
        );
    }
}
