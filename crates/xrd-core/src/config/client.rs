//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration shared by a client and every session it opens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User name sent at login; only the first 8 bytes are used
    pub username: String,

    /// Redirects followed for a single request before giving up
    pub max_redirections: usize,

    /// Bound data sockets per session; 0 keeps all payloads inline
    pub max_sub_sessions: usize,

    /// Bound on dialing and handshaking with a server
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Protocol version announced during negotiation
    pub protocol_version: i32,

    /// Ask servers to return their signing requirements
    pub request_security: bool,

    /// Capacity of the stream id ring of each session
    pub free_stream_ids_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: whoami::username(),
            max_redirections: 10,
            max_sub_sessions: 4,
            connect_timeout: Duration::from_secs(30),
            protocol_version: xrd_protocol::messages::protocol::DEFAULT_PROTOCOL_VERSION,
            request_security: true,
            free_stream_ids_buffer: 32,
        }
    }
}

impl ClientConfig {
    /// Default configuration for a given user
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    /// Check values that would make the client unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::Invalid("username must not be empty".into()));
        }
        if self.free_stream_ids_buffer == 0 {
            return Err(ConfigError::Invalid(
                "free_stream_ids_buffer must be at least 1".into(),
            ));
        }
        if self.max_sub_sessions > usize::from(u8::MAX) {
            return Err(ConfigError::Invalid(format!(
                "max_sub_sessions must be at most {}",
                u8::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_redirections, 10);
        assert_eq!(config.max_sub_sessions, 4);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.protocol_version, 0x310);
        assert!(config.request_security);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str("username = \"gopher\"\nconnect_timeout = 5").unwrap();
        assert_eq!(config.username, "gopher");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.free_stream_ids_buffer, 32);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig {
            username: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            max_sub_sessions: 300,
            ..ClientConfig::with_username("gopher")
        };
        assert!(config.validate().is_err());
    }
}
