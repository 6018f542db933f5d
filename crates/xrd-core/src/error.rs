//! Core error types for the XRootD client

use std::path::PathBuf;

use thiserror::Error;
use xrd_protocol::{ProtocolError, ServerError};

/// Top-level error type for XRootD clients
#[derive(Error, Debug)]
pub enum XrdError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error reported by the server
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl XrdError {
    /// The server error carried by this error, if any
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the error means the session is no longer usable
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Session(SessionError::Closed | SessionError::MuxClosed)
                | Self::Connection(ConnectionError::ConnectionLost(_))
        )
    }
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Dial and handshake did not complete in time
    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    /// Connection lost
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The peer did not answer the handshake as an XRootD server
    #[error("Handshake rejected by {addr}: {reason}")]
    HandshakeRejected { addr: String, reason: String },
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The stream multiplexer has been closed
    #[error("Stream multiplexer closed")]
    MuxClosed,

    /// Stream id already in use
    #[error("Stream id {0} is already claimed")]
    StreamClaimed(String),

    /// Response for a stream nobody waits on
    #[error("No waiter for stream id {0}")]
    NoWaiter(String),

    /// Session closed before the response was fully received
    #[error("close was called before response was fully received")]
    Closed,

    /// Sub-session limit reached
    #[error("Sub-session limit of {0} reached")]
    SubSessionsExhausted(usize),

    /// Path id does not name a bound sub-session
    #[error("Unknown path id: {0}")]
    UnknownPath(u8),

    /// Redirect bound exceeded
    #[error("Too many redirections (max: {max})")]
    TooManyRedirections { max: usize },

    /// Response did not fit the request
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Authentication-related errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// None of the configured providers is offered by the server
    #[error("No configured security provider matches the server's offer: {offered:?}")]
    NoProvider { offered: Vec<String> },

    /// Every matching provider failed
    #[error("Authentication rejected by all providers ({providers:?}): {reasons:?}")]
    Rejected {
        providers: Vec<String>,
        reasons: Vec<String>,
    },

    /// A provider could not produce credentials
    #[error("Security provider failed: {0}")]
    Provider(#[from] anyhow::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrd_protocol::ServerErrorCode;

    #[test]
    fn test_server_error_is_transparent() {
        let err: XrdError = ServerError::new(ServerErrorCode::NOT_FOUND, "gone").into();
        assert_eq!(err.to_string(), "xrootd: error 3011: gone");
        assert_eq!(
            err.server_error().map(|e| e.code),
            Some(ServerErrorCode::NOT_FOUND)
        );
    }

    #[test]
    fn test_closed_classification() {
        assert!(XrdError::from(SessionError::Closed).is_closed());
        assert!(!XrdError::from(SessionError::TooManyRedirections { max: 3 }).is_closed());
    }
}
