//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol data
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Buffer ended before a fixed-layout field could be read
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// Response header announced a negative payload length
    #[error("Invalid data length in response header: {0}")]
    InvalidLength(i32),

    /// Payload exceeds the maximum accepted size
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Response status that this implementation does not handle
    #[error("Unknown response status: {0}")]
    UnknownStatus(u16),

    /// Redirect payload could not be parsed
    #[error("Invalid redirect response: {0}")]
    InvalidRedirect(String),

    /// Wait payload could not be parsed
    #[error("Invalid wait response: want 4 bytes, got {0}")]
    InvalidWait(usize),

    /// Server error payload could not be parsed
    #[error("Invalid server error response: {0}")]
    InvalidServerError(String),

    /// A response body did not match its fixed layout
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
