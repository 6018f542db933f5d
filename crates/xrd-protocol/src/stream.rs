//! Stream and path identifier types

use std::fmt;

/// Number of distinct values each byte of a stream id takes in the id pool
pub const STREAM_ID_PART_SIZE: u16 = u8::MAX as u16;

/// Size of the stream id pool (255 * 255 ids)
pub const STREAM_ID_POOL_SIZE: u16 = STREAM_ID_PART_SIZE * STREAM_ID_PART_SIZE;

/// Binary identifier correlating a request with its responses on one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamId(pub [u8; 2]);

impl StreamId {
    /// Create a new stream ID
    pub fn new(id: [u8; 2]) -> Self {
        Self(id)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> [u8; 2] {
        self.0
    }

    /// Stream ID reserved for the initial handshake
    pub const HANDSHAKE: StreamId = StreamId([0, 0]);
}

impl From<u16> for StreamId {
    fn from(id: u16) -> Self {
        Self(id.to_be_bytes())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}.{}", self.0[0], self.0[1])
    }
}

/// Identifier of the socket that carries the payload of a data request.
///
/// Path 0 is the control socket; any other value names a sub-session bound
/// with a `bind` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PathId(pub u8);

impl PathId {
    /// Payload travels inline on the control socket
    pub const CONTROL: PathId = PathId(0);

    /// Get the raw value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Whether this path is the control socket
    pub fn is_control(&self) -> bool {
        *self == Self::CONTROL
    }
}

impl From<u8> for PathId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path-{}", self.0)
    }
}
