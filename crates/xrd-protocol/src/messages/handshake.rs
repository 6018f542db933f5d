//! Initial handshake

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, XrdDecode, XrdEncode};
use crate::error::ProtocolError;

/// Size of the handshake request in bytes
pub const HANDSHAKE_SIZE: usize = 20;

/// Fixed handshake request: five `int32` fields `{0, 0, 0, 4, 2012}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub fields: [i32; 5],
}

impl HandshakeRequest {
    /// The only handshake the protocol defines
    pub const MAGIC: [i32; 5] = [0, 0, 0, 4, 2012];

    pub fn new() -> Self {
        Self {
            fields: Self::MAGIC,
        }
    }

    /// Whether the fields carry the expected magic
    pub fn is_valid(&self) -> bool {
        self.fields == Self::MAGIC
    }
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl XrdEncode for HandshakeRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(HANDSHAKE_SIZE);
        for field in self.fields {
            dst.put_i32(field);
        }
        Ok(())
    }
}

impl XrdDecode for HandshakeRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, HANDSHAKE_SIZE)?;
        let mut fields = [0i32; 5];
        for field in fields.iter_mut() {
            *field = src.get_i32();
        }
        Ok(Self { fields })
    }
}

/// Kind of server answering the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// Redirector that only routes requests
    LoadBalancing,
    /// Server that holds data
    Data,
    Unknown(i32),
}

impl ServerType {
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::LoadBalancing => 0,
            Self::Data => 1,
            Self::Unknown(v) => *v,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::LoadBalancing,
            1 => Self::Data,
            other => Self::Unknown(other),
        }
    }
}

/// Handshake response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub protocol_version: i32,
    pub server_type: ServerType,
}

impl XrdEncode for HandshakeResponse {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_i32(self.protocol_version);
        dst.put_i32(self.server_type.as_i32());
        Ok(())
    }
}

impl XrdDecode for HandshakeResponse {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 8)?;
        Ok(Self {
            protocol_version: src.get_i32(),
            server_type: ServerType::from_i32(src.get_i32()),
        })
    }
}
