//! Protocol negotiation
//!
//! The response has up to three parts: the general part with the binary
//! protocol version and server role flags, an optional security section
//! introduced by `'S'`, and the list of security overrides it announces.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, skip, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{Request, RequestKind};
use crate::signing::{SecurityLevel, SecurityOverride};

/// Protocol version spoken by this implementation
pub const DEFAULT_PROTOCOL_VERSION: i32 = 0x310;

/// Ask the server to return its security requirements
pub const RETURN_SECURITY_REQUIREMENTS: u8 = 0x01;

/// Server role flags
pub mod flags {
    pub const IS_SERVER: i32 = 0x0000_0001;
    pub const IS_MANAGER: i32 = 0x0000_0002;
    pub const IS_META: i32 = 0x0000_0100;
    pub const IS_PROXY: i32 = 0x0000_0200;
    pub const IS_SUPERVISOR: i32 = 0x0000_0400;
}

/// Signing required even without generic encryption support
pub const FORCE_SECURITY: u8 = 0x02;

/// Protocol request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolRequest {
    pub client_version: i32,
    pub options: u8,
}

impl ProtocolRequest {
    pub fn new(client_version: i32, with_security_requirements: bool) -> Self {
        let options = if with_security_requirements {
            RETURN_SECURITY_REQUIREMENTS
        } else {
            0
        };
        Self {
            client_version,
            options,
        }
    }

    pub fn wants_security_requirements(&self) -> bool {
        self.options & RETURN_SECURITY_REQUIREMENTS != 0
    }
}

impl Request for ProtocolRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Protocol.as_u16()
    }
}

impl XrdEncode for ProtocolRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_i32(self.client_version);
        dst.put_u8(self.options);
        dst.put_bytes(0, 11);
        dst.put_i32(0);
        Ok(())
    }
}

impl XrdDecode for ProtocolRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 20)?;
        let client_version = src.get_i32();
        let options = src.get_u8();
        skip(src, 15)?;
        Ok(Self {
            client_version,
            options,
        })
    }
}

/// Security section of a protocol response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityInfo {
    pub version: u8,
    pub options: u8,
    pub level: SecurityLevel,
    pub overrides: Vec<SecurityOverride>,
}

/// Protocol response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtocolResponse {
    pub binary_protocol_version: i32,
    pub flags: i32,
    /// Present when requested and supported by the server
    pub security: Option<SecurityInfo>,
}

impl ProtocolResponse {
    pub fn is_server(&self) -> bool {
        self.flags & flags::IS_SERVER != 0
    }

    pub fn is_manager(&self) -> bool {
        self.flags & flags::IS_MANAGER != 0
    }

    pub fn is_meta(&self) -> bool {
        self.flags & flags::IS_META != 0
    }

    pub fn is_proxy(&self) -> bool {
        self.flags & flags::IS_PROXY != 0
    }

    pub fn is_supervisor(&self) -> bool {
        self.flags & flags::IS_SUPERVISOR != 0
    }

    pub fn force_security(&self) -> bool {
        self.security
            .as_ref()
            .map_or(false, |s| s.options & FORCE_SECURITY != 0)
    }

    /// Negotiated security level, `None` without a security section
    pub fn security_level(&self) -> SecurityLevel {
        self.security.as_ref().map_or(SecurityLevel::None, |s| s.level)
    }

    pub fn security_overrides(&self) -> &[SecurityOverride] {
        self.security
            .as_ref()
            .map_or(&[][..], |s| s.overrides.as_slice())
    }
}

impl XrdEncode for ProtocolResponse {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_i32(self.binary_protocol_version);
        dst.put_i32(self.flags);
        let Some(security) = &self.security else {
            return Ok(());
        };
        dst.put_u8(b'S');
        dst.put_u8(0);
        dst.put_u8(security.version);
        dst.put_u8(security.options);
        dst.put_u8(security.level.as_u8());
        dst.put_u8(security.overrides.len() as u8);
        for o in &security.overrides {
            o.encode(dst)?;
        }
        Ok(())
    }
}

impl XrdDecode for ProtocolResponse {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 8)?;
        let binary_protocol_version = src.get_i32();
        let flags = src.get_i32();
        if src.is_empty() {
            return Ok(Self {
                binary_protocol_version,
                flags,
                security: None,
            });
        }

        ensure_remaining(src, 6)?;
        let marker = src.get_u8();
        if marker != b'S' {
            return Err(ProtocolError::Malformed(format!(
                "protocol response: unexpected security marker {:#04x}",
                marker
            )));
        }
        src.advance(1);
        let version = src.get_u8();
        let options = src.get_u8();
        let level = SecurityLevel::from_u8(src.get_u8());
        let count = src.get_u8() as usize;
        let overrides = (0..count)
            .map(|_| SecurityOverride::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            binary_protocol_version,
            flags,
            security: Some(SecurityInfo {
                version,
                options,
                level,
                overrides,
            }),
        })
    }
}
