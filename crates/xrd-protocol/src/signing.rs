//! Request signing policy
//!
//! The server announces a predefined security level during protocol
//! negotiation, optionally altered by per-request overrides. Each level
//! requires signing a strict superset of the requests the previous level
//! requires.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{Request, RequestKind};

/// Security requirement attached to one request id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestLevel {
    /// Request is never signed
    SignNone,
    /// Request is signed when it may modify data
    SignLikely,
    /// Request is always signed
    SignNeeded,
}

impl RequestLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::SignNone => 0,
            Self::SignLikely => 1,
            Self::SignNeeded => 2,
        }
    }

    /// Unknown values are treated as the strictest requirement
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::SignNone,
            1 => Self::SignLikely,
            _ => Self::SignNeeded,
        }
    }
}

/// Predefined security level negotiated with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SecurityLevel {
    /// No request is signed
    #[default]
    None,
    /// Potentially destructive requests are signed
    Compatible,
    /// Adds certain non-destructive requests
    Standard,
    /// Adds requests that may reveal metadata or modify data
    Intense,
    /// Every request on the list is signed
    Pedantic,
}

impl SecurityLevel {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Values above `Pedantic` saturate to `Pedantic`
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Compatible,
            2 => Self::Standard,
            3 => Self::Intense,
            _ => Self::Pedantic,
        }
    }
}

/// Alteration of the predefined level for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityOverride {
    /// Request id minus the id of `auth` (3000)
    pub request_index: u8,
    /// Requirement that replaces the level-derived one
    pub request_level: RequestLevel,
}

impl SecurityOverride {
    /// Encoded size in bytes
    pub const SIZE: usize = 2;

    /// Override for a given request kind
    pub fn new(kind: RequestKind, request_level: RequestLevel) -> Self {
        Self {
            request_index: (kind.as_u16() - RequestKind::Auth.as_u16()) as u8,
            request_level,
        }
    }

    /// Request id this override applies to
    pub fn request_id(&self) -> u16 {
        RequestKind::Auth.as_u16() + u16::from(self.request_index)
    }
}

impl XrdEncode for SecurityOverride {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_u8(self.request_index);
        dst.put_u8(self.request_level.as_u8());
        Ok(())
    }
}

impl XrdDecode for SecurityOverride {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, Self::SIZE)?;
        Ok(Self {
            request_index: src.get_u8(),
            request_level: RequestLevel::from_u8(src.get_u8()),
        })
    }
}

/// Decides which requests must travel inside a signing envelope
#[derive(Debug, Clone, Default)]
pub struct SignRequirements {
    requirements: HashMap<u16, RequestLevel>,
}

impl SignRequirements {
    /// Build the policy for a security level, then apply overrides
    pub fn new(level: SecurityLevel, overrides: &[SecurityOverride]) -> Self {
        use RequestKind::*;
        use RequestLevel::*;

        let mut requirements = HashMap::new();
        let mut require = |kind: RequestKind, req_level: RequestLevel| {
            requirements.insert(kind.as_u16(), req_level);
        };

        if level >= SecurityLevel::Compatible {
            require(Chmod, SignNeeded);
            require(Mv, SignNeeded);
            require(Open, SignLikely);
            require(Rm, SignNeeded);
            require(Rmdir, SignNeeded);
            require(Truncate, SignNeeded);
        }
        if level >= SecurityLevel::Standard {
            require(Mkdir, SignNeeded);
            require(Open, SignNeeded);
        }
        if level >= SecurityLevel::Intense {
            require(Close, SignNeeded);
            require(VerifyW, SignNeeded);
            require(Write, SignNeeded);
        }
        if level >= SecurityLevel::Pedantic {
            require(Dirlist, SignNeeded);
            require(Read, SignNeeded);
            require(Stat, SignNeeded);
            require(Statx, SignNeeded);
            require(Sync, SignNeeded);
        }

        for o in overrides {
            requirements.insert(o.request_id(), o.request_level);
        }

        Self { requirements }
    }

    /// Whether `request` must be signed
    pub fn needed<R: Request + ?Sized>(&self, request: &R) -> bool {
        match self.requirements.get(&request.request_id()) {
            Some(RequestLevel::SignNeeded) => true,
            Some(RequestLevel::SignLikely) => request.should_sign(),
            Some(RequestLevel::SignNone) | None => false,
        }
    }

    /// Whether no request needs signing at all
    pub fn is_empty(&self) -> bool {
        self.requirements
            .values()
            .all(|level| *level == RequestLevel::SignNone)
    }
}
