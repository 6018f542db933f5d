//! Status-specific response payloads
//!
//! The payload of an `Error`, `Wait` or `Redirect` response has a fixed
//! layout independent of the request it answers; these types decode them.

use std::fmt;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, XrdDecode, XrdEncode};
use crate::error::ProtocolError;

/// Code of an error returned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerErrorCode(pub i32);

impl ServerErrorCode {
    pub const ARG_INVALID: Self = Self(3000);
    pub const ARG_MISSING: Self = Self(3001);
    pub const ARG_TOO_LONG: Self = Self(3002);
    pub const FILE_LOCKED: Self = Self(3003);
    pub const FILE_NOT_OPEN: Self = Self(3004);
    pub const FS_ERROR: Self = Self(3005);
    pub const INVALID_REQUEST: Self = Self(3006);
    pub const IO_ERROR: Self = Self(3007);
    pub const NO_MEMORY: Self = Self(3008);
    pub const NO_SPACE: Self = Self(3009);
    pub const NOT_AUTHORIZED: Self = Self(3010);
    pub const NOT_FOUND: Self = Self(3011);
    pub const SERVER_ERROR: Self = Self(3012);
    pub const UNSUPPORTED: Self = Self(3013);
}

impl fmt::Display for ServerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned by the server as the payload of an `Error` response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("xrootd: error {code}: {message}")]
pub struct ServerError {
    /// Error code
    pub code: ServerErrorCode,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    /// Create a new server error
    pub fn new(code: ServerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl XrdEncode for ServerError {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_i32(self.code.0);
        dst.put_slice(self.message.as_bytes());
        dst.put_u8(0);
        Ok(())
    }
}

impl XrdDecode for ServerError {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 4)
            .map_err(|_| ProtocolError::InvalidServerError("missing error code".to_string()))?;
        let code = ServerErrorCode(src.get_i32());
        if src.is_empty() {
            return Err(ProtocolError::InvalidServerError(
                "missing error message".to_string(),
            ));
        }
        let mut message = src.split_to(src.len());
        if message.last() == Some(&0) {
            message.truncate(message.len() - 1);
        }
        Ok(Self {
            code,
            message: String::from_utf8_lossy(&message).into_owned(),
        })
    }
}

/// Payload of a `Wait` response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitResponse {
    /// Time to sleep before re-sending the identical request
    pub duration: Duration,
}

impl XrdEncode for WaitResponse {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_u32(self.duration.as_secs() as u32);
        Ok(())
    }
}

impl XrdDecode for WaitResponse {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        if src.len() < 4 {
            return Err(ProtocolError::InvalidWait(src.len()));
        }
        let seconds = src.get_u32();
        // An optional human-readable message may follow
        src.advance(src.len());
        Ok(Self {
            duration: Duration::from_secs(u64::from(seconds)),
        })
    }
}

/// Instruction to re-issue a request against another server
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Redirection {
    /// New server address as `host:port`
    pub addr: String,
    /// Opaque data to attach to the path of the re-issued request
    pub opaque: String,
    /// Token to present when logging in to the new server
    pub token: String,
}

impl Redirection {
    /// Redirection to `addr` without opaque data or token
    pub fn to(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Parse a raw redirect payload: a 4-byte port followed by
    /// `<host>?<opaque>?<token>`, the last two parts optional
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() < 4 {
            return Err(ProtocolError::InvalidRedirect(format!(
                "want at least 4 bytes, got {}",
                raw.len()
            )));
        }
        let port = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if port < 0 {
            return Err(ProtocolError::InvalidRedirect(format!(
                "unsupported port {}",
                port
            )));
        }

        let rest = String::from_utf8_lossy(&raw[4..]);
        let mut parts = rest.splitn(3, '?');
        let host = parts.next().unwrap_or_default();
        if host.is_empty() {
            return Err(ProtocolError::InvalidRedirect("missing host".to_string()));
        }

        Ok(Self {
            addr: format!("{}:{}", host, port),
            opaque: parts.next().unwrap_or_default().to_string(),
            token: parts.next().unwrap_or_default().to_string(),
        })
    }
}

impl XrdEncode for Redirection {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let (host, port) = self
            .addr
            .rsplit_once(':')
            .ok_or_else(|| ProtocolError::InvalidRedirect(format!("no port in {}", self.addr)))?;
        let port: i32 = port
            .parse()
            .map_err(|_| ProtocolError::InvalidRedirect(format!("bad port in {}", self.addr)))?;

        dst.put_i32(port);
        dst.put_slice(host.as_bytes());
        if !self.opaque.is_empty() || !self.token.is_empty() {
            dst.put_u8(b'?');
            dst.put_slice(self.opaque.as_bytes());
        }
        if !self.token.is_empty() {
            dst.put_u8(b'?');
            dst.put_slice(self.token.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::to_bytes;

    #[test]
    fn test_server_error_layout() {
        let err = ServerError::new(ServerErrorCode(12), "");
        let bytes = to_bytes(&err).unwrap();
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 12, 0]);
    }

    #[test]
    fn test_server_error_decode() {
        let err = ServerError::new(ServerErrorCode::NOT_FOUND, "no such file");
        let mut bytes = to_bytes(&err).unwrap();
        let decoded = ServerError::decode(&mut bytes).unwrap();
        assert_eq!(decoded, err);
        assert_eq!(decoded.to_string(), "xrootd: error 3011: no such file");
    }

    #[test]
    fn test_server_error_missing_message() {
        let mut bytes = Bytes::from_static(&[0, 0, 0x0B, 0xC3]);
        assert!(matches!(
            ServerError::decode(&mut bytes),
            Err(ProtocolError::InvalidServerError(_))
        ));
    }

    #[test]
    fn test_wait_response_with_message() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 42, b'b', b'u', b's', b'y']);
        let wait = WaitResponse::decode(&mut bytes).unwrap();
        assert_eq!(wait.duration, Duration::from_secs(42));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_wait_response_too_short() {
        let mut bytes = Bytes::from_static(&[0, 1]);
        assert!(matches!(
            WaitResponse::decode(&mut bytes),
            Err(ProtocolError::InvalidWait(2))
        ));
    }

    #[test]
    fn test_parse_redirection_full() {
        let mut raw = vec![0, 0, 0x04, 0x38];
        raw.extend_from_slice(b"data.example.org?tried=a&x=1?tok");
        let redirection = Redirection::parse(&raw).unwrap();
        assert_eq!(redirection.addr, "data.example.org:1080");
        assert_eq!(redirection.opaque, "tried=a&x=1");
        assert_eq!(redirection.token, "tok");
    }

    #[test]
    fn test_parse_redirection_host_only() {
        let mut raw = vec![0, 0, 0x04, 0x38];
        raw.extend_from_slice(b"localhost");
        let redirection = Redirection::parse(&raw).unwrap();
        assert_eq!(redirection, Redirection::to("localhost:1080"));
    }

    #[test]
    fn test_parse_redirection_errors() {
        assert!(Redirection::parse(&[0, 0, 1]).is_err());
        assert!(Redirection::parse(&[0, 0, 0, 1]).is_err());
        assert!(Redirection::parse(&[0xFF, 0xFF, 0xFF, 0xFF, b'h']).is_err());
    }

    #[test]
    fn test_redirection_encode_matches_parse() {
        let redirection = Redirection {
            addr: "127.0.0.1:9001".to_string(),
            opaque: "o=1".to_string(),
            token: String::new(),
        };
        let bytes = to_bytes(&redirection).unwrap();
        assert_eq!(&bytes[4..], b"127.0.0.1?o=1");
        assert_eq!(Redirection::parse(&bytes).unwrap(), redirection);
    }
}
