//! Request and response header encoding/decoding
//!
//! Every request starts with a 4-byte header:
//! - stream_id: 2 bytes
//! - request_id: 2 bytes (u16, big-endian)
//!
//! Every response starts with an 8-byte header:
//! - stream_id: 2 bytes
//! - status: 2 bytes (u16, big-endian)
//! - data_length: 4 bytes (i32, big-endian)

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::stream::StreamId;

/// Size of the request header in bytes
pub const REQUEST_HEADER_SIZE: usize = 2 + 2;

/// Size of the response header in bytes
pub const RESPONSE_HEADER_SIZE: usize = 2 + 2 + 4;

/// Size of the fixed part of every request: header, 16 parameter bytes and
/// the trailing data length
pub const REQUEST_FIXED_SIZE: usize = REQUEST_HEADER_SIZE + 16 + 4;

/// Status code indicating how a request completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    /// Request fully completed, no further responses on this stream
    Ok,
    /// Partial response, more will follow on the same stream
    OkSoFar,
    /// Unsolicited server attention message
    Attn,
    /// Authentication needs another round
    AuthMore,
    /// Request failed, payload is a server error
    Error,
    /// Request must be re-issued to another server
    Redirect,
    /// Request must be re-sent after the given number of seconds
    Wait,
    /// Server will answer asynchronously
    WaitResp,
    /// Status not defined by the protocol
    Unknown(u16),
}

impl ResponseStatus {
    /// Convert to the wire value
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::OkSoFar => 4000,
            Self::Attn => 4001,
            Self::AuthMore => 4002,
            Self::Error => 4003,
            Self::Redirect => 4004,
            Self::Wait => 4005,
            Self::WaitResp => 4006,
            Self::Unknown(v) => *v,
        }
    }

    /// Convert from the wire value
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Ok,
            4000 => Self::OkSoFar,
            4001 => Self::Attn,
            4002 => Self::AuthMore,
            4003 => Self::Error,
            4004 => Self::Redirect,
            4005 => Self::Wait,
            4006 => Self::WaitResp,
            other => Self::Unknown(other),
        }
    }

    /// Whether a response with this status ends the response cycle
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::OkSoFar)
    }
}

/// Header that precedes every request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Stream the response will be correlated with
    pub stream_id: StreamId,
    /// Identifier of the request kind
    pub request_id: u16,
}

impl RequestHeader {
    /// Create a new request header
    pub fn new(stream_id: StreamId, request_id: u16) -> Self {
        Self {
            stream_id,
            request_id,
        }
    }
}

impl XrdEncode for RequestHeader {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(REQUEST_HEADER_SIZE);
        dst.put_slice(&self.stream_id.as_bytes());
        dst.put_u16(self.request_id);
        Ok(())
    }
}

impl XrdDecode for RequestHeader {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, REQUEST_HEADER_SIZE)?;
        let stream_id = StreamId([src.get_u8(), src.get_u8()]);
        let request_id = src.get_u16();
        Ok(Self {
            stream_id,
            request_id,
        })
    }
}

/// Header that precedes every response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Stream the response belongs to
    pub stream_id: StreamId,
    /// Completion status
    pub status: ResponseStatus,
    /// Length of the payload in bytes
    pub data_length: i32,
}

impl ResponseHeader {
    /// Create a new response header
    pub fn new(stream_id: StreamId, status: ResponseStatus, data_length: i32) -> Self {
        Self {
            stream_id,
            status,
            data_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(RESPONSE_HEADER_SIZE);
        dst.put_slice(&self.stream_id.as_bytes());
        dst.put_u16(self.status.as_u16());
        dst.put_i32(self.data_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the announced payload length is negative.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < RESPONSE_HEADER_SIZE {
            return Ok(None);
        }

        // Validate the length before consuming anything
        let data_length = i32::from_be_bytes([src[4], src[5], src[6], src[7]]);
        if data_length < 0 {
            return Err(ProtocolError::InvalidLength(data_length));
        }

        let stream_id = StreamId([src.get_u8(), src.get_u8()]);
        let status = ResponseStatus::from_u16(src.get_u16());
        let _ = src.get_i32(); // data_length already parsed

        Ok(Some(Self {
            stream_id,
            status,
            data_length,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_header_roundtrip() {
        let header = ResponseHeader::new(StreamId([0, 1]), ResponseStatus::Ok, 5);

        let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_SIZE);
        header.encode(&mut buf);

        assert_eq!(&buf[..], &[0, 1, 0, 0, 0, 0, 0, 5]);

        let decoded = ResponseHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader::new(StreamId([1, 2]), 3011);

        let mut buf = BytesMut::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[1, 2, 0x0B, 0xC3]);

        let decoded = RequestHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8; 4][..]);
        let result = ResponseHeader::decode(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_negative_data_length() {
        let mut buf = BytesMut::from(&[0, 1, 0, 0, 0xFF, 0xFF, 0xFF, 0xFE][..]);
        let result = ResponseHeader::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidLength(-2))));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ResponseStatus::Ok,
            ResponseStatus::OkSoFar,
            ResponseStatus::Attn,
            ResponseStatus::AuthMore,
            ResponseStatus::Error,
            ResponseStatus::Redirect,
            ResponseStatus::Wait,
            ResponseStatus::WaitResp,
            ResponseStatus::Unknown(1234),
        ] {
            assert_eq!(ResponseStatus::from_u16(status.as_u16()), status);
        }
    }

    #[test]
    fn test_only_ok_so_far_is_partial() {
        assert!(!ResponseStatus::OkSoFar.is_final());
        assert!(ResponseStatus::Ok.is_final());
        assert!(ResponseStatus::Error.is_final());
        assert!(ResponseStatus::Redirect.is_final());
    }
}
