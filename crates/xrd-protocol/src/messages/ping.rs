//! Liveness check

use bytes::{BufMut, Bytes, BytesMut};

use crate::encoding::{skip, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{Request, RequestKind};

/// Ping request; the server answers with an empty `Ok`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingRequest;

impl Request for PingRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Ping.as_u16()
    }
}

impl XrdEncode for PingRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_bytes(0, 16);
        dst.put_i32(0);
        Ok(())
    }
}

impl XrdDecode for PingRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        skip(src, 20)?;
        Ok(Self)
    }
}
