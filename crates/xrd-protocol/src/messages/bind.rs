//! Binding a secondary socket to an existing login

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, get_array, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::messages::login::SessionId;
use crate::request::{Request, RequestKind};
use crate::stream::PathId;

/// Bind request, sent on the new socket instead of a login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRequest {
    /// Session id returned by the parent's login
    pub session_id: SessionId,
}

impl BindRequest {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }
}

impl Request for BindRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Bind.as_u16()
    }
}

impl XrdEncode for BindRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_slice(&self.session_id);
        dst.put_i32(0);
        Ok(())
    }
}

impl XrdDecode for BindRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let session_id = get_array(src)?;
        ensure_remaining(src, 4)?;
        src.advance(4);
        Ok(Self { session_id })
    }
}

/// Bind response: the path id the parent uses to address the new socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindResponse {
    pub path_id: PathId,
}

impl XrdEncode for BindResponse {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_u8(self.path_id.as_u8());
        Ok(())
    }
}

impl XrdDecode for BindResponse {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 1)?;
        Ok(Self {
            path_id: PathId(src.get_u8()),
        })
    }
}
