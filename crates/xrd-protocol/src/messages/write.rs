//! Write request
//!
//! The payload does not belong to the marshaled body: it follows the body on
//! the control socket, or travels on a bound socket when `path_id` names one.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, get_array, skip, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{DataDirection, DataRequest, Request, RequestKind};
use crate::stream::PathId;

/// Write `data` at `offset` into an open file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteRequest {
    pub file_handle: [u8; 4],
    pub offset: i64,
    pub path_id: PathId,
    pub data: Bytes,
}

impl WriteRequest {
    pub fn new(file_handle: [u8; 4], offset: i64, data: impl Into<Bytes>) -> Self {
        Self {
            file_handle,
            offset,
            path_id: PathId::CONTROL,
            data: data.into(),
        }
    }
}

impl Request for WriteRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Write.as_u16()
    }

    fn should_sign(&self) -> bool {
        true
    }

    fn data_request(&mut self) -> Option<&mut dyn DataRequest> {
        Some(self)
    }
}

impl DataRequest for WriteRequest {
    fn path_id(&self) -> PathId {
        self.path_id
    }

    fn set_path_id(&mut self, path_id: PathId) {
        self.path_id = path_id;
    }

    fn direction(&self) -> DataDirection {
        DataDirection::Write
    }

    fn path_data(&self) -> Bytes {
        self.data.clone()
    }
}

impl XrdEncode for WriteRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_slice(&self.file_handle);
        dst.put_i64(self.offset);
        dst.put_u8(self.path_id.as_u8());
        dst.put_bytes(0, 3);
        dst.put_i32(self.data.len() as i32);
        Ok(())
    }
}

/// Decodes the fixed part only; the payload is read from whichever socket
/// `path_id` names
impl XrdDecode for WriteRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let file_handle = get_array(src)?;
        ensure_remaining(src, 9)?;
        let offset = src.get_i64();
        let path_id = PathId(src.get_u8());
        skip(src, 3)?;
        ensure_remaining(src, 4)?;
        let dlen = src.get_i32();
        if dlen < 0 {
            return Err(ProtocolError::InvalidLength(dlen));
        }
        let inline = src.len().min(dlen as usize);
        Ok(Self {
            file_handle,
            offset,
            path_id,
            data: src.split_to(inline),
        })
    }
}

/// Offset of the path id within a marshaled write request (header included)
pub const PATH_ID_OFFSET: usize = 4 + 4 + 8;
