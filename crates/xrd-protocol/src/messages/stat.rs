//! File status request

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, get_array, get_data, put_data, skip, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{self, FilepathRequest, Request, RequestKind};

/// Stat request, by path or by open file handle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatRequest {
    pub options: u8,
    pub file_handle: [u8; 4],
    pub path: String,
}

impl StatRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Request for StatRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Stat.as_u16()
    }

    fn filepath_request(&mut self) -> Option<&mut dyn FilepathRequest> {
        Some(self)
    }
}

impl FilepathRequest for StatRequest {
    fn opaque(&self) -> &str {
        request::opaque(&self.path)
    }

    fn set_opaque(&mut self, opaque: &str) {
        request::set_opaque(&mut self.path, opaque);
    }
}

impl XrdEncode for StatRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_u8(self.options);
        dst.put_bytes(0, 11);
        dst.put_slice(&self.file_handle);
        put_data(dst, self.path.as_bytes());
        Ok(())
    }
}

impl XrdDecode for StatRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 1)?;
        let options = src.get_u8();
        skip(src, 11)?;
        let file_handle = get_array(src)?;
        let path = get_data(src)?;
        Ok(Self {
            options,
            file_handle,
            path: String::from_utf8_lossy(&path).into_owned(),
        })
    }
}

/// Status of a file or directory, sent as `"<id> <size> <flags> <mtime>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryStat {
    pub id: i64,
    pub size: i64,
    pub flags: i32,
    pub mtime: i64,
}

impl XrdEncode for EntryStat {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let text = format!("{} {} {} {}", self.id, self.size, self.flags, self.mtime);
        dst.put_slice(text.as_bytes());
        dst.put_u8(0);
        Ok(())
    }
}

impl XrdDecode for EntryStat {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let raw = src.split_to(src.len());
        let text = String::from_utf8_lossy(&raw);
        let fields: Vec<&str> = text.trim_end_matches('\0').split_whitespace().collect();
        if fields.len() < 4 {
            return Err(ProtocolError::Malformed(format!(
                "stat: want 4 fields, got {:?}",
                text
            )));
        }

        let parse = |i: usize| {
            fields[i]
                .parse::<i64>()
                .map_err(|_| ProtocolError::Malformed(format!("stat: bad field {:?}", fields[i])))
        };
        Ok(Self {
            id: parse(0)?,
            size: parse(1)?,
            flags: parse(2)? as i32,
            mtime: parse(3)?,
        })
    }
}
