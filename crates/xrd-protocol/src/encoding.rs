//! Fixed-layout marshaling contract
//!
//! Every request and response body implements [`XrdEncode`] and/or
//! [`XrdDecode`]. All integers are big-endian. Decoders check the remaining
//! length before every read so a short payload turns into a
//! [`ProtocolError::IncompleteFrame`] rather than a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Marshal a value into its wire representation
pub trait XrdEncode {
    /// Append the encoded value to `dst`
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError>;
}

/// Unmarshal a value from its wire representation
pub trait XrdDecode: Sized {
    /// Decode a value, consuming the bytes it occupies
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError>;
}

/// Raw payload, returned verbatim
impl XrdDecode for Bytes {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(src.split_to(src.len()))
    }
}

impl XrdEncode for Bytes {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(self);
        Ok(())
    }
}

/// Response body that carries nothing of interest
impl XrdDecode for () {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        src.advance(src.len());
        Ok(())
    }
}

impl XrdEncode for () {
    fn encode(&self, _dst: &mut BytesMut) -> Result<(), ProtocolError> {
        Ok(())
    }
}

/// Encode a value into a standalone buffer
pub fn to_bytes<T: XrdEncode + ?Sized>(value: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    value.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Fail with `IncompleteFrame` unless `src` holds at least `needed` bytes
pub(crate) fn ensure_remaining(src: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if src.remaining() < needed {
        return Err(ProtocolError::IncompleteFrame {
            expected: needed,
            actual: src.remaining(),
        });
    }
    Ok(())
}

/// Write a length-prefixed (`int32`) byte string
pub(crate) fn put_data(dst: &mut BytesMut, data: &[u8]) {
    dst.reserve(4 + data.len());
    dst.put_i32(data.len() as i32);
    dst.extend_from_slice(data);
}

/// Read a length-prefixed (`int32`) byte string
pub(crate) fn get_data(src: &mut Bytes) -> Result<Bytes, ProtocolError> {
    ensure_remaining(src, 4)?;
    let len = src.get_i32();
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    ensure_remaining(src, len as usize)?;
    Ok(src.split_to(len as usize))
}

/// Skip `len` bytes, failing if fewer remain
pub(crate) fn skip(src: &mut Bytes, len: usize) -> Result<(), ProtocolError> {
    ensure_remaining(src, len)?;
    src.advance(len);
    Ok(())
}

/// Copy exactly `N` bytes into an array
pub(crate) fn get_array<const N: usize>(src: &mut Bytes) -> Result<[u8; N], ProtocolError> {
    ensure_remaining(src, N)?;
    let mut out = [0u8; N];
    src.copy_to_slice(&mut out);
    Ok(out)
}
