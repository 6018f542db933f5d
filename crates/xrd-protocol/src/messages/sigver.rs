//! Signing envelope
//!
//! A `sigver` request immediately precedes the request it signs, on the same
//! stream. The signature is the SHA-256 digest of the big-endian sequence
//! number followed by the signed request bytes (header and body).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::encoding::{ensure_remaining, get_data, put_data, skip, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::header::REQUEST_FIXED_SIZE;
use crate::request::{Request, RequestKind};

/// The signed request carries no data
pub const FLAG_NO_DATA: u8 = 0x01;

/// Digest algorithm identifier for SHA-256
pub const CRYPTO_SHA256: u8 = 0x01;

/// Signature request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigverRequest {
    /// Request id of the signed request
    pub expected_id: u16,
    pub version: u8,
    pub flags: u8,
    /// Monotonically increasing per-session sequence number
    pub seq_id: i64,
    pub crypto: u8,
    pub signature: Bytes,
}

impl SigverRequest {
    /// Sign the marshaled request `data` with sequence number `seq_id`
    pub fn new(expected_id: u16, seq_id: i64, data: &[u8]) -> Self {
        Self {
            expected_id,
            version: 0,
            flags: if carries_data(data) { 0 } else { FLAG_NO_DATA },
            seq_id,
            crypto: CRYPTO_SHA256,
            signature: Bytes::from(digest(seq_id, data)),
        }
    }

    /// Whether `data` is the request this envelope signs
    pub fn verify(&self, data: &[u8]) -> bool {
        self.signature.as_ref() == digest(self.seq_id, data).as_slice()
    }
}

fn carries_data(data: &[u8]) -> bool {
    data.len() >= REQUEST_FIXED_SIZE
        && data[REQUEST_FIXED_SIZE - 4..REQUEST_FIXED_SIZE] != [0, 0, 0, 0]
}

fn digest(seq_id: i64, data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(seq_id.to_be_bytes());
    hasher.update(data);
    hasher.finalize().to_vec()
}

impl Request for SigverRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Sigver.as_u16()
    }
}

impl XrdEncode for SigverRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_u16(self.expected_id);
        dst.put_u8(self.version);
        dst.put_u8(self.flags);
        dst.put_i64(self.seq_id);
        dst.put_u8(self.crypto);
        dst.put_bytes(0, 3);
        put_data(dst, &self.signature);
        Ok(())
    }
}

impl XrdDecode for SigverRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 13)?;
        let expected_id = src.get_u16();
        let version = src.get_u8();
        let flags = src.get_u8();
        let seq_id = src.get_i64();
        let crypto = src.get_u8();
        skip(src, 3)?;
        let signature = get_data(src)?;
        Ok(Self {
            expected_id,
            version,
            flags,
            seq_id,
            crypto,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::to_bytes;

    #[test]
    fn test_signature_covers_sequence_and_data() {
        let data = [0u8; REQUEST_FIXED_SIZE];
        let req = SigverRequest::new(3011, 1, &data);
        assert_eq!(req.signature.len(), 32);
        assert_eq!(req.flags, FLAG_NO_DATA);
        assert!(req.verify(&data));

        let other = SigverRequest::new(3011, 2, &data);
        assert_ne!(other.signature, req.signature);
        assert!(!req.verify(&[1u8; REQUEST_FIXED_SIZE]));
    }

    #[test]
    fn test_flags_with_data() {
        let mut data = vec![0u8; REQUEST_FIXED_SIZE];
        data[REQUEST_FIXED_SIZE - 1] = 3;
        data.extend_from_slice(b"abc");
        assert_eq!(SigverRequest::new(3019, 1, &data).flags, 0);
    }

    #[test]
    fn test_layout() {
        let req = SigverRequest::new(3011, 7, b"");
        let bytes = to_bytes(&req).unwrap();
        assert_eq!(bytes.len(), 16 + 4 + 32);
        assert_eq!(&bytes[..2], &[0x0B, 0xC3]);
        assert_eq!(&bytes[4..12], &7i64.to_be_bytes());
        assert_eq!(bytes[12], CRYPTO_SHA256);
        assert_eq!(SigverRequest::decode(&mut bytes.clone()).unwrap(), req);
    }
}
