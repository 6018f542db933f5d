//! Authentication request and security information parsing

use bytes::{BufMut, Bytes, BytesMut};

use crate::encoding::{get_array, get_data, put_data, skip, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{Request, RequestKind};

/// Authentication request carrying provider-specific credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Provider name, zero-padded to four bytes
    pub credential_type: [u8; 4],
    pub credentials: Bytes,
}

impl AuthRequest {
    pub fn new(provider: &str, credentials: impl Into<Bytes>) -> Self {
        let mut credential_type = [0u8; 4];
        let len = provider.len().min(4);
        credential_type[..len].copy_from_slice(&provider.as_bytes()[..len]);
        Self {
            credential_type,
            credentials: credentials.into(),
        }
    }
}

impl Request for AuthRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Auth.as_u16()
    }
}

impl XrdEncode for AuthRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_bytes(0, 12);
        dst.put_slice(&self.credential_type);
        put_data(dst, &self.credentials);
        Ok(())
    }
}

impl XrdDecode for AuthRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        skip(src, 12)?;
        let credential_type = get_array::<4>(src)?;
        let credentials = get_data(src)?;
        Ok(Self {
            credential_type,
            credentials,
        })
    }
}

/// One security protocol offered by the server at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityProvider {
    /// Provider name, e.g. `unix` or `krb5`
    pub name: String,
    /// Comma-separated parameters that followed the name
    pub params: Vec<String>,
}

/// Split login security information (`&P=<name>,<params>&P=...`) into the
/// offered providers, in server order
pub fn parse_security_info(info: &[u8]) -> Vec<SecurityProvider> {
    let info = String::from_utf8_lossy(info);
    info.split("&P=")
        .map(|part| part.trim_end_matches('\0').trim())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut fields = part.split(',');
            let name = fields.next().unwrap_or_default().to_string();
            let params = fields
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            SecurityProvider { name, params }
        })
        .collect()
}
