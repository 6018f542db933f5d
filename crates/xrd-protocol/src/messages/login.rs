//! Login request and response

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::encoding::{ensure_remaining, get_array, get_data, put_data, XrdDecode, XrdEncode};
use crate::error::ProtocolError;
use crate::request::{Request, RequestKind};

/// Length of the username field; longer names are truncated
pub const USERNAME_SIZE: usize = 8;

/// Length of the session id returned by the server
pub const SESSION_ID_SIZE: usize = 16;

/// Client capability version (`kXR_ver004`)
pub const CAPABILITY_VERSION: u8 = 4;

/// Identifier of a logged-in session, used to bind secondary sockets
pub type SessionId = [u8; SESSION_ID_SIZE];

/// Login request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub pid: i32,
    pub username: [u8; USERNAME_SIZE],
    pub ability: u8,
    pub capability_version: u8,
    pub role: u8,
    /// Token handed out by a redirector, empty for a direct login
    pub token: Bytes,
}

impl LoginRequest {
    pub fn new(username: &str, token: impl Into<Bytes>) -> Self {
        let mut name = [0u8; USERNAME_SIZE];
        let len = username.len().min(USERNAME_SIZE);
        name[..len].copy_from_slice(&username.as_bytes()[..len]);

        Self {
            pid: std::process::id() as i32,
            username: name,
            ability: 0,
            capability_version: CAPABILITY_VERSION,
            role: 0,
            token: token.into(),
        }
    }

    /// Username without trailing padding
    pub fn username(&self) -> String {
        let end = self
            .username
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(USERNAME_SIZE);
        String::from_utf8_lossy(&self.username[..end]).into_owned()
    }
}

impl Request for LoginRequest {
    fn request_id(&self) -> u16 {
        RequestKind::Login.as_u16()
    }
}

impl XrdEncode for LoginRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_i32(self.pid);
        dst.put_slice(&self.username);
        dst.put_u8(0); // reserved
        dst.put_u8(self.ability);
        dst.put_u8(self.capability_version);
        dst.put_u8(self.role);
        put_data(dst, &self.token);
        Ok(())
    }
}

impl XrdDecode for LoginRequest {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(src, 16)?;
        let pid = src.get_i32();
        let username = get_array::<USERNAME_SIZE>(src)?;
        src.advance(1);
        let ability = src.get_u8();
        let capability_version = src.get_u8();
        let role = src.get_u8();
        let token = get_data(src)?;
        Ok(Self {
            pid,
            username,
            ability,
            capability_version,
            role,
            token,
        })
    }
}

/// Login response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginResponse {
    pub session_id: SessionId,
    /// `&P=<provider>,<params>` list of accepted security protocols
    pub security_info: Bytes,
}

impl XrdEncode for LoginResponse {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.put_slice(&self.session_id);
        dst.put_slice(&self.security_info);
        Ok(())
    }
}

impl XrdDecode for LoginResponse {
    fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let session_id = get_array::<SESSION_ID_SIZE>(src)?;
        let security_info = src.split_to(src.len());
        Ok(Self {
            session_id,
            security_info,
        })
    }
}
