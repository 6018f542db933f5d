//! Request identifiers and the request contract
//!
//! Concrete request bodies live in [`crate::messages`]. The session engine
//! only relies on the traits defined here: every request knows its id and
//! how to marshal its body, may declare itself potentially destructive (for
//! the `SignLikely` policy), and may expose a payload that can travel on a
//! bound data socket or a path that can carry opaque redirect data.

use bytes::Bytes;

use crate::encoding::XrdEncode;
use crate::stream::PathId;

/// Request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestKind {
    Auth = 3000,
    Query = 3001,
    Chmod = 3002,
    Close = 3003,
    Dirlist = 3004,
    Protocol = 3006,
    Login = 3007,
    Mkdir = 3008,
    Mv = 3009,
    Open = 3010,
    Ping = 3011,
    Read = 3013,
    Rm = 3014,
    Rmdir = 3015,
    Sync = 3016,
    Stat = 3017,
    Set = 3018,
    Write = 3019,
    Prepare = 3021,
    Statx = 3022,
    Endsess = 3023,
    Bind = 3024,
    Readv = 3025,
    VerifyW = 3026,
    Locate = 3027,
    Truncate = 3028,
    Sigver = 3029,
}

impl RequestKind {
    /// Convert to the wire value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Convert from the wire value
    pub fn from_u16(value: u16) -> Option<Self> {
        use RequestKind::*;
        let kind = match value {
            3000 => Auth,
            3001 => Query,
            3002 => Chmod,
            3003 => Close,
            3004 => Dirlist,
            3006 => Protocol,
            3007 => Login,
            3008 => Mkdir,
            3009 => Mv,
            3010 => Open,
            3011 => Ping,
            3013 => Read,
            3014 => Rm,
            3015 => Rmdir,
            3016 => Sync,
            3017 => Stat,
            3018 => Set,
            3019 => Write,
            3021 => Prepare,
            3022 => Statx,
            3023 => Endsess,
            3024 => Bind,
            3025 => Readv,
            3026 => VerifyW,
            3027 => Locate,
            3028 => Truncate,
            3029 => Sigver,
            _ => return None,
        };
        Some(kind)
    }
}

/// A request that can be sent over a session
pub trait Request: XrdEncode + Send + Sync {
    /// Identifier written into the request header
    fn request_id(&self) -> u16;

    /// Whether the request may modify data or metadata on the server.
    ///
    /// Consulted only when the negotiated policy for this request id is
    /// `SignLikely`.
    fn should_sign(&self) -> bool {
        false
    }

    /// Access the data-path view of this request, if it carries a payload
    fn data_request(&mut self) -> Option<&mut dyn DataRequest> {
        None
    }

    /// Access the file-path view of this request, if it names a path
    fn filepath_request(&mut self) -> Option<&mut dyn FilepathRequest> {
        None
    }
}

/// Direction of a data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// The request obtains data from the server
    Read,
    /// The request sends data to the server
    Write,
}

/// A request whose payload may travel on a bound data socket
pub trait DataRequest {
    /// Socket which carries the payload
    fn path_id(&self) -> PathId;

    /// Select the socket which carries the payload
    fn set_path_id(&mut self, path_id: PathId);

    /// Whether the payload flows to or from the server
    fn direction(&self) -> DataDirection;

    /// Payload sent after the request body, on the selected path
    fn path_data(&self) -> Bytes;
}

/// A request that names a path which can carry opaque data
pub trait FilepathRequest {
    /// Opaque data currently attached to the path
    fn opaque(&self) -> &str;

    /// Replace the opaque data attached to the path
    fn set_opaque(&mut self, opaque: &str);
}

/// Replace the opaque part (anything after the last `?`) of a path; an
/// empty `opaque` removes it
pub fn set_opaque(path: &mut String, opaque: &str) {
    if let Some(pos) = path.rfind('?') {
        path.truncate(pos);
    }
    if !opaque.is_empty() {
        path.push('?');
        path.push_str(opaque);
    }
}

/// Opaque part of a path, empty when there is none
pub fn opaque(path: &str) -> &str {
    match path.rfind('?') {
        Some(pos) => &path[pos + 1..],
        None => "",
    }
}
