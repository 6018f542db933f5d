//! xrd-protocol: Wire protocol for the XRootD remote file-access protocol
//!
//! This crate defines the fixed-layout binary encoding used between clients
//! and servers: request and response headers, the marshaling contract every
//! request and response body implements, status-specific payloads (errors,
//! waits and redirections), request signing policy and the bodies the client
//! engine itself exchanges while setting up a connection.

pub mod codec;
pub mod encoding;
pub mod error;
pub mod header;
pub mod messages;
pub mod request;
pub mod response;
pub mod signing;
pub mod stream;

pub use codec::{
    read_request, write_response, RequestFrame, ResponseCodec, ResponseFrame, MAX_PAYLOAD_SIZE,
};
pub use encoding::{to_bytes, XrdDecode, XrdEncode};
pub use error::ProtocolError;
pub use header::{
    RequestHeader, ResponseHeader, ResponseStatus, REQUEST_FIXED_SIZE, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};
pub use request::{DataDirection, DataRequest, FilepathRequest, Request, RequestKind};
pub use response::{Redirection, ServerError, ServerErrorCode, WaitResponse};
pub use signing::{RequestLevel, SecurityLevel, SecurityOverride, SignRequirements};
pub use stream::{PathId, StreamId, STREAM_ID_POOL_SIZE};
