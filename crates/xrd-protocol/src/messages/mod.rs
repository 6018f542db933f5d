//! Request and response bodies
//!
//! Every request body is 16 parameter bytes followed by an `int32` data
//! length and the data itself; the [`RequestHeader`](crate::RequestHeader)
//! is written in front of it by the session. Response bodies have no common
//! layout beyond the response header.
//!
//! # Connection Setup
//!
//! A new connection goes through the following exchange before regular
//! requests are accepted:
//!
//! 1. Client sends the 20-byte [`handshake::HandshakeRequest`] on stream `{0, 0}`
//! 2. Client sends [`login::LoginRequest`]; the server answers with a session
//!    id and, optionally, the security protocols it accepts
//! 3. If security information was returned, the client authenticates with
//!    [`auth::AuthRequest`]
//! 4. Client sends [`protocol::ProtocolRequest`] to learn the security level
//!    and signing overrides
//!
//! A secondary socket is attached to an established login with
//! [`bind::BindRequest`], and requests that must be signed are preceded by a
//! [`sigver::SigverRequest`] carrying a SHA-256 digest.

pub mod auth;
pub mod bind;
pub mod handshake;
pub mod login;
pub mod ping;
pub mod protocol;
pub mod sigver;
pub mod stat;
pub mod write;

/// Number of parameter bytes in every request body
pub const REQUEST_PARAMS_SIZE: usize = 16;
