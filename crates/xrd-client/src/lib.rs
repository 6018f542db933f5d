//! xrd-client: multiplexed XRootD client
//!
//! A [`Client`] keeps one [`Session`] per server and follows redirections
//! between them. Each session multiplexes concurrent requests over a single
//! connection through a [`Mux`], replays requests the server asks to wait
//! on, signs requests the server requires signed, and moves bulk payloads
//! onto bound sub-sessions.

pub mod client;
pub mod mux;
pub mod session;

pub use client::{normalize_addr, Client, DEFAULT_PORT};
pub use mux::{Mux, ResponseReceiver, ServerResponse};
pub use session::{Reply, Session, SessionOptions};
