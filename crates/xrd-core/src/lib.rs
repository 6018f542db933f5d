//! xrd-core: Shared configuration, errors and security providers
//!
//! This crate provides the configuration structures, the error taxonomy and
//! the `Auther` contract used by the XRootD client engine.

pub mod config;
pub mod error;
pub mod traits;

pub use config::ClientConfig;
pub use error::{AuthError, ConfigError, ConnectionError, SessionError, XrdError};
pub use traits::{Auther, UnixAuther};
