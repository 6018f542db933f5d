//! Core trait definitions

mod auther;

pub use auther::{Auther, UnixAuther};
