//! API route modules.

pub mod recordings;
pub mod transport;
