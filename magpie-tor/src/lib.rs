//! Magpie Tor Layer
//!
//! Tor-facing plumbing for the harvesting engine:
//! - SOCKS5h proxy configuration shared with browser launches
//! - Minimal control-port client (authenticate, NEWNYM, status)
//! - Circuit manager with the rotation counter and serialization lock

pub mod circuit;
pub mod control;
pub mod proxy;

pub use circuit::*;
pub use control::*;
pub use proxy::*;
