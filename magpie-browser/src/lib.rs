//! Magpie Browser Layer
//!
//! Headless-browser driving for hidden services:
//! - Per-URL Chromium instances, SOCKS-proxied through Tor
//! - DOM helpers for scrolling, clicking, and form interrogation
//! - In-page screenshot annotation of extracted addresses
//! - The CAPTCHA solver collaborator interface

pub mod annotate;
pub mod captcha;
pub mod dom;
pub mod driver;

pub use annotate::*;
pub use captcha::*;
pub use dom::*;
pub use driver::*;
