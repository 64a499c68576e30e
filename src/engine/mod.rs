//! Proxy engine lifecycle
//!
//! This module owns the external engine process and the port coordination
//! around its restarts.

pub mod ports;
pub mod supervisor;

pub use supervisor::*;
