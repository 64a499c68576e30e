//! Data models for Proxywarden
//!
//! Shared between the capture sink, the history store, and the control API.

pub mod entry;

pub use entry::*;
