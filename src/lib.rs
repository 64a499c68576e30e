//! # Proxywarden
//!
//! Control plane for an intercepting proxy. Proxywarden supervises an
//! external proxy engine process and persists the traffic its capture hook
//! reports. A small HTTP API lets the UI browse and replay that history
//! and tune the live settings.
//!
//! ## Features
//!
//! - Proxy engine lifecycle with port gating and crash detection
//! - Two-phase request/response capture into a file-backed history
//! - Lossless storage/display entry transforms, legacy flat shape included
//! - Sparse settings updates with restart-and-revert semantics
//! - Session export/import and a single-request repeater
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Web UI (HTTP)                       │
//! ├─────────────────────────────────────────────────────────┤
//! │                 Control API (axum router)                │
//! ├─────────────────────────────────────────────────────────┤
//! │                     Proxywarden Core                     │
//! │  ┌──────────┐  ┌──────────┐  ┌─────────┐  ┌──────────┐  │
//! │  │  Engine  │  │ Capture  │  │ History │  │ Settings │  │
//! │  │Supervisor│──│   Sink   │──│  Store  │──│Controller│  │
//! │  └──────────┘  └──────────┘  └─────────┘  └──────────┘  │
//! └──────┬──────────────────────────────────────────────────┘
//!        │ spawns / signals
//! ┌──────┴──────────────────────────────────────────────────┐
//! │            Proxy engine process (mitmdump)               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod capture;
pub mod config;
pub mod engine;
pub mod models;
pub mod replay;
pub mod settings;
pub mod storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
