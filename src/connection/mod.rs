//! Connection Handling Module
//!
//! This module manages client sessions. Each accepted stream is served by
//! its own async task, allowing the server to handle thousands of concurrent
//! clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Handler::handle                             │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ FrameReader │───>│  Executor   │───>│ Connection  │     │
//! │  │ (read half) │    │             │    │ (write half)│     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `client`: [`Connection`], the serialized write side of a session
//! - `handler`: [`Handler`], the per-connection loop and the active set
//! - `wait`: in-flight write tracking with a bounded wait

pub mod client;
pub mod handler;
pub mod wait;

// Re-export commonly used types
pub use client::{Connection, DEFAULT_GRACE_PERIOD};
pub use handler::{ConnectionError, ConnectionStats, Handler, Lifecycle};
pub use wait::Wait;
