//! # FlashRESP - An Async RESP Protocol Engine
//!
//! FlashRESP is the network half of a Redis-compatible server: it decodes the
//! RESP wire protocol from client streams, hands each command to a pluggable
//! [`Executor`], writes the reply back and shuts every connection down
//! cleanly when the server stops.
//!
//! ## Features
//!
//! - **Streaming Parser**: Frames are decoded incrementally from any
//!   `AsyncRead`, however the bytes are chunked
//! - **Recoverable Errors**: A malformed frame gets a `-protocol error` reply
//!   and the connection keeps going
//! - **Graceful Shutdown**: In-flight replies get a grace period before a
//!   connection is torn down
//! - **Async I/O**: Built on Tokio, one task per client
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashRESP                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│   Handler   │───>│  Executor   │                  │
//! │  │ (Listener)  │    │ (per client)│    │ (dyn trait) │                  │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘                  │
//! │                            │                                            │
//! │              ┌─────────────┴─────────────┐                              │
//! │              ▼                           ▼                              │
//! │  ┌──────────────────────┐    ┌──────────────────────┐                   │
//! │  │     FrameReader      │    │      Connection      │                   │
//! │  │  (RESP read state)   │    │ (serialized writes,  │                   │
//! │  │                      │    │  in-flight tracking) │                   │
//! │  └──────────────────────┘    └──────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashresp::{CommandHandler, Config, Server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = Config::default();
//!     let server = Server::bind(&config, Arc::new(CommandHandler::default())).await?;
//!     server.run(flashresp::server::shutdown_signal()).await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP reply types and the streaming frame reader
//! - [`connection`]: Per-client sessions and the connection handler
//! - [`commands`]: The [`Executor`] boundary and the built-in executors
//! - [`config`]: `redis.conf`-style configuration and command-line flags
//! - [`server`]: TCP accept loop and shutdown sequence

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, EchoExecutor, Executor};
pub use config::{Config, ConfigError, Invocation};
pub use connection::{Connection, ConnectionStats, Handler};
pub use protocol::{FrameReader, ParseError, Payload, Reply};
pub use server::{Server, StopHandle};

/// The default port FlashRESP listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FlashRESP binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashRESP
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
