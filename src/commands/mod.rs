//! Command Execution
//!
//! The protocol engine treats command execution as a black box: a decoded
//! argument list goes in, a [`Reply`] (or nothing) comes out. This module
//! defines that boundary and ships two executors.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  FrameReader    │  (protocol module)
//! └────────┬────────┘
//!          │ Vec<Option<Bytes>>
//!          ▼
//! ┌─────────────────┐
//! │ dyn Executor    │  (this module)
//! │                 │
//! │ - EchoExecutor  │
//! │ - CommandHandler│
//! └────────┬────────┘
//!          │ Option<Reply>
//!          ▼
//!    Connection::write
//! ```
//!
//! ## Built-in Commands
//!
//! [`CommandHandler`] understands `PING`, `ECHO` and `SELECT`.
//! [`EchoExecutor`] replies to everything with its own arguments.

pub mod echo;
pub mod handler;

pub use echo::EchoExecutor;
pub use handler::CommandHandler;

use crate::connection::Connection;
use crate::protocol::Reply;
use bytes::Bytes;

/// Turns decoded command arguments into replies.
///
/// One executor is shared by every connection of a server, so
/// implementations guard their own state.
pub trait Executor: Send + Sync {
    /// Runs one command.
    ///
    /// `args` holds the elements of the request array in order; `None` marks
    /// a null bulk string. Returning `None` makes the handler answer with a
    /// generic `-ERR unknown` error.
    fn execute(&self, conn: &Connection, args: Vec<Option<Bytes>>) -> Option<Reply>;

    /// Called after a client connection has been closed.
    fn on_connection_closed(&self, _conn: &Connection) {}

    /// Called once when the handler shuts down.
    fn shutdown(&self) {}
}
