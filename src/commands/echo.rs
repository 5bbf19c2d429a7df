//! Executor that sends every command straight back to the client.

use crate::commands::Executor;
use crate::connection::Connection;
use crate::protocol::Reply;
use bytes::Bytes;
use tracing::info;

/// Replies to each command with its own arguments as a multi bulk reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoExecutor;

impl EchoExecutor {
    pub fn new() -> Self {
        EchoExecutor
    }
}

impl Executor for EchoExecutor {
    fn execute(&self, _conn: &Connection, args: Vec<Option<Bytes>>) -> Option<Reply> {
        Some(Reply::MultiBulk(args))
    }

    fn on_connection_closed(&self, conn: &Connection) {
        info!(client = %conn.peer_addr(), "Echo executor: client closed");
    }

    fn shutdown(&self) {
        info!("Echo executor shut down");
    }
}
