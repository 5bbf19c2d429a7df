//! Built-in Command Handler
//!
//! A deliberately small command set for running the server on its own. Data
//! commands live in whatever executor the server is embedded with.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `SELECT index` - Switch the connection's logical database
//!
//! Anything else is answered with `-ERR unknown command '<name>'`.

use crate::commands::Executor;
use crate::connection::Connection;
use crate::protocol::Reply;
use bytes::Bytes;

/// Default number of logical databases.
pub const DEFAULT_DATABASES: usize = 16;

/// Dispatches the built-in connection commands.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// Number of logical databases `SELECT` accepts
    databases: usize,
}

impl CommandHandler {
    pub fn new(databases: usize) -> Self {
        Self { databases }
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, conn: &Connection, cmd: &str, args: &[Option<Bytes>]) -> Reply {
        match cmd {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SELECT" => self.cmd_select(conn, args),

            // Unknown command
            _ => Reply::error(format!("ERR unknown command '{}'", cmd.to_lowercase())),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Option<Bytes>]) -> Reply {
        match args {
            [] => Reply::pong(),
            [msg] => Reply::Bulk(msg.clone()),
            _ => Reply::arg_num_error("ping"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Option<Bytes>]) -> Reply {
        match args {
            [msg] => Reply::Bulk(msg.clone()),
            _ => Reply::arg_num_error("echo"),
        }
    }

    /// SELECT index
    fn cmd_select(&self, conn: &Connection, args: &[Option<Bytes>]) -> Reply {
        let [index] = args else {
            return Reply::arg_num_error("select");
        };

        let index = index
            .as_deref()
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.parse::<i64>().ok());

        match index {
            None => Reply::error("ERR value is not an integer or out of range"),
            Some(i) if i < 0 || i as u64 >= self.databases as u64 => {
                Reply::error("ERR DB index is out of range")
            }
            Some(i) => {
                conn.select_db(i as usize);
                Reply::ok()
            }
        }
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASES)
    }
}

impl Executor for CommandHandler {
    fn execute(&self, conn: &Connection, args: Vec<Option<Bytes>>) -> Option<Reply> {
        let Some((name, rest)) = args.split_first() else {
            return Some(Reply::unknown_error());
        };

        // Command names are case-insensitive
        let cmd = match name.as_deref().map(std::str::from_utf8) {
            Some(Ok(name)) if !name.is_empty() => name.to_uppercase(),
            _ => return Some(Reply::unknown_error()),
        };

        Some(self.dispatch(conn, &cmd, rest))
    }
}
