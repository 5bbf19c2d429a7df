//! Request Handler
//!
//! The [`Handler`] owns every client session of a server. Each accepted
//! stream gets its own call to [`Handler::handle`], which runs on the
//! connection's task until the client goes away or the server shuts down.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Stream accepted
//!        │
//!        ▼
//! 2. Closing? ──yes──> close stream, done
//!        │ no
//!        ▼
//! 3. Register Connection in the active set
//!        │
//!        ▼
//! 4. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  next payload from parser    │
//!    │     │                        │
//!    │     ├─ fatal error ──> exit  │
//!    │     ├─ protocol error        │
//!    │     │    └─> -ERR reply      │
//!    │     ├─ not a command ─> skip │
//!    │     └─ command               │
//!    │          └─> execute, reply  │
//!    │                              │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 5. Close Connection, notify executor, deregister
//! ```
//!
//! ## Shutdown
//!
//! [`Handler::close`] flips the handler into draining mode, closes every
//! registered connection concurrently (each with its own grace period) and
//! finally tells the executor to release its resources.

use crate::commands::Executor;
use crate::connection::client::{Connection, DEFAULT_GRACE_PERIOD};
use crate::protocol::{FrameReader, ParseError, Reply};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Written when the executor produced no reply object at all.
const UNKNOWN_ERR_REPLY: &[u8] = b"-ERR unknown\r\n";

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands handed to the executor
    pub commands_processed: AtomicU64,
    /// Malformed frames reported back to clients
    pub protocol_errors: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Where the handler is in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// Serving new connections and new frames.
    Accepting = 0,
    /// `close()` has started; new connections and frames are refused.
    Draining = 1,
    /// Every connection is closed and the executor has been shut down.
    Stopped = 2,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Accepting,
            1 => Lifecycle::Draining,
            _ => Lifecycle::Stopped,
        }
    }
}

/// Errors that end a client session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The stream could no longer be decoded
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// Writing a reply failed
    #[error("write failed: {0}")]
    Write(#[from] io::Error),
}

/// Serves RESP clients on behalf of a command executor.
pub struct Handler {
    executor: Arc<dyn Executor>,
    /// Connections currently being served, keyed by connection id.
    active: Mutex<HashMap<u64, Arc<Connection>>>,
    state: AtomicU8,
    next_id: AtomicU64,
    grace_period: Duration,
    stats: Arc<ConnectionStats>,
}

impl Handler {
    /// Creates a handler using the default close grace period.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::with_grace_period(executor, DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(executor: Arc<dyn Executor>, grace_period: Duration) -> Self {
        Self {
            executor,
            active: Mutex::new(HashMap::new()),
            state: AtomicU8::new(Lifecycle::Accepting as u8),
            next_id: AtomicU64::new(1),
            grace_period,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Returns true once `close()` has been called.
    pub fn is_closing(&self) -> bool {
        self.lifecycle() != Lifecycle::Accepting
    }

    /// Number of connections currently registered.
    pub fn active_connections(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<u64, Arc<Connection>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `conn` to the active set unless the handler is closing.
    ///
    /// The lifecycle check and the insert happen under the same lock that
    /// `close()` takes to snapshot the set, so no connection slips past it.
    fn register(&self, conn: &Arc<Connection>) -> Option<Registration<'_>> {
        let mut active = self.lock_active();
        if self.is_closing() {
            return None;
        }
        active.insert(conn.id(), Arc::clone(conn));
        self.stats.connection_opened();
        Some(Registration {
            handler: self,
            conn: Arc::clone(conn),
        })
    }

    /// Serves one client stream until it ends or the handler closes.
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::new(id, peer, writer, self.grace_period));

        let Some(registration) = self.register(&conn) else {
            debug!(client = %peer, "Handler is closing, refusing connection");
            conn.close().await;
            return;
        };

        info!(client = %peer, id, "Client connected");

        match self.serve(&conn, FrameReader::new(reader)).await {
            Ok(()) => debug!(client = %peer, "Connection closed by server"),
            Err(ConnectionError::Parse(ParseError::Eof)) => {
                info!(client = %peer, "Client disconnected")
            }
            Err(ConnectionError::Parse(ParseError::Io(ref e)))
            | Err(ConnectionError::Write(ref e))
                if e.kind() == io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %peer, "Connection reset by client")
            }
            Err(e) => warn!(client = %peer, error = %e, "Connection error"),
        }

        conn.close().await;
        drop(registration);
    }

    /// The read-execute-respond loop.
    ///
    /// Returns `Ok(())` when the handler shut the connection down.
    async fn serve<R>(
        &self,
        conn: &Connection,
        mut frames: FrameReader<R>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let payload = tokio::select! {
                payload = frames.next_payload() => payload,
                _ = conn.closed() => return Ok(()),
            };

            let frame = match payload {
                Some(Ok(frame)) => frame,
                Some(Err(ParseError::Protocol(msg))) => {
                    warn!(client = %conn.peer_addr(), error = %msg, "Protocol error");
                    self.stats.protocol_error();
                    self.send(conn, &Reply::protocol_error(msg).to_bytes())
                        .await?;
                    continue;
                }
                Some(Err(err)) => return Err(err.into()),
                None => return Err(ParseError::Eof.into()),
            };

            let args = match frame {
                Reply::MultiBulk(args) => args,
                other => {
                    error!(
                        client = %conn.peer_addr(),
                        frame = ?other,
                        "Expected a multi bulk command, ignoring frame"
                    );
                    continue;
                }
            };

            if self.is_closing() {
                return Ok(());
            }

            let reply = self.executor.execute(conn, args);
            self.stats.command_processed();

            match reply {
                Some(reply) => {
                    trace!(client = %conn.peer_addr(), reply = %reply, "Sending reply");
                    self.send(conn, &reply.to_bytes()).await?;
                }
                None => self.send(conn, UNKNOWN_ERR_REPLY).await?,
            }
        }
    }

    async fn send(&self, conn: &Connection, bytes: &[u8]) -> io::Result<()> {
        conn.write(bytes).await?;
        self.stats.bytes_written(bytes.len());
        Ok(())
    }

    /// Stops accepting work and closes every active connection.
    ///
    /// Safe to call concurrently; every call returns only after all
    /// connections that were active when it started have been closed.
    pub async fn close(&self) {
        let (first, connections) = {
            let active = self.lock_active();
            let first = self
                .state
                .compare_exchange(
                    Lifecycle::Accepting as u8,
                    Lifecycle::Draining as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();
            (first, active.values().cloned().collect::<Vec<_>>())
        };

        info!(connections = connections.len(), "Handler shutting down");

        let mut closing = JoinSet::new();
        for conn in connections {
            closing.spawn(async move { conn.close().await });
        }
        while let Some(res) = closing.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "Connection close task failed");
            }
        }

        if first {
            self.executor.shutdown();
            self.state.store(Lifecycle::Stopped as u8, Ordering::SeqCst);
            info!("Handler closed");
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("lifecycle", &self.lifecycle())
            .field("active_connections", &self.active_connections())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

/// Ends a registered session: notifies the executor and removes the
/// connection from the active set. Also runs when the connection's task
/// unwinds, in which case the stream is dropped along with the task.
struct Registration<'a> {
    handler: &'a Handler,
    conn: Arc<Connection>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if !self.conn.is_closed() {
            self.conn.abort();
        }
        self.handler.executor.on_connection_closed(&self.conn);
        self.handler.lock_active().remove(&self.conn.id());
        self.handler.stats.connection_closed();
    }
}
