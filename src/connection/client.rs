//! Client Connection
//!
//! A [`Connection`] is the write side of one client session plus the bits of
//! per-session state a command executor may need (the selected database).
//!
//! Writes are serialized by a mutex and counted while in flight. Closing
//! waits a bounded grace period for those writes to drain, then shuts the
//! stream down whether or not they finished.

use crate::connection::wait::Wait;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// How long `close()` waits for in-flight writes by default.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One client session.
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    /// `None` once the connection has been closed.
    writer: Mutex<Option<BoxedWriter>>,
    in_flight: Wait,
    closed: watch::Sender<bool>,
    selected_db: AtomicUsize,
    grace_period: Duration,
}

impl Connection {
    /// Wraps the write half of a client stream.
    pub fn new<W>(id: u64, peer: SocketAddr, writer: W, grace_period: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            writer: Mutex::new(Some(Box::new(writer))),
            in_flight: Wait::new(),
            closed,
            selected_db: AtomicUsize::new(0),
            grace_period,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Writes `bytes` to the client, exclusive of any other writer.
    ///
    /// An empty slice is a no-op. Fails if the connection is closed, or gets
    /// closed while this write is still blocked.
    pub async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let _pending = self.in_flight.add();
        let mut closed = self.closed.subscribe();
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(closed_error)?;

        tokio::select! {
            res = async {
                stream.write_all(bytes).await?;
                stream.flush().await
            } => res,
            _ = closed.wait_for(|closed| *closed) => Err(closed_error()),
        }
    }

    /// Number of writes currently queued or in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Closes the connection.
    ///
    /// Waits up to the grace period for in-flight writes, then shuts the
    /// stream down unconditionally. Calling it again is harmless.
    pub async fn close(&self) {
        if self.in_flight.wait_with_timeout(self.grace_period).await {
            warn!(
                client = %self.peer,
                pending = self.in_flight(),
                "Timed out waiting for in-flight writes, closing anyway"
            );
        }

        // Aborts writes still stuck on the socket and wakes the reader.
        self.closed.send_replace(true);

        let mut writer = self.writer.lock().await;
        if let Some(mut stream) = writer.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(client = %self.peer, error = %e, "Error shutting down stream");
            }
        }
    }

    /// Marks the connection closed without waiting for in-flight writes or
    /// shutting the stream down. Pending writes fail and the reader wakes up;
    /// the stream closes when its owner drops it.
    pub(crate) fn abort(&self) {
        self.closed.send_replace(true);
    }

    /// Returns true once `close()` has started tearing the connection down.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once `close()` has started tearing the connection down.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Index of the logical database this client works against.
    pub fn selected_db(&self) -> usize {
        self.selected_db.load(Ordering::Relaxed)
    }

    /// Switches the logical database. Range checks belong to the executor.
    pub fn select_db(&self, index: usize) {
        self.selected_db.store(index, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("in_flight", &self.in_flight())
            .field("selected_db", &self.selected_db())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "use of closed connection")
}
