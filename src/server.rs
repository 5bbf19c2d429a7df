//! TCP Server
//!
//! Binds the listener, spawns one task per accepted client and runs the
//! shutdown sequence:
//!
//! 1. stop accepting (the listener is dropped)
//! 2. [`Handler::close`] closes every active connection
//! 3. wait for the connection tasks, optionally bounded by `shutdown-timeout`

use crate::commands::Executor;
use crate::config::Config;
use crate::connection::Handler;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// A bound RESP server.
pub struct Server {
    listener: TcpListener,
    handler: Arc<Handler>,
    stop: Arc<Notify>,
    shutdown_timeout: Option<Duration>,
}

/// Asks a running [`Server`] to shut down.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<Notify>,
}

impl StopHandle {
    /// Requests shutdown. Calling this before `run` starts is not lost.
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

impl Server {
    /// Binds the listener described by `config`.
    pub async fn bind(config: &Config, executor: Arc<dyn Executor>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let handler = Handler::with_grace_period(executor, config.close_grace_period);

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            stop: Arc::new(Notify::new()),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Accepts clients until `shutdown` resolves or [`StopHandle::stop`] is
    /// called, then closes every connection and waits for their tasks.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            handler,
            stop,
            shutdown_timeout,
        } = self;

        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let handler = Arc::clone(&handler);
                        tasks.spawn(async move { handler.handle(stream, addr).await });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
                _ = stop.notified() => {
                    info!("Stop requested, stopping server...");
                    break;
                }
            }

            // Reap finished sessions so the set does not grow without bound
            while let Some(res) = tasks.try_join_next() {
                log_task_result(res);
            }
        }

        drop(listener);
        handler.close().await;

        let remaining = tasks.len();
        {
            let drain = async {
                while let Some(res) = tasks.join_next().await {
                    log_task_result(res);
                }
            };
            match shutdown_timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, drain).await.is_err() {
                        warn!(?limit, "Timed out waiting for connection tasks, aborting the rest");
                    }
                }
                None => drain.await,
            }
        }
        tasks.shutdown().await;

        info!(connections = remaining, "Server shutdown complete");
        Ok(())
    }
}

fn log_task_result(res: Result<(), JoinError>) {
    match res {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Connection task panicked"),
        Err(e) => debug!(error = %e, "Connection task cancelled"),
    }
}

/// Resolves on the first of SIGHUP, SIGQUIT, SIGTERM or SIGINT.
///
/// A signal whose handler cannot be installed is logged and never fires.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::SignalKind;

    tokio::select! {
        _ = wait_for(SignalKind::hangup(), "SIGHUP") => {}
        _ = wait_for(SignalKind::quit(), "SIGQUIT") => {}
        _ = wait_for(SignalKind::terminate(), "SIGTERM") => {}
        _ = wait_for(SignalKind::interrupt(), "SIGINT") => {}
    }
}

#[cfg(unix)]
async fn wait_for(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
            info!(signal = name, "Received signal");
        }
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
