//! One-direction byte forwarder.
//!
//! Reads chunks from a source stream and writes every byte read to a
//! destination stream. Termination policy:
//!
//! - an empty read is an idle, still-open stream: nothing is forwarded and the
//!   read is retried after a cooperative pause;
//! - a peer reset or broken pipe stops this direction only;
//! - every other I/O error is logged and retried.
//!
//! A peer that has shut down its write side keeps returning empty reads, so
//! with the default zero idle backoff an idle direction polls continuously
//! and keeps a worker thread busy until the peer resets. Set
//! `idle_backoff_ms` to bound the poll rate.
//!
//! Stopping one direction never closes either connection. The stream halves
//! are handed back in [`Termination`] so the caller decides when to release
//! them.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::metrics::RelayMetrics;

/// Bytes requested from the source per read.
pub const CHUNK_SIZE: usize = 1024;

/// Tuning for the forwarding loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardOptions {
    /// Maximum bytes per read
    pub chunk_size: usize,
    /// Pause after an empty read, in milliseconds (0 = yield only).
    ///
    /// With 0 a half-closed peer costs a busy core for as long as the pair
    /// lives; a few milliseconds caps it at one read per interval.
    pub idle_backoff_ms: u64,
    /// Pause after a retried error, in milliseconds (0 = yield only)
    pub error_backoff_ms: u64,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            idle_backoff_ms: 0,
            error_backoff_ms: 0,
        }
    }
}

impl ForwardOptions {
    fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// How the forwarding loop reacts to an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The peer is gone; this direction stops
    Closed,
    /// Logged and retried
    Transient,
}

/// Classify a read or write error.
pub fn classify(err: &io::Error) -> ErrorClass {
    match err.kind() {
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => ErrorClass::Closed,
        _ => ErrorClass::Transient,
    }
}

/// Endpoints of one direction, used in log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Address data is read from
    pub source: String,
    /// Address data is written to
    pub destination: String,
}

impl Route {
    /// Build a route from two labels.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Build a route from two peer addresses.
    pub fn between(source: SocketAddr, destination: SocketAddr) -> Self {
        Self::new(source.to_string(), destination.to_string())
    }

    /// The same endpoints, opposite direction.
    pub fn reversed(&self) -> Self {
        Self::new(self.destination.clone(), self.source.clone())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Outcome of a stopped direction.
///
/// Carries the stream halves back to the caller untouched.
pub struct Termination<R, W> {
    /// Read side of the source connection
    pub source: R,
    /// Write side of the destination connection
    pub destination: W,
    /// The error that stopped the direction
    pub cause: io::Error,
    /// Bytes forwarded before stopping
    pub forwarded: u64,
}

/// Forwards one direction of a pair.
#[derive(Clone)]
pub struct Forwarder {
    route: Route,
    options: ForwardOptions,
    metrics: Arc<RelayMetrics>,
}

impl Forwarder {
    /// Create a forwarder for a route.
    pub fn new(route: Route, options: ForwardOptions, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            route,
            options,
            metrics,
        }
    }

    /// The route this forwarder serves.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Copy from `source` to `destination` until the peer resets or the pipe
    /// breaks.
    ///
    /// Never returns while the direction is alive; run it on its own task.
    pub async fn run<R, W>(self, mut source: R, mut destination: W) -> Termination<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let route = &self.route;
        let mut buf = vec![0u8; self.options.chunk_size.max(1)];
        let mut forwarded = 0u64;

        self.metrics.direction_started();

        let cause = loop {
            let result = match source.read(&mut buf).await {
                Ok(0) => {
                    self.metrics.increment_idle_reads();
                    pause(self.options.idle_backoff()).await;
                    continue;
                }
                Ok(n) => destination.write_all(&buf[..n]).await.map(|()| n),
                Err(e) => Err(e),
            };

            match result {
                Ok(n) => {
                    forwarded += n as u64;
                    self.metrics.add_bytes_forwarded(n as u64);
                    tracing::debug!(
                        "Forwarded {} bytes from {} to {}",
                        n,
                        route.source,
                        route.destination
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Error forwarding data from {} to {}: {}",
                        route.source,
                        route.destination,
                        e
                    );
                    match classify(&e) {
                        ErrorClass::Closed => {
                            tracing::info!(
                                "Connection closed between {} and {}",
                                route.source,
                                route.destination
                            );
                            break e;
                        }
                        ErrorClass::Transient => {
                            self.metrics.increment_transient_errors();
                            pause(self.options.error_backoff()).await;
                        }
                    }
                }
            }
        };

        self.metrics.direction_stopped(true);
        tracing::info!(
            "Stopped forwarding between {} and {}, but connections remain open",
            route.source,
            route.destination
        );

        Termination {
            source,
            destination,
            cause,
            forwarded,
        }
    }
}

async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}
