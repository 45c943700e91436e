//! Pair supervision.
//!
//! A matched pair runs as two detached forwarding tasks (one per direction)
//! and a supervisor that waits for both. Nothing a direction does reaches the
//! listener loop: outcomes are logged and sent to an optional report sink.
//! The stream halves are held until both directions have stopped, so a
//! connection stays open while its reverse direction is still forwarding.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::forward::{ForwardOptions, Forwarder, Route, Termination};
use crate::metrics::RelayMetrics;

/// Identifier assigned to every accepted or dialed connection.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next connection identifier.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// An established connection, split into its read and write sides.
pub struct Connection<R, W> {
    /// Stable identifier for log lines
    pub id: ConnectionId,
    /// Peer address label
    pub peer: String,
    /// Read side
    pub reader: R,
    /// Write side
    pub writer: W,
}

/// Connection backed by a TCP socket.
pub type TcpConnection = Connection<OwnedReadHalf, OwnedWriteHalf>;

impl<R, W> Connection<R, W> {
    /// Wrap already split stream halves.
    pub fn new(peer: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            id: next_connection_id(),
            peer: peer.into(),
            reader,
            writer,
        }
    }
}

impl TcpConnection {
    /// Split an accepted or connected TCP stream.
    pub fn from_tcp(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(peer.to_string(), reader, writer)
    }
}

impl<R, W> std::fmt::Debug for Connection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// How a single direction ended.
#[derive(Debug)]
pub enum DirectionOutcome {
    /// Stopped by a peer reset or broken pipe
    Closed {
        /// Bytes forwarded before stopping
        forwarded: u64,
        /// Kind of the terminating error
        cause: io::ErrorKind,
    },
    /// The forwarding task panicked or was cancelled
    Failed(String),
}

impl DirectionOutcome {
    /// Bytes forwarded before the direction ended, when known.
    pub fn forwarded(&self) -> Option<u64> {
        match self {
            DirectionOutcome::Closed { forwarded, .. } => Some(*forwarded),
            DirectionOutcome::Failed(_) => None,
        }
    }
}

/// Summary of a pair whose two directions have both stopped.
#[derive(Debug)]
pub struct PairReport {
    /// First connection of the pair
    pub first: ConnectionId,
    /// Second connection of the pair
    pub second: ConnectionId,
    /// Outcome of first → second
    pub forward: (Route, DirectionOutcome),
    /// Outcome of second → first
    pub backward: (Route, DirectionOutcome),
}

/// Receiving end for pair reports.
pub type ReportSink = mpsc::UnboundedSender<PairReport>;

/// Start forwarding between two connections.
///
/// Returns the supervisor handle. Callers that only fire and forget may drop
/// it; the client awaits it to block until both directions are done.
pub fn spawn_pair<R, W>(
    first: Connection<R, W>,
    second: Connection<R, W>,
    options: &ForwardOptions,
    metrics: Arc<RelayMetrics>,
    sink: Option<ReportSink>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let route = Route::new(first.peer.clone(), second.peer.clone());
    let back_route = route.reversed();
    let (first_id, second_id) = (first.id, second.id);

    tracing::info!(
        "Paired connection #{} ({}) with #{} ({})",
        first_id,
        first.peer,
        second_id,
        second.peer
    );

    let forward = Forwarder::new(route.clone(), options.clone(), Arc::clone(&metrics));
    let backward = Forwarder::new(back_route.clone(), options.clone(), Arc::clone(&metrics));

    let forward_task = tokio::spawn(forward.run(first.reader, second.writer));
    let backward_task = tokio::spawn(backward.run(second.reader, first.writer));

    tokio::spawn(async move {
        let (forward_result, backward_result) = tokio::join!(forward_task, backward_task);

        let (forward_outcome, forward_halves) = settle(&route, forward_result, &metrics);
        let (backward_outcome, backward_halves) = settle(&back_route, backward_result, &metrics);

        tracing::info!(
            "Pair #{} / #{} finished: {} forwarded {:?} bytes, {} forwarded {:?} bytes",
            first_id,
            second_id,
            route,
            forward_outcome.forwarded(),
            back_route,
            backward_outcome.forwarded()
        );

        if let Some(sink) = sink {
            let _ = sink.send(PairReport {
                first: first_id,
                second: second_id,
                forward: (route, forward_outcome),
                backward: (back_route, backward_outcome),
            });
        }

        // Both directions are done; the sockets are released here.
        drop(forward_halves);
        drop(backward_halves);
    })
}

fn settle<R, W>(
    route: &Route,
    result: Result<Termination<R, W>, JoinError>,
    metrics: &RelayMetrics,
) -> (DirectionOutcome, Option<(R, W)>) {
    match result {
        Ok(done) => (
            DirectionOutcome::Closed {
                forwarded: done.forwarded,
                cause: done.cause.kind(),
            },
            Some((done.source, done.destination)),
        ),
        Err(e) => {
            metrics.direction_stopped(false);
            let reason = if e.is_panic() {
                "forwarding task panicked".to_string()
            } else {
                "forwarding task cancelled".to_string()
            };
            tracing::error!("{} on {}: {}", reason, route, e);
            (DirectionOutcome::Failed(reason), None)
        }
    }
}
