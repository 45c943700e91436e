//! Rendezvous relay server.
//!
//! Binds the two listening ports and multiplexes accepts over both. Every
//! accepted connection goes to the [`Rendezvous`] coordinator; formed pairs
//! are handed to detached forwarding tasks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Relay Server                            │
//! │  ┌──────────────────┐              ┌──────────────────┐      │
//! │  │ Service Listener │              │  Public Listener │      │
//! │  │   (Port 5432)    │              │   (Port 443)     │      │
//! │  └────────┬─────────┘              └────────┬─────────┘      │
//! │           └──────────────┬──────────────────┘                │
//! │                          ▼  select!                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                Rendezvous Coordinator                 │   │
//! │  │  • one FIFO queue per side, single lock               │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                          │  pair                             │
//! │                          ▼                                   │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │  Forwarder A→B   Forwarder B→A   (detached tasks)     │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod listener;

pub use listener::{bind_listener, is_transient_accept_error, BACKLOG};

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::metrics::RelayMetrics;
use crate::pair::{spawn_pair, ReportSink, TcpConnection};
use crate::rendezvous::{Rendezvous, Side};

/// Relay server with both listeners bound.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    service: TcpListener,
    public: TcpListener,
    service_addr: SocketAddr,
    public_addr: SocketAddr,
    rendezvous: Arc<Rendezvous<TcpConnection>>,
    metrics: Arc<RelayMetrics>,
    reports: Option<ReportSink>,
}

impl RelayServer {
    /// Bind the service port, then the public port.
    ///
    /// A bind failure aborts startup; it is logged here and never retried.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let service = Self::bind_logged(&config.host, config.service_port).await?;
        let public = Self::bind_logged(&config.host, config.public_port).await?;
        let service_addr = service.local_addr()?;
        let public_addr = public.local_addr()?;

        Ok(Self {
            config: Arc::new(config),
            service,
            public,
            service_addr,
            public_addr,
            rendezvous: Arc::new(Rendezvous::new()),
            metrics: Arc::new(RelayMetrics::new()),
            reports: None,
        })
    }

    async fn bind_logged(host: &str, port: u16) -> Result<TcpListener> {
        match bind_listener(host, port).await {
            Ok(listener) => {
                tracing::info!("Server listening on port {}...", port);
                Ok(listener)
            }
            Err(e) => {
                if e.is_privileged_bind() {
                    tracing::error!("{}. This port may require elevated privileges.", e);
                } else {
                    tracing::error!("{}", e);
                }
                Err(e)
            }
        }
    }

    /// Send a [`PairReport`](crate::pair::PairReport) for every finished pair.
    pub fn with_report_sink(mut self, sink: ReportSink) -> Self {
        self.reports = Some(sink);
        self
    }

    /// Bound address of the listener for a side.
    pub fn local_addr(&self, side: Side) -> SocketAddr {
        match side {
            Side::Service => self.service_addr,
            Side::Public => self.public_addr,
        }
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Shared coordinator handle.
    pub fn rendezvous(&self) -> Arc<Rendezvous<TcpConnection>> {
        Arc::clone(&self.rendezvous)
    }

    /// Accept on both ports until an unrecoverable accept error.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept on both ports until `shutdown` resolves or an unrecoverable
    /// accept error occurs.
    ///
    /// Both listeners are closed on return. Connections still waiting for a
    /// peer are released; running pairs keep forwarding.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            let (side, accepted) = tokio::select! {
                res = self.service.accept() => (Side::Service, res),
                res = self.public.accept() => (Side::Public, res),
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, closing listeners");
                    break Ok(());
                }
            };

            if let ControlFlow::Break(e) = self.on_accept(side, accepted) {
                break Err(e);
            }
        };

        self.release_waiting();
        tracing::info!("\n{}", self.metrics.format_report());

        result
    }

    /// Apply the accept policy to one accept result.
    ///
    /// Aborted, reset or interrupted accepts are logged and skipped; any other
    /// error ends the listener loop.
    fn on_accept(
        &self,
        side: Side,
        accepted: io::Result<(TcpStream, SocketAddr)>,
    ) -> ControlFlow<Error> {
        match accepted {
            Ok((stream, peer)) => {
                self.admit(side, stream, peer);
                ControlFlow::Continue(())
            }
            Err(e) if is_transient_accept_error(&e) => {
                tracing::warn!("Accept error on {} port: {}", side, e);
                ControlFlow::Continue(())
            }
            Err(e) => {
                tracing::error!("Server error: {}", e);
                ControlFlow::Break(Error::Accept {
                    addr: self.local_addr(side),
                    source: e,
                })
            }
        }
    }

    /// Close every connection still waiting for a peer.
    fn release_waiting(&self) -> usize {
        let released = self.rendezvous.drain().len();
        if released > 0 {
            tracing::info!("Released {} unmatched connection(s)", released);
        }
        released
    }

    fn admit(&self, side: Side, stream: TcpStream, peer: SocketAddr) {
        self.metrics.increment_accepted(side);
        tracing::info!(
            "Accepted connection from {} on port {}",
            peer,
            self.local_addr(side).port()
        );

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let conn = TcpConnection::from_tcp(stream, peer);
        let id = conn.id;

        match self.rendezvous.enqueue(side, conn) {
            Some(pair) => {
                self.metrics.increment_pairs();
                spawn_pair(
                    pair.service,
                    pair.public,
                    &self.config.forward,
                    Arc::clone(&self.metrics),
                    self.reports.clone(),
                );
            }
            None => {
                tracing::debug!(
                    "Connection #{} waiting on {} side ({} queued)",
                    id,
                    side,
                    self.rendezvous.waiting(side)
                );
            }
        }
    }
}
