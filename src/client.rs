//! Client mode.
//!
//! Dials two fixed endpoints and forwards between them with the same
//! forwarding loop the relay uses. There is exactly one pair for the life of
//! the process, so no pairing queue is involved.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, Endpoint};
use crate::error::{Error, Result};
use crate::metrics::RelayMetrics;
use crate::pair::{spawn_pair, PairReport, TcpConnection};

/// Open a TCP connection to an endpoint.
pub async fn dial(endpoint: &Endpoint) -> Result<TcpConnection> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|source| Error::Connect {
            addr: endpoint.to_string(),
            source,
        })?;
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    Ok(TcpConnection::from_tcp(stream, peer))
}

/// Outbound forwarding client.
pub struct Client {
    config: ClientConfig,
    metrics: Arc<RelayMetrics>,
}

impl Client {
    /// Create a client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Dial both endpoints and start forwarding.
    pub async fn start(&self) -> Result<Tunnel> {
        self.config.validate()?;

        let first = dial(&self.config.first).await?;
        tracing::info!("Connected to {} ({})", self.config.first, first.peer);

        let second = dial(&self.config.second).await?;
        tracing::info!("Connected to {} ({})", self.config.second, second.peer);

        let (tx, reports) = mpsc::unbounded_channel();
        let handle = spawn_pair(
            first,
            second,
            &self.config.forward,
            Arc::clone(&self.metrics),
            Some(tx),
        );

        Ok(Tunnel { handle, reports })
    }

    /// Forward until both directions have stopped.
    pub async fn run(self) -> Result<PairReport> {
        self.start().await?.wait().await
    }

    /// Forward until both directions have stopped or `shutdown` resolves.
    ///
    /// Returns `None` when interrupted by shutdown.
    pub async fn run_until<F>(self, shutdown: F) -> Result<Option<PairReport>>
    where
        F: Future<Output = ()>,
    {
        let tunnel = self.start().await?;

        tokio::select! {
            report = tunnel.wait() => report.map(Some),
            _ = shutdown => {
                tracing::info!("Shutdown requested, leaving forwarding tasks");
                Ok(None)
            }
        }
    }
}

/// A running client pair.
pub struct Tunnel {
    handle: JoinHandle<()>,
    reports: mpsc::UnboundedReceiver<PairReport>,
}

impl Tunnel {
    /// Block until both directions have stopped.
    pub async fn wait(mut self) -> Result<PairReport> {
        self.handle
            .await
            .map_err(|e| Error::Network(io::Error::new(io::ErrorKind::Other, e)))?;
        self.reports.recv().await.ok_or_else(|| {
            Error::Network(io::Error::new(
                io::ErrorKind::Other,
                "pair finished without a report",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let (listener, endpoint) = listener().await;
        drop(listener);

        let err = dial(&endpoint).await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert!(err.is_setup_fatal());
    }

    #[tokio::test]
    async fn test_forwards_between_endpoints() {
        let (relay, relay_endpoint) = listener().await;
        let (target, target_endpoint) = listener().await;

        let client = Client::new(ClientConfig {
            first: relay_endpoint,
            second: target_endpoint,
            forward: Default::default(),
        });
        let metrics = client.metrics();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(client.run_until(async {
            let _ = stop_rx.await;
        }));

        let (mut relay_side, _) = relay.accept().await.unwrap();
        let (mut target_side, _) = target.accept().await.unwrap();

        relay_side.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        target_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        target_side.write_all(b"PONG").await.unwrap();
        relay_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG");

        assert_eq!(metrics.bytes_forwarded(), 8);

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_second_endpoint_unreachable() {
        let (_relay, relay_endpoint) = listener().await;
        let (target, target_endpoint) = listener().await;
        drop(target);

        let client = Client::new(ClientConfig {
            first: relay_endpoint,
            second: target_endpoint.clone(),
            forward: Default::default(),
        });

        let err = client.run().await.unwrap_err();
        match err {
            Error::Connect { addr, .. } => assert_eq!(addr, target_endpoint.to_string()),
            other => panic!("unexpected error: {}", other),
        }
    }
}
