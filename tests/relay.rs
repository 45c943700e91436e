//! End-to-end tests against a relay bound to ephemeral local ports.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use rendezvous::config::RelayConfig;
use rendezvous::metrics::RelayMetrics;
use rendezvous::pair::{PairReport, TcpConnection};
use rendezvous::rendezvous::{Rendezvous, Side};
use rendezvous::server::RelayServer;

struct Harness {
    service: SocketAddr,
    public: SocketAddr,
    metrics: Arc<RelayMetrics>,
    rendezvous: Arc<Rendezvous<TcpConnection>>,
    reports: mpsc::UnboundedReceiver<PairReport>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<rendezvous::Result<()>>>,
}

impl Harness {
    async fn start() -> Self {
        let (tx, reports) = mpsc::unbounded_channel();
        let server = RelayServer::bind(RelayConfig::new("127.0.0.1", 0, 0))
            .await
            .unwrap()
            .with_report_sink(tx);

        let service = server.local_addr(Side::Service);
        let public = server.local_addr(Side::Public);
        let metrics = server.metrics();
        let rendezvous = server.rendezvous();

        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        Self {
            service,
            public,
            metrics,
            rendezvous,
            reports,
            stop: Some(stop),
            task: Some(task),
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.unwrap().unwrap();
        }
    }
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn expect_read(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(buf, expected);
}

#[tokio::test]
async fn ping_pong_through_relay() {
    let harness = Harness::start().await;

    let mut service_client = TcpStream::connect(harness.service).await.unwrap();
    let mut public_client = TcpStream::connect(harness.public).await.unwrap();

    service_client.write_all(b"PING").await.unwrap();
    expect_read(&mut public_client, b"PING").await;

    public_client.write_all(b"PONG").await.unwrap();
    expect_read(&mut service_client, b"PONG").await;

    assert_eq!(harness.metrics.pairs_formed(), 1);
    harness.shutdown().await;
}

#[tokio::test]
async fn large_payload_crosses_chunk_boundaries() {
    let harness = Harness::start().await;

    let mut public_client = TcpStream::connect(harness.public).await.unwrap();
    let mut service_client = TcpStream::connect(harness.service).await.unwrap();

    let payload: Vec<u8> = (0..1024 * 64 + 3).map(|i| (i % 253) as u8).collect();
    let writer = {
        let payload = payload.clone();
        tokio::spawn(async move {
            public_client.write_all(&payload).await.unwrap();
            public_client
        })
    };

    expect_read(&mut service_client, &payload).await;
    let _public_client = writer.await.unwrap();

    harness.shutdown().await;
}

#[tokio::test]
async fn pairs_in_arrival_order() {
    let harness = Harness::start().await;

    let mut waiting = Vec::new();
    for n in 1..=3 {
        waiting.push(TcpStream::connect(harness.service).await.unwrap());
        let rdv = Arc::clone(&harness.rendezvous);
        wait_for(move || rdv.waiting(Side::Service) == n).await;
    }

    for (n, service_client) in waiting.iter_mut().enumerate() {
        let mut public_client = TcpStream::connect(harness.public).await.unwrap();
        let tag = format!("client-{}", n);
        public_client.write_all(tag.as_bytes()).await.unwrap();
        expect_read(service_client, tag.as_bytes()).await;
    }

    assert_eq!(harness.metrics.pairs_formed(), 3);
    assert_eq!(harness.rendezvous.waiting(Side::Service), 0);
    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_burst_forms_min_pairs() {
    let harness = Harness::start().await;
    let (service_count, public_count) = (30usize, 20usize);

    let mut tasks = Vec::new();
    for i in 0..service_count + public_count {
        let addr = if i % 5 < 3 { harness.service } else { harness.public };
        tasks.push(tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() }));
    }
    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    let metrics = Arc::clone(&harness.metrics);
    wait_for(move || {
        metrics.accepted(Side::Service) + metrics.accepted(Side::Public) == 50
            && metrics.pairs_formed() == 20
    })
    .await;

    assert_eq!(harness.metrics.accepted(Side::Service), service_count as u64);
    assert_eq!(harness.metrics.accepted(Side::Public), public_count as u64);
    assert_eq!(harness.metrics.pairs_formed(), public_count as u64);
    assert_eq!(harness.rendezvous.pairs_formed(), public_count as u64);
    assert_eq!(
        harness.rendezvous.waiting(Side::Service),
        service_count - public_count
    );
    assert_eq!(harness.rendezvous.waiting(Side::Public), 0);

    drop(clients);
    harness.shutdown().await;
}

#[tokio::test]
async fn half_closed_peer_keeps_pair_alive() {
    let harness = Harness::start().await;

    let mut service_client = TcpStream::connect(harness.service).await.unwrap();
    let mut public_client = TcpStream::connect(harness.public).await.unwrap();

    service_client.write_all(b"hello").await.unwrap();
    expect_read(&mut public_client, b"hello").await;

    // End-of-stream from the service side is an idle read, not a teardown.
    service_client.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    public_client.write_all(b"still open").await.unwrap();
    expect_read(&mut service_client, b"still open").await;

    assert_eq!(harness.metrics.closed_directions(), 0);
    assert_eq!(harness.metrics.active_directions(), 2);
    harness.shutdown().await;
}

#[tokio::test]
async fn peer_reset_does_not_reach_listener() {
    let mut harness = Harness::start().await;

    let service_client = TcpStream::connect(harness.service).await.unwrap();
    let _public_client = TcpStream::connect(harness.public).await.unwrap();
    let metrics = Arc::clone(&harness.metrics);
    wait_for(move || metrics.pairs_formed() == 1).await;

    // Abortive close: the relay sees a reset on this socket.
    #[allow(deprecated)]
    service_client.set_linger(Some(Duration::ZERO)).unwrap();
    drop(service_client);

    let metrics = Arc::clone(&harness.metrics);
    wait_for(move || metrics.closed_directions() >= 1).await;

    // The listener keeps pairing new arrivals.
    let mut service_client = TcpStream::connect(harness.service).await.unwrap();
    let mut public_client = TcpStream::connect(harness.public).await.unwrap();
    public_client.write_all(b"again").await.unwrap();
    expect_read(&mut service_client, b"again").await;
    assert_eq!(harness.metrics.pairs_formed(), 2);
    assert!(harness.reports.try_recv().is_err());

    harness.shutdown().await;
}

#[tokio::test]
async fn client_mode_bridges_relay_to_backend() {
    use rendezvous::client::Client;
    use rendezvous::config::{ClientConfig, Endpoint};
    use tokio::net::TcpListener;

    let harness = Harness::start().await;
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_port = backend.local_addr().unwrap().port();

    // The client dials the relay's public port and the backend, like the
    // reference deployment where the backend sits on an internal network.
    let client = Client::new(ClientConfig {
        first: Endpoint::new("127.0.0.1", harness.public.port()),
        second: Endpoint::new("127.0.0.1", backend_port),
        forward: Default::default(),
    });
    let tunnel = client.start().await.unwrap();
    let (mut backend_side, _) = backend.accept().await.unwrap();

    let mut user = TcpStream::connect(harness.service).await.unwrap();
    user.write_all(b"SELECT 1").await.unwrap();
    expect_read(&mut backend_side, b"SELECT 1").await;

    backend_side.write_all(b"1 row").await.unwrap();
    expect_read(&mut user, b"1 row").await;

    drop(tunnel);
    harness.shutdown().await;
}
