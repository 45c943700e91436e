//! Forwarding and pairing benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use rendezvous::forward::{ForwardOptions, Forwarder, Route};
use rendezvous::metrics::RelayMetrics;
use rendezvous::rendezvous::{Rendezvous, Side};

fn bench_forward(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("forward");

    for size in [1024usize, 16 * 1024, 256 * 1024] {
        let payload = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("{}_bytes", size), |b| {
            b.to_async(&runtime).iter(|| {
                let payload = payload.clone();
                async move {
                    let (mut writer, source) = tokio::io::duplex(64 * 1024);
                    let (destination, mut reader) = tokio::io::duplex(64 * 1024);

                    let forwarder = Forwarder::new(
                        Route::new("bench-in", "bench-out"),
                        ForwardOptions::default(),
                        Arc::new(RelayMetrics::new()),
                    );
                    let task = tokio::spawn(forwarder.run(source, destination));

                    let write = tokio::spawn(async move {
                        writer.write_all(&payload).await.unwrap();
                        writer
                    });

                    let mut received = vec![0u8; size];
                    reader.read_exact(&mut received).await.unwrap();
                    let _writer = write.await.unwrap();
                    task.abort();
                    black_box(received)
                }
            })
        });
    }

    group.finish();
}

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendezvous");

    group.bench_function("1000_pairs", |b| {
        b.iter(|| {
            let rdv = Rendezvous::new();
            let mut pairs = 0;
            for i in 0..1000u32 {
                if rdv.enqueue(Side::Service, i).is_some() {
                    pairs += 1;
                }
                if rdv.enqueue(Side::Public, i).is_some() {
                    pairs += 1;
                }
            }
            black_box(pairs)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_forward, bench_enqueue);
criterion_main!(benches);
