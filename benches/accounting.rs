//! Accounting throughput of the peer registry
//!
//! Measures the hot notification paths (reflects and interactions) on one
//! thread and under contention from several delivery threads.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rti_perf::rti::ObjectHandle;
use rti_perf::{EventAccumulator, PeerRegistry};
use std::sync::Arc;
use std::thread;

const PEERS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];
const OBJECTS_PER_PEER: u64 = 100;

fn populated_registry() -> Arc<PeerRegistry> {
    let registry = Arc::new(PeerRegistry::new(Arc::new(EventAccumulator::new(false))));
    for (i, name) in PEERS.iter().enumerate() {
        registry.add_peer(name, false, Some(ObjectHandle(1_000_000 + i as u64)));
        for j in 0..OBJECTS_PER_PEER {
            let object = ObjectHandle(i as u64 * OBJECTS_PER_PEER + j);
            registry.note_object(object, "bench");
            registry.record_discover(object, name);
        }
    }
    registry
}

fn bench_single_thread(c: &mut Criterion) {
    let registry = populated_registry();
    let mut group = c.benchmark_group("accounting_single_thread");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_reflect", |b| {
        let mut next = 0u64;
        b.iter(|| {
            next = (next + 1) % (PEERS.len() as u64 * OBJECTS_PER_PEER);
            black_box(registry.record_reflect(ObjectHandle(next)))
        })
    });

    group.bench_function("record_interaction", |b| {
        let mut next = 0usize;
        b.iter(|| {
            next = (next + 1) % PEERS.len();
            black_box(registry.record_interaction(PEERS[next]))
        })
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    const EVENTS_PER_THREAD: u64 = 10_000;
    let mut group = c.benchmark_group("accounting_contended");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(threads as u64 * EVENTS_PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let registry = populated_registry();
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let registry = Arc::clone(&registry);
                        thread::spawn(move || {
                            for n in 0..EVENTS_PER_THREAD {
                                if n % 2 == 0 {
                                    let object = (n + t as u64) % (PEERS.len() as u64 * OBJECTS_PER_PEER);
                                    registry.record_reflect(ObjectHandle(object));
                                } else {
                                    registry.record_interaction(PEERS[(n as usize + t) % PEERS.len()]);
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_contended);
criterion_main!(benches);
