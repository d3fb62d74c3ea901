//! Benchmarks for result checksums and replay.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::{Rng, SeedableRng};

use spindle::{ChecksumState, Connection, Jitter, RetryPolicy, Row, TransactionOptions, Value};
use spindle_client::backends::MemoryDatabase;

fn random_rows(count: usize) -> Vec<Row> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            Row::new(vec![
                Value::Int(i as i64),
                Value::from(format!("singer-{}", rng.gen::<u32>())),
                Value::Float(rng.gen()),
                Value::Bytes((0..32).map(|_| rng.gen()).collect()),
            ])
        })
        .collect()
}

/// Benchmark folding rows into a checksum.
fn bench_checksum_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum_rows");

    for size in [10, 100, 1000] {
        let rows = random_rows(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("rows_{size}"), |b| {
            b.iter(|| {
                let mut state = ChecksumState::new();
                for row in &rows {
                    state.update(Some(row)).unwrap();
                }
                state.update(None).unwrap();
                black_box(state.digest())
            });
        });
    }

    group.finish();
}

/// Benchmark a retry that replays a fully read query.
fn bench_replay_query(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("replay_query");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("rows_{size}"), |b| {
            b.iter_batched(
                || {
                    let db = MemoryDatabase::new();
                    db.put_query_rows("SELECT * FROM singers", random_rows(size));
                    db
                },
                |db| {
                    rt.block_on(async {
                        let conn = Connection::new(db.clone());
                        let policy = RetryPolicy::default()
                            .with_initial_delay(std::time::Duration::ZERO)
                            .with_jitter(Jitter::None);
                        let tx = conn
                            .begin_transaction_with(TransactionOptions::new().retry_policy(policy))
                            .await
                            .unwrap();
                        let mut cursor = tx.execute_query("SELECT * FROM singers").await.unwrap();
                        while cursor.advance().await.unwrap() {}
                        db.abort_next_commit();
                        tx.commit().await.unwrap();
                    });
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_checksum_rows, bench_replay_query);
criterion_main!(benches);
