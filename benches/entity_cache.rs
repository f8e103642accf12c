use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;

use dynacache::domain::models::{CallContext, EntityKind, EntitySnapshot};
use dynacache::services::{fingerprint, resolve_batch, EntityCache};

fn snapshots(count: usize) -> Vec<EntitySnapshot> {
    let now = Utc::now();
    (0..count)
        .map(|i| EntitySnapshot::new(format!("agent_{i}"), Some(now)))
        .collect()
}

async fn filled_cache(refs: &[EntitySnapshot], ctx: &CallContext) -> EntityCache<String> {
    let cache = EntityCache::new(EntityKind::Agent, Duration::from_secs(3600));
    for snapshot in refs {
        cache.put(snapshot.id.clone(), &snapshot.id, ctx, snapshot).await;
    }
    cache
}

fn bench_fingerprint(c: &mut Criterion) {
    let snapshot = EntitySnapshot::new("finance_agent", Some(Utc::now()));
    c.bench_function("fingerprint/snapshot", |b| {
        b.iter(|| black_box(fingerprint(black_box(&snapshot))));
    });
}

fn bench_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let ctx = CallContext::new();
    let mut group = c.benchmark_group("entity_cache");

    for size in [100usize, 1_000, 10_000] {
        let refs = snapshots(size);
        let cache = rt.block_on(filled_cache(&refs, &ctx));
        let target = refs[size / 2].clone();

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(cache.get(&target.id, &ctx, &target).await) });
        });

        let batch: Vec<EntitySnapshot> = refs.iter().take(50).cloned().collect();
        group.bench_with_input(BenchmarkId::new("resolve_batch_50", size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(resolve_batch(&cache, &batch, &ctx).await.len()) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_lookup);
criterion_main!(benches);
