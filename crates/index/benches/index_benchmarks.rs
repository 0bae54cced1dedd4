use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use lapse_index::SortedCircularIndex;

fn filled(n: u64) -> SortedCircularIndex {
    let mut index = SortedCircularIndex::new();
    for p in 1..=n {
        index.insert(p);
    }
    index
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_insert");

    for size in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(1));

        // Deposits arrive in pointer order, so appends at the tail dominate.
        group.bench_with_input(BenchmarkId::new("append_tail", size), size, |b, &size| {
            b.iter_batched(
                || filled(size),
                |mut index| {
                    index.insert(black_box(size + 1));
                    index
                },
                BatchSize::LargeInput,
            );
        });

        // Transfer credits land anywhere; the middle is the worst case.
        group.bench_with_input(BenchmarkId::new("middle", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let mut index = SortedCircularIndex::new();
                    for p in 1..=size {
                        index.insert(p * 2);
                    }
                    index
                },
                |mut index| {
                    index.insert(black_box(size + 1));
                    index
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_eviction");
    let size = 10_000u64;

    // Share of the index that has expired when the eviction runs.
    for expired_pct in [10u64, 50, 90].iter() {
        let new_head = size * expired_pct / 100 + 1;

        group.bench_with_input(BenchmarkId::new("shrink", expired_pct), &new_head, |b, &head| {
            b.iter_batched(
                || filled(size),
                |mut index| {
                    black_box(index.shrink(head));
                    index
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(
            BenchmarkId::new("lazy_shrink", expired_pct),
            &new_head,
            |b, &head| {
                b.iter_batched(
                    || filled(size),
                    |mut index| {
                        black_box(index.lazy_shrink(head));
                        index
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_eviction);
criterion_main!(benches);
