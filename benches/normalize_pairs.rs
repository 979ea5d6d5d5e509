use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use ens_graph::validation::normalize_pair;

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn synthetic_pairs(count: usize) -> Vec<(String, String)> {
    let mut state = 0x5eed_u64;
    (0..count)
        .map(|_| {
            let left = lcg_next(&mut state) % 10_000;
            let right = (left + 1 + lcg_next(&mut state) % 9_999) % 10_000;
            (
                format!("  friend-{left}.eth "),
                format!("friend-{right}.eth\t"),
            )
        })
        .collect()
}

fn bench_normalize_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_pair");
    for count in [100usize, 10_000] {
        let pairs = synthetic_pairs(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &pairs, |b, pairs| {
            b.iter(|| {
                for (left, right) in pairs {
                    let normalized = normalize_pair(left, right).expect("distinct names");
                    black_box(normalized);
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize_pairs);
criterion_main!(benches);
