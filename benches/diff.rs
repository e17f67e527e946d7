use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};
use sacred_browser::{
    diff::{TieBreak, coalesce, edit_script_by},
    reconcile::{KeysOnly, Reconciler},
};
use std::hint::black_box;

// ids sorted, then a tenth removed and a tenth of new ids added
fn key_lists(size: usize, seed: u64) -> (Vec<u64>, Vec<u64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let old: Vec<u64> = (0..size as u64).collect();
    let mut new: Vec<u64> = old
        .iter()
        .copied()
        .filter(|_| rng.random_range(0..10) != 0)
        .collect();
    for _ in 0..size / 10 {
        let position = rng.random_range(0..=new.len());
        new.insert(position, size as u64 + rng.random_range(0..size as u64));
    }
    new.sort_unstable();
    new.dedup();
    (old, new)
}

fn bench_edit_script(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_script");
    for size in [100usize, 500, 2_000] {
        let (old, new) = key_lists(size, 7);
        group.throughput(Throughput::Elements(size as u64));
        for tie_break in [TieBreak::SubstituteFirst, TieBreak::StructuralFirst] {
            group.bench_with_input(
                BenchmarkId::new(format!("{tie_break:?}"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        let script = edit_script_by(black_box(&old), black_box(&new), tie_break, |a, b| a == b);
                        black_box(coalesce(script))
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_reconciler_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciler_update");
    for size in [100usize, 500, 2_000] {
        let (old, new) = key_lists(size, 11);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || {
                    let mut holder: Reconciler<u64, ()> = Reconciler::new(KeysOnly);
                    holder.update(&old).ok();
                    holder
                },
                |mut holder| {
                    holder.update(black_box(&new)).ok();
                    black_box(holder)
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_edit_script, bench_reconciler_update);
criterion_main!(benches);
