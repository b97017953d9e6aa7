//! reload batch benches
#[macro_use]
extern crate criterion;

use criterion::Criterion;
use rayon::prelude::*;
use warlock_core::Transpiler;

fn transpile_batch_benchmark(c: &mut Criterion) {
    let sources = load_fixture_sources();

    let mut group = c.benchmark_group("transpile batch");
    group.sample_size(10);
    group.bench_function("sequential", |b| {
        b.iter(|| {
            let transpiler = Transpiler::new();
            for source in &sources {
                let _ = transpiler.transpile(source, std::path::Path::new("bench.ts"), "bench.js").unwrap();
            }
        });
    });

    group.bench_function("parallel", |b| {
        b.iter(|| {
            sources.par_iter().for_each(|source| {
                let transpiler = Transpiler::new();
                let _ = transpiler.transpile(source, std::path::Path::new("bench.ts"), "bench.js").unwrap();
            });
        });
    });
}

fn load_fixture_sources() -> Vec<String> {
    (0..200)
        .map(|i| format!("export const value{i}: number = {i};\nexport function add{i}(x: number): number {{ return x + {i}; }}\n"))
        .collect()
}

criterion_group!(benches, transpile_batch_benchmark);
criterion_main!(benches);
