//! Benchmark for structure generation.
//!
//! TARGET: a demo settlement in under 5 ms on one core
//!
//! Run with: cargo bench --package structura_procedural --bench generation_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use structura_core::BlockPos;
use structura_procedural::demo::{settlement_grammar, DemoTerrain, SETTLEMENT_RULE};
use structura_procedural::{
    GenerationPool, GeneratorConfig, PlacementJob, PoolConfig, StructuraConfig, StructureGenerator,
};

fn site(terrain: &DemoTerrain, i: i32) -> BlockPos {
    let x = (i % 64) * 96;
    let z = (i / 64) * 96;
    BlockPos::new(x, terrain.height_at(x, z).round() as i32, z)
}

fn benchmark_single_settlement(c: &mut Criterion) {
    let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
    let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
    let terrain = DemoTerrain::default();
    let mut gen = StructureGenerator::new(grammar, Arc::new(terrain), GeneratorConfig::default());

    c.bench_function("settlement_generation", |b| {
        let mut i = 0i32;
        b.iter(|| {
            i = i.wrapping_add(1) & 0xfff;
            black_box(gen.generate(rule, site(&terrain, i), 42).ok())
        });
    });
}

fn benchmark_search_only(c: &mut Criterion) {
    let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
    let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
    let terrain = DemoTerrain::default();
    let mut gen = StructureGenerator::new(grammar, Arc::new(terrain), GeneratorConfig::default());
    let origin = site(&terrain, 0);

    c.bench_function("settlement_search_same_site", |b| {
        let mut seed = 0u32;
        b.iter(|| {
            seed = seed.wrapping_add(1);
            gen.setup(rule, origin, seed);
            black_box(gen.process().is_ok())
        });
    });
}

fn benchmark_pool_batch(c: &mut Criterion) {
    let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
    let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
    let terrain = DemoTerrain::default();
    let config = StructuraConfig {
        pool: PoolConfig {
            threads: Some(4),
            ..PoolConfig::default()
        },
        ..StructuraConfig::default()
    };
    let pool = GenerationPool::new(grammar, Arc::new(terrain), config);

    let mut group = c.benchmark_group("pool");
    group.sample_size(10);
    group.throughput(Throughput::Elements(256));
    group.bench_function("256_settlements_4_threads", |b| {
        b.iter(|| {
            for i in 0..256 {
                pool.submit(PlacementJob {
                    id: i as u64,
                    rule,
                    origin: site(&terrain, i),
                    seed: 7,
                });
            }
            pool.wait_idle();
            black_box(pool.results().try_iter().count())
        });
    });
    group.finish();
}

fn benchmark_output_compression(c: &mut Criterion) {
    let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
    let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
    let terrain = DemoTerrain::default();
    let mut gen = StructureGenerator::new(grammar, Arc::new(terrain), GeneratorConfig::default());
    let output = gen.generate(rule, site(&terrain, 0), 42).expect("settlement");

    c.bench_function("output_compression", |b| {
        b.iter(|| black_box(output.compress()));
    });
}

criterion_group!(
    benches,
    benchmark_single_settlement,
    benchmark_search_only,
    benchmark_pool_batch,
    benchmark_output_compression,
);
criterion_main!(benches);
