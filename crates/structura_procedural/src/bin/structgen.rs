//! # Structure Generator Driver
//!
//! Places the demo settlement on a grid of sites over the demo terrain,
//! using the generation pool.
//!
//! ## Usage
//!
//! ```bash
//! structgen --seed 42 --radius 3 --threads 4 --output out/
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use structura_core::BlockPos;
use structura_procedural::demo::{settlement_grammar, DemoTerrain, SETTLEMENT_RULE};
use structura_procedural::{GenerationPool, PlacementJob, StructuraConfig};

/// Distance between neighbouring sites, in blocks.
const SITE_SPACING: i32 = 96;

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         STRUCTURA STRUCTURE GENERATOR                            ║");
    println!("║         SETTLEMENT DEMO                                          ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let mut seed = 42u32;
    let mut radius = 2i32;
    let mut count: Option<u64> = None;
    let mut threads: Option<usize> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" | "-s" => {
                if i + 1 < args.len() {
                    seed = args[i + 1].parse().unwrap_or(42);
                    i += 1;
                }
            }
            "--radius" | "-r" => {
                if i + 1 < args.len() {
                    radius = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--threads" | "-t" => {
                if i + 1 < args.len() {
                    threads = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    output_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: structgen [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --seed <SEED>          Placement seed (default: 42)");
                println!("  -r, --radius <SITES>       Grid radius in sites (default: 2)");
                println!("  -n, --count <NUM>          Stop after NUM sites (default: whole grid)");
                println!("  -t, --threads <NUM>        Worker threads (default: from config)");
                println!("  -c, --config <FILE>        TOML configuration file");
                println!("  -o, --output <DIR>         Write compressed outputs to DIR");
                println!("  -h, --help                 Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => match StructuraConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                println!("Error: Could not load config: {e}");
                return;
            }
        },
        None => StructuraConfig::default(),
    };
    if threads.is_some() {
        config.pool.threads = threads;
    }

    let grammar = match settlement_grammar() {
        Ok(grammar) => Arc::new(grammar),
        Err(e) => {
            println!("Error: Could not build grammar: {e}");
            return;
        }
    };
    let Some(rule) = grammar.find_rule(SETTLEMENT_RULE) else {
        println!("Error: Grammar has no '{SETTLEMENT_RULE}' rule");
        return;
    };

    let terrain = DemoTerrain::default();
    let side = 2 * radius.max(0) + 1;
    let grid = u64::from(side.unsigned_abs()).pow(2);
    let total = count.map_or(grid, |n| n.min(grid));

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Seed:               {seed}");
    println!("│ Sites:              {total} of {side}x{side} (spacing {SITE_SPACING})");
    println!("│ Threads:            {}", config.pool.resolved_threads());
    println!("│ Max Expansions:     {}", config.generator.max_expansion_count);
    println!("│ Max Stack Depth:    {}", config.generator.max_stack_depth);
    println!("│ Cache Capacity:     {} MiB", config.generator.cache_capacity >> 20);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    if let Some(dir) = &output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            println!("Error: Could not create {}: {e}", dir.display());
            return;
        }
    }

    let pool = GenerationPool::new(Arc::clone(&grammar), Arc::new(terrain), config);
    let start = Instant::now();

    let mut id = 0u64;
    'grid: for gz in -radius..=radius {
        for gx in -radius..=radius {
            if id >= total {
                break 'grid;
            }
            let x = gx * SITE_SPACING;
            let z = gz * SITE_SPACING;
            let y = terrain.height_at(x, z).round() as i32;
            pool.submit(PlacementJob {
                id,
                rule,
                origin: BlockPos::new(x, y, z),
                seed,
            });
            id += 1;
        }
    }
    pool.wait_idle();
    let elapsed = start.elapsed();

    let mut placed = 0usize;
    let mut failed = 0usize;
    let mut components = 0usize;
    let mut expansions = 0u64;
    let mut subchunks = 0usize;
    let mut raw_bytes = 0usize;
    let mut compressed_bytes = 0usize;

    let mut results: Vec<_> = pool.results().try_iter().collect();
    results.sort_by_key(|r| r.job.id);

    for result in &results {
        expansions += u64::from(result.expansion_count);
        match &result.outcome {
            Ok(output) => {
                placed += 1;
                components += result.component_count;
                subchunks += output.subchunk_count();
                raw_bytes += output.data_size();

                let packed = output.compress();
                compressed_bytes += packed.len();

                if let Some(dir) = &output_dir {
                    let path = dir.join(format!("structure_{:04}.stro.lz4", result.job.id));
                    if let Err(e) = std::fs::write(&path, &packed) {
                        println!("Error: Could not write {}: {e}", path.display());
                    }
                }
            }
            Err(_) => failed += 1,
        }
    }

    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    println!("│ Placed:             {placed}");
    println!("│ Rejected:           {failed}");
    println!("│ Components:         {components}");
    println!("│ Expansions:         {expansions}");
    println!("│ Sub-chunks:         {subchunks}");
    println!("│ Block Data:         {raw_bytes} bytes ({compressed_bytes} compressed)");
    println!("│ Elapsed:            {:.2} ms", elapsed.as_secs_f64() * 1000.0);
    println!("└──────────────────────────────────────────────────────────────────┘");
}
