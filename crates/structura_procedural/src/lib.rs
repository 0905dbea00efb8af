//! # STRUCTURA Structure Generation
//!
//! Grammar-driven placement of multi-block structures.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same grammar, origin and seed always produce the same blocks
//! 2. **Bounded**: Every search stops at the expansion or depth limit
//! 3. **Reversible**: A failed branch rolls back to its checkpoint, nothing leaks
//! 4. **Cached**: Field records are shared across runs within a memory cap
//!
//! ## Core Components
//!
//! - `StructureGenerator`: Backtracking expansion of rules into components
//! - `ContextArena`: Data contexts carrying transforms, seeds and parameters
//! - `Evaluator`: Field evaluation over sub-chunks
//! - `ValueCache`: Memory-capped record cache with sampled eviction
//! - `StructureOutput`: Sparse/flat sub-chunk block storage
//! - `GenerationPool`: One generator per worker thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use structura_procedural::demo::{settlement_grammar, DemoTerrain, SETTLEMENT_RULE};
//! use structura_procedural::{GeneratorConfig, StructureGenerator};
//!
//! let grammar = Arc::new(settlement_grammar()?);
//! let rule = grammar.find_rule(SETTLEMENT_RULE).unwrap();
//! let mut generator =
//!     StructureGenerator::new(grammar, Arc::new(DemoTerrain::default()), GeneratorConfig::default());
//!
//! let output = generator.generate(rule, BlockPos::new(0, 66, 0), 42)?;
//! println!("{} sub-chunks", output.subchunk_count());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cache;
pub mod config;
pub mod context;
pub mod demo;
pub mod error;
pub mod eval;
pub mod generator;
pub mod output;
pub mod pool;
pub mod record;

pub use cache::{CacheStats, EvictionPolicy, ValueCache};
pub use config::{GeneratorConfig, PoolConfig, StructuraConfig};
pub use context::{ContextArena, ContextHandle, DataContext, ParamBinding, ParamKey};
pub use error::{ConfigError, ConfigResult, OutputError, OutputResult, SearchFailure};
pub use eval::{Evaluator, FieldProvider, NoExternalFields};
pub use generator::{Area, ComponentInstance, StructureGenerator};
pub use output::{SparseCell, StructureOutput, SubChunkIter, SubChunkRecord};
pub use pool::{GenerationPool, PlacementJob, PlacementResult};
pub use record::{DataRecord, RecordKey, SubKey};
