//! # STRUCTURA Core
//!
//! Shared model for grammar-driven structure generation:
//! - Block positions, orientations and exact integer transforms
//! - The seed hash chain behind every random decision
//! - The compiled grammar: rules, expansions, components, fields
//!
//! ## Architecture Rules
//!
//! 1. **Immutable grammar** - Built once, shared read-only by every worker
//! 2. **Deterministic** - Randomness only from `hash`, never from the OS
//! 3. **Exact math** - Rotations are signed permutations, no float drift
//!
//! ## Example
//!
//! ```rust,ignore
//! use structura_core::{GrammarBuilder, SymbolRef};
//!
//! let mut b = GrammarBuilder::new();
//! let start = b.rule("start");
//! b.expand_to_void(start);
//! let grammar = b.build()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod block;
pub mod error;
pub mod grammar;
pub mod hash;
pub mod math;

pub use block::{cell_offset, BlockId, SUBCHUNK_SIZE, SUBCHUNK_VOLUME};
pub use error::{GrammarError, GrammarResult};
pub use grammar::{
    AreaSpec, Axis, BinaryOp, BlockSpec, CompareOp, CompiledExpansion, Component, ComponentId,
    ComponentNode, Dimensionality, ExpansionId, ExpansionTarget, ExternalId, FieldDef, FieldId,
    FieldKind, Grammar, GrammarBuilder, OverlapPolicy, PragmaValue, Rule, RuleExpansion, RuleId,
    Sample, SymbolInfo, SymbolRef, ValueType,
};
pub use hash::{hash, hash_pos, rehash, shuffle, Seed};
pub use math::{BlockOrientation, BlockPos, BlockTransform, Facing, OrientationFlags};
