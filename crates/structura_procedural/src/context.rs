//! # Data Contexts
//!
//! One context per entered rule, expansion or component. Contexts form a tree
//! mirroring expansion nesting and live in a [`ContextArena`]; the generator
//! truncates the arena on rollback, so a context and every bridging binding it
//! owns disappear together.
//!
//! ## Parameter flow
//!
//! ```text
//!   parent.outputs ──bridge──> child.inputs ──param sets──> child.outputs
//!                              (defaults for declared params)
//! ```
//!
//! A bridging binding does not copy anything: sampling it re-enters the parent
//! context and evaluates the parent's output there.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use structura_core::{
    hash_pos, BlockPos, BlockTransform, Dimensionality, FieldId, Grammar, GrammarError,
    GrammarResult, Seed, SymbolRef, ValueType,
};

use crate::record::{DataRecord, RecordKey};

/// Generation-checked reference to a context in a [`ContextArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    index: u32,
    generation: u32,
}

impl ContextHandle {
    /// Arena slot.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

/// `name#type` parameter identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamKey {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: ValueType,
}

impl ParamKey {
    /// Creates a key.
    #[must_use]
    pub fn new(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.ty)
    }
}

/// Where a parameter's value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamBinding {
    /// A field evaluated in the context holding the binding.
    Local(FieldId),
    /// The parent's output of the same key, evaluated in the parent.
    Bridge(ContextHandle),
}

/// Evaluation scope of one rule, expansion or component instance.
#[derive(Debug)]
pub struct DataContext {
    parent: Option<ContextHandle>,
    symbol: SymbolRef,
    local_to_world: BlockTransform,
    world_to_local: BlockTransform,
    seed: Seed,
    param_inputs: HashMap<ParamKey, ParamBinding>,
    param_outputs: HashMap<ParamKey, ParamBinding>,
    param_key_mapping: HashMap<FieldId, ParamKey>,
    pub(crate) data_cache: HashMap<RecordKey, Arc<DataRecord>>,
    pub(crate) dimensionality_cache: HashMap<FieldId, Dimensionality>,
    pub(crate) input_param_dimensionality_cache: HashMap<FieldId, Dimensionality>,
}

impl DataContext {
    /// Parent context, `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<ContextHandle> {
        self.parent
    }

    /// Owning grammar symbol.
    #[must_use]
    pub const fn symbol(&self) -> SymbolRef {
        self.symbol
    }

    /// Local-to-world transform.
    #[must_use]
    pub const fn local_to_world(&self) -> BlockTransform {
        self.local_to_world
    }

    /// World-to-local transform.
    #[must_use]
    pub const fn world_to_local(&self) -> BlockTransform {
        self.world_to_local
    }

    /// World position of the local origin; conditions are sampled here.
    #[must_use]
    pub const fn origin(&self) -> BlockPos {
        self.local_to_world.origin()
    }

    /// Maps a local position to world space.
    #[must_use]
    pub fn map_to_world(&self, local: BlockPos) -> BlockPos {
        self.local_to_world.apply(local)
    }

    /// Context seed.
    #[must_use]
    pub const fn seed(&self) -> Seed {
        self.seed
    }

    /// Input binding of a parameter.
    #[must_use]
    pub fn input(&self, key: &ParamKey) -> Option<ParamBinding> {
        self.param_inputs.get(key).copied()
    }

    /// Output binding of a parameter.
    #[must_use]
    pub fn output(&self, key: &ParamKey) -> Option<ParamBinding> {
        self.param_outputs.get(key).copied()
    }

    /// Parameter a placeholder field reads, if this context declares it.
    #[must_use]
    pub fn placeholder_key(&self, placeholder: FieldId) -> Option<&ParamKey> {
        self.param_key_mapping.get(&placeholder)
    }

    /// Number of memoized data records.
    #[must_use]
    pub fn memoized_records(&self) -> usize {
        self.data_cache.len()
    }
}

/// Arena of data contexts with stack-like truncation.
#[derive(Debug, Default)]
pub struct ContextArena {
    slots: Vec<DataContext>,
    generations: Vec<u32>,
}

impl ContextArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context for `symbol` under `parent`.
    ///
    /// The child transform is `parent * local`. The seed hashes the new
    /// context's world origin against the parent seed; the root takes
    /// `run_seed`. Declared parameters bind to their defaults, then every
    /// parent output becomes a bridging input.
    ///
    /// # Errors
    ///
    /// `MissingParamValue` if a declared parameter has neither a default nor a
    /// parent output.
    pub fn create(
        &mut self,
        grammar: &Grammar,
        parent: Option<ContextHandle>,
        symbol: SymbolRef,
        local: BlockTransform,
        run_seed: Seed,
    ) -> GrammarResult<ContextHandle> {
        let (local_to_world, seed) = match parent {
            Some(handle) => {
                let parent_ctx = self.get(handle);
                let local_to_world = parent_ctx.local_to_world * local;
                (local_to_world, hash_pos(local_to_world.origin(), parent_ctx.seed))
            }
            None => (local, run_seed),
        };

        let info = grammar.symbol(symbol);
        let mut param_inputs = HashMap::new();
        let mut param_key_mapping = HashMap::new();
        for declare in &info.params {
            let key = ParamKey::new(&declare.name, declare.ty);
            if let Some(default) = declare.default {
                param_inputs.insert(key.clone(), ParamBinding::Local(default));
            }
            param_key_mapping.insert(declare.placeholder, key);
        }

        if let Some(handle) = parent {
            for key in self.get(handle).param_outputs.keys() {
                param_inputs.insert(key.clone(), ParamBinding::Bridge(handle));
            }
        }

        for declare in &info.params {
            if !param_inputs.contains_key(&ParamKey::new(&declare.name, declare.ty)) {
                return Err(GrammarError::MissingParamValue(declare.name.clone()));
            }
        }

        let context = DataContext {
            parent,
            symbol,
            local_to_world,
            world_to_local: local_to_world.inverse(),
            seed,
            param_outputs: param_inputs.clone(),
            param_inputs,
            param_key_mapping,
            data_cache: HashMap::new(),
            dimensionality_cache: HashMap::new(),
            input_param_dimensionality_cache: HashMap::new(),
        };

        let index = self.slots.len();
        if index < self.generations.len() {
            self.generations[index] = self.generations[index].wrapping_add(1);
        } else {
            self.generations.push(0);
        }
        self.slots.push(context);

        Ok(ContextHandle {
            index: index as u32,
            generation: self.generations[index],
        })
    }

    /// Applies the symbol's param-set statements to the context's outputs.
    ///
    /// Inputs are left untouched, so placeholders read during the same
    /// evaluation never see the new values.
    pub fn set_params(&mut self, grammar: &Grammar, handle: ContextHandle) {
        let context = self.get_mut(handle);
        for set in &grammar.symbol(context.symbol).param_sets {
            context
                .param_outputs
                .insert(ParamKey::new(&set.name, set.ty), ParamBinding::Local(set.value));
        }
    }

    /// Context behind a handle.
    ///
    /// # Panics
    ///
    /// Panics on a handle whose context was dropped by a rollback.
    #[must_use]
    pub fn get(&self, handle: ContextHandle) -> &DataContext {
        assert!(self.is_live(handle), "stale context handle {handle:?}");
        &self.slots[handle.index()]
    }

    /// Mutable context behind a handle.
    ///
    /// # Panics
    ///
    /// Panics on a stale handle.
    pub fn get_mut(&mut self, handle: ContextHandle) -> &mut DataContext {
        assert!(self.is_live(handle), "stale context handle {handle:?}");
        &mut self.slots[handle.index()]
    }

    /// True if the handle still refers to its context.
    #[must_use]
    pub fn is_live(&self, handle: ContextHandle) -> bool {
        handle.index() < self.slots.len() && self.generations[handle.index()] == handle.generation
    }

    /// Drops every context created after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    /// Drops every context.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no context is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structura_core::{GrammarBuilder, RuleId};

    fn grammar_with_param() -> (Grammar, RuleId, RuleId, FieldId) {
        let mut b = GrammarBuilder::new();
        let outer = b.rule("outer");
        let inner = b.rule("inner");
        b.expand_to_rule(outer, inner);
        b.expand_to_void(inner);
        let five = b.float(5.0);
        b.set_param(SymbolRef::Rule(outer), "width", five);
        let default = b.float(1.0);
        let placeholder = b.param(SymbolRef::Rule(inner), "width", ValueType::Float, Some(default));
        (b.build().expect("valid grammar"), outer, inner, placeholder)
    }

    #[test]
    fn test_parent_output_bridges() {
        let (grammar, outer, inner, placeholder) = grammar_with_param();
        let mut arena = ContextArena::new();

        let root = arena
            .create(&grammar, None, SymbolRef::Rule(outer), BlockTransform::IDENTITY, 7)
            .expect("root");
        arena.set_params(&grammar, root);
        let child = arena
            .create(&grammar, Some(root), SymbolRef::Rule(inner), BlockTransform::IDENTITY, 7)
            .expect("child");

        let key = ParamKey::new("width", ValueType::Float);
        assert_eq!(arena.get(child).input(&key), Some(ParamBinding::Bridge(root)));
        assert_eq!(arena.get(child).placeholder_key(placeholder), Some(&key));
    }

    #[test]
    fn test_default_without_parent_output() {
        let (grammar, outer, inner, _) = grammar_with_param();
        let mut arena = ContextArena::new();

        // set_params never called: the parent exposes no outputs
        let root = arena
            .create(&grammar, None, SymbolRef::Rule(outer), BlockTransform::IDENTITY, 7)
            .expect("root");
        let child = arena
            .create(&grammar, Some(root), SymbolRef::Rule(inner), BlockTransform::IDENTITY, 7)
            .expect("child");

        let key = ParamKey::new("width", ValueType::Float);
        assert!(matches!(arena.get(child).input(&key), Some(ParamBinding::Local(_))));
    }

    #[test]
    fn test_missing_param_value() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("needs");
        b.expand_to_void(rule);
        b.param(SymbolRef::Rule(rule), "height", ValueType::Float, None);
        let grammar = b.build().expect("valid grammar");

        let mut arena = ContextArena::new();
        let err = arena
            .create(&grammar, None, SymbolRef::Rule(rule), BlockTransform::IDENTITY, 0)
            .unwrap_err();
        assert_eq!(err, GrammarError::MissingParamValue("height".into()));
    }

    #[test]
    fn test_truncate_invalidates_handles() {
        let (grammar, outer, _, _) = grammar_with_param();
        let mut arena = ContextArena::new();

        let a = arena
            .create(&grammar, None, SymbolRef::Rule(outer), BlockTransform::IDENTITY, 1)
            .expect("a");
        arena.truncate(0);
        let b = arena
            .create(&grammar, None, SymbolRef::Rule(outer), BlockTransform::IDENTITY, 1)
            .expect("b");

        assert_eq!(a.index(), b.index());
        assert!(!arena.is_live(a));
        assert!(arena.is_live(b));
    }

    #[test]
    fn test_child_seed_and_transform() {
        let (grammar, outer, inner, _) = grammar_with_param();
        let mut arena = ContextArena::new();

        let root = arena
            .create(
                &grammar,
                None,
                SymbolRef::Rule(outer),
                BlockTransform::translation(BlockPos::new(10, 0, 0)),
                99,
            )
            .expect("root");
        let child = arena
            .create(
                &grammar,
                Some(root),
                SymbolRef::Rule(inner),
                BlockTransform::translation(BlockPos::new(0, 3, 0)),
                99,
            )
            .expect("child");

        assert_eq!(arena.get(root).seed(), 99);
        assert_eq!(arena.get(child).origin(), BlockPos::new(10, 3, 0));
        assert_eq!(arena.get(child).seed(), hash_pos(BlockPos::new(10, 3, 0), 99));
        assert_eq!(
            arena.get(child).world_to_local().apply(BlockPos::new(10, 3, 0)),
            BlockPos::ZERO
        );
    }
}
