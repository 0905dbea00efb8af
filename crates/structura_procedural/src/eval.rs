//! # Field Evaluation
//!
//! Samples grammar fields against a data context. Every call takes the active
//! context handle explicitly; there is no ambient "current context".
//!
//! Records are memoized in two places:
//! - contextual fields (those reading params, the context seed or transform)
//!   in the context's own table, dropped with the context;
//! - everything else in the worker's [`ValueCache`], shared by all contexts.
//!
//! Spatially constant fields collapse to a single uniform record regardless
//! of the requested position.

use std::sync::Arc;

use structura_core::hash::unit_f32;
use structura_core::{
    cell_offset, hash, hash_pos, BlockPos, Dimensionality, ExternalId, FieldId,
    FieldKind, Grammar, GrammarError, GrammarResult, Sample,
};

use crate::cache::ValueCache;
use crate::context::{ContextArena, ContextHandle, ParamBinding, ParamKey};
use crate::record::{DataRecord, RecordKey, SubKey};

/// External value-evaluation subsystem.
pub trait FieldProvider: Send + Sync {
    /// Whether an external field varies with position.
    fn dimensionality(&self, field: ExternalId) -> Dimensionality;

    /// Samples an external field at a world position.
    fn sample(&self, field: ExternalId, pos: BlockPos) -> Sample;
}

/// Provider for grammars without external fields. Every sample is `0.0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExternalFields;

impl FieldProvider for NoExternalFields {
    fn dimensionality(&self, _field: ExternalId) -> Dimensionality {
        Dimensionality::Constant
    }

    fn sample(&self, _field: ExternalId, _pos: BlockPos) -> Sample {
        Sample::Float(0.0)
    }
}

/// Borrowed view over everything field sampling needs.
pub struct Evaluator<'a> {
    grammar: &'a Grammar,
    provider: &'a dyn FieldProvider,
    contexts: &'a mut ContextArena,
    cache: &'a mut ValueCache,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator.
    pub fn new(
        grammar: &'a Grammar,
        provider: &'a dyn FieldProvider,
        contexts: &'a mut ContextArena,
        cache: &'a mut ValueCache,
    ) -> Self {
        Self {
            grammar,
            provider,
            contexts,
            cache,
        }
    }

    /// Samples `field` at a world position.
    ///
    /// # Errors
    ///
    /// Fails if a parameter placeholder cannot be resolved.
    pub fn sample(&mut self, ctx: ContextHandle, field: FieldId, pos: BlockPos) -> GrammarResult<Sample> {
        Ok(self.record(ctx, field, pos, SubKey::Point)?.at(0))
    }

    /// Samples a Bool field at the context origin.
    ///
    /// # Errors
    ///
    /// Fails if a parameter placeholder cannot be resolved.
    pub fn sample_bool(&mut self, ctx: ContextHandle, field: FieldId) -> GrammarResult<bool> {
        let origin = self.contexts.get(ctx).origin();
        Ok(self.sample(ctx, field, origin)?.as_bool())
    }

    /// Samples a Float3 field at the context origin as a local block position.
    ///
    /// # Errors
    ///
    /// Fails if a parameter placeholder cannot be resolved.
    pub fn sample_pos(&mut self, ctx: ContextHandle, field: FieldId) -> GrammarResult<BlockPos> {
        let origin = self.contexts.get(ctx).origin();
        Ok(BlockPos::from_float3(self.sample(ctx, field, origin)?.as_float3()))
    }

    /// True if every condition holds at the context origin.
    ///
    /// # Errors
    ///
    /// Fails if a parameter placeholder cannot be resolved.
    pub fn check_conditions(&mut self, ctx: ContextHandle, conditions: &[FieldId]) -> GrammarResult<bool> {
        for &condition in conditions {
            if !self.sample_bool(ctx, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record of `field` over the subchunk containing `origin`.
    ///
    /// # Errors
    ///
    /// Fails if a parameter placeholder cannot be resolved.
    pub fn subchunk_record(
        &mut self,
        ctx: ContextHandle,
        field: FieldId,
        origin: BlockPos,
    ) -> GrammarResult<Arc<DataRecord>> {
        self.record(ctx, field, origin.subchunk_origin(), SubKey::SubChunk)
    }

    /// Whether `field` varies with position in this context.
    ///
    /// # Errors
    ///
    /// Fails if a parameter placeholder cannot be resolved.
    pub fn dimensionality(&mut self, ctx: ContextHandle, field: FieldId) -> GrammarResult<Dimensionality> {
        if !self.grammar.field(field).contextual {
            if let Some(d) = self.cache.dimensionality(field) {
                return Ok(d);
            }
            let d = self.compute_dimensionality(ctx, field)?;
            self.cache.remember_dimensionality(field, d);
            return Ok(d);
        }

        if let Some(&d) = self.contexts.get(ctx).dimensionality_cache.get(&field) {
            return Ok(d);
        }
        let d = self.compute_dimensionality(ctx, field)?;
        self.contexts.get_mut(ctx).dimensionality_cache.insert(field, d);
        Ok(d)
    }

    fn compute_dimensionality(&mut self, ctx: ContextHandle, field: FieldId) -> GrammarResult<Dimensionality> {
        let grammar = self.grammar;
        let kind = &grammar.field(field).kind;
        match kind {
            FieldKind::Const(_) | FieldKind::ContextRandom { .. } => Ok(Dimensionality::Constant),
            FieldKind::WorldPosition | FieldKind::LocalPosition | FieldKind::BlockRandom { .. } => {
                Ok(Dimensionality::Varying)
            }
            FieldKind::External(id) => Ok(self.provider.dimensionality(*id)),
            FieldKind::Param { .. } => self.input_param_dimensionality(ctx, field),
            _ => {
                let mut d = Dimensionality::Constant;
                for input in kind.inputs() {
                    d = d.max(self.dimensionality(ctx, input)?);
                }
                Ok(d)
            }
        }
    }

    /// Dimensionality of the value bound to a parameter placeholder, memoized
    /// in the context.
    fn input_param_dimensionality(&mut self, ctx: ContextHandle, placeholder: FieldId) -> GrammarResult<Dimensionality> {
        if let Some(&d) = self
            .contexts
            .get(ctx)
            .input_param_dimensionality_cache
            .get(&placeholder)
        {
            return Ok(d);
        }

        let (source_ctx, source_field) = self.resolve_placeholder(ctx, placeholder)?;
        let d = self.dimensionality(source_ctx, source_field)?;
        self.contexts
            .get_mut(ctx)
            .input_param_dimensionality_cache
            .insert(placeholder, d);
        Ok(d)
    }

    /// Finds the context and field a placeholder currently reads.
    ///
    /// The placeholder is looked up in `ctx` and then its ancestors; the
    /// binding chain is followed through bridges to the context that owns the
    /// actual field.
    fn resolve_placeholder(&self, ctx: ContextHandle, placeholder: FieldId) -> GrammarResult<(ContextHandle, FieldId)> {
        let unbound = || match &self.grammar.field(placeholder).kind {
            FieldKind::Param { name } => GrammarError::UnboundParam(name.clone()),
            _ => GrammarError::UnboundParam(format!("field {}", placeholder.0)),
        };

        let mut owner = ctx;
        let key: ParamKey = loop {
            let context = self.contexts.get(owner);
            if let Some(key) = context.placeholder_key(placeholder) {
                break key.clone();
            }
            owner = context.parent().ok_or_else(unbound)?;
        };

        let mut current = owner;
        let mut binding = self.contexts.get(owner).input(&key).ok_or_else(unbound)?;
        loop {
            match binding {
                ParamBinding::Local(field) => return Ok((current, field)),
                ParamBinding::Bridge(parent) => {
                    binding = self.contexts.get(parent).output(&key).ok_or_else(unbound)?;
                    current = parent;
                }
            }
        }
    }

    fn record(
        &mut self,
        ctx: ContextHandle,
        field: FieldId,
        origin: BlockPos,
        sub_key: SubKey,
    ) -> GrammarResult<Arc<DataRecord>> {
        let dimensionality = self.dimensionality(ctx, field)?;
        let key = match dimensionality {
            Dimensionality::Constant => RecordKey::constant(field),
            Dimensionality::Varying => RecordKey {
                field,
                origin,
                sub_key,
            },
        };

        if self.grammar.field(field).contextual {
            if let Some(record) = self.contexts.get(ctx).data_cache.get(&key) {
                return Ok(Arc::clone(record));
            }
            let record = self.compute(ctx, field, key)?;
            self.contexts
                .get_mut(ctx)
                .data_cache
                .insert(key, Arc::clone(&record));
            Ok(record)
        } else {
            if let Some(record) = self.cache.get(&key) {
                return Ok(record);
            }
            let record = self.compute(ctx, field, key)?;
            let size = record.memory_size();
            self.cache.insert(key, Arc::clone(&record), size);
            Ok(record)
        }
    }

    fn compute(&mut self, ctx: ContextHandle, field: FieldId, key: RecordKey) -> GrammarResult<Arc<DataRecord>> {
        let grammar = self.grammar;
        let provider = self.provider;
        let cells = key.cell_count();
        let pos_of = |i: usize| match key.sub_key {
            SubKey::Point => key.origin,
            SubKey::SubChunk => key.origin + cell_offset(i),
        };

        let record = match &grammar.field(field).kind {
            FieldKind::Const(sample) => DataRecord::uniform(*sample),
            FieldKind::WorldPosition => {
                DataRecord::from_fn(cells, |i| Sample::Float3(pos_of(i).to_float3()))
            }
            FieldKind::LocalPosition => {
                let to_local = self.contexts.get(ctx).world_to_local();
                DataRecord::from_fn(cells, |i| Sample::Float3(to_local.apply(pos_of(i)).to_float3()))
            }
            FieldKind::ContextRandom { salt } => {
                let seed = self.contexts.get(ctx).seed();
                DataRecord::uniform(Sample::Float(unit_f32(hash(*salt, seed))))
            }
            FieldKind::BlockRandom { salt } => {
                DataRecord::from_fn(cells, |i| Sample::Float(unit_f32(hash_pos(pos_of(i), *salt))))
            }
            FieldKind::External(id) => DataRecord::from_fn(cells, |i| provider.sample(*id, pos_of(i))),
            FieldKind::Param { .. } => {
                let (source_ctx, source_field) = self.resolve_placeholder(ctx, field)?;
                return self.record(source_ctx, source_field, key.origin, key.sub_key);
            }
            FieldKind::Binary { op, lhs, rhs } => {
                let (a, b) = self.pair(ctx, *lhs, *rhs, key)?;
                self.combine(&key, &[&a, &b], |i| Sample::binary(*op, a.at(i), b.at(i)))
            }
            FieldKind::Compare { op, lhs, rhs } => {
                let (a, b) = self.pair(ctx, *lhs, *rhs, key)?;
                self.combine(&key, &[&a, &b], |i| Sample::Bool(op.apply(a.at(i), b.at(i))))
            }
            FieldKind::And(lhs, rhs) => {
                let (a, b) = self.pair(ctx, *lhs, *rhs, key)?;
                self.combine(&key, &[&a, &b], |i| Sample::Bool(a.at(i).as_bool() && b.at(i).as_bool()))
            }
            FieldKind::Or(lhs, rhs) => {
                let (a, b) = self.pair(ctx, *lhs, *rhs, key)?;
                self.combine(&key, &[&a, &b], |i| Sample::Bool(a.at(i).as_bool() || b.at(i).as_bool()))
            }
            FieldKind::Not(input) => {
                let a = self.record(ctx, *input, key.origin, key.sub_key)?;
                self.combine(&key, &[&a], |i| Sample::Bool(!a.at(i).as_bool()))
            }
            FieldKind::Select {
                condition,
                then,
                otherwise,
            } => {
                let c = self.record(ctx, *condition, key.origin, key.sub_key)?;
                let (t, e) = self.pair(ctx, *then, *otherwise, key)?;
                self.combine(&key, &[&c, &t, &e], |i| {
                    if c.at(i).as_bool() {
                        t.at(i)
                    } else {
                        e.at(i)
                    }
                })
            }
            FieldKind::Vector([x, y, z]) => {
                let vx = self.record(ctx, *x, key.origin, key.sub_key)?;
                let (vy, vz) = self.pair(ctx, *y, *z, key)?;
                self.combine(&key, &[&vx, &vy, &vz], |i| {
                    Sample::Float3([vx.at(i).as_float(), vy.at(i).as_float(), vz.at(i).as_float()])
                })
            }
            FieldKind::Axis { vector, axis } => {
                let v = self.record(ctx, *vector, key.origin, key.sub_key)?;
                self.combine(&key, &[&v], |i| Sample::Float(v.at(i).as_float3()[axis.index()]))
            }
        };

        Ok(Arc::new(record))
    }

    fn pair(
        &mut self,
        ctx: ContextHandle,
        lhs: FieldId,
        rhs: FieldId,
        key: RecordKey,
    ) -> GrammarResult<(Arc<DataRecord>, Arc<DataRecord>)> {
        let a = self.record(ctx, lhs, key.origin, key.sub_key)?;
        let b = self.record(ctx, rhs, key.origin, key.sub_key)?;
        Ok((a, b))
    }

    /// Combines input records cell by cell; uniform inputs give a uniform
    /// result.
    #[allow(clippy::unused_self)]
    fn combine(&self, key: &RecordKey, inputs: &[&Arc<DataRecord>], f: impl FnMut(usize) -> Sample) -> DataRecord {
        let cells = if inputs.iter().all(|r| r.is_uniform()) {
            1
        } else {
            key.cell_count()
        };
        DataRecord::from_fn(cells, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use structura_core::{
        Axis, BinaryOp, BlockTransform, CompareOp, GrammarBuilder, RuleId, SymbolRef, ValueType,
        SUBCHUNK_VOLUME,
    };

    struct Fixture {
        grammar: Grammar,
        contexts: ContextArena,
        cache: ValueCache,
    }

    impl Fixture {
        fn new(grammar: Grammar) -> Self {
            Self {
                grammar,
                contexts: ContextArena::new(),
                cache: ValueCache::new(16 << 20),
            }
        }

        fn root(&mut self, rule: RuleId, origin: BlockPos) -> ContextHandle {
            self.contexts
                .create(
                    &self.grammar,
                    None,
                    SymbolRef::Rule(rule),
                    BlockTransform::translation(origin),
                    1234,
                )
                .expect("root context")
        }

        fn child(&mut self, parent: ContextHandle, rule: RuleId) -> ContextHandle {
            self.contexts
                .create(
                    &self.grammar,
                    Some(parent),
                    SymbolRef::Rule(rule),
                    BlockTransform::IDENTITY,
                    1234,
                )
                .expect("child context")
        }

        fn eval(&mut self) -> Evaluator<'_> {
            Evaluator::new(&self.grammar, &NoExternalFields, &mut self.contexts, &mut self.cache)
        }
    }

    #[test]
    fn test_local_position_uses_context_frame() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let local = b.local_position();
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let ctx = fx.root(rule, BlockPos::new(100, 64, -3));
        let v = fx.eval().sample(ctx, local, BlockPos::new(101, 66, -3)).expect("sample");
        assert_eq!(v, Sample::Float3([1.0, 2.0, 0.0]));
    }

    #[test]
    fn test_constant_collapses_to_uniform() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let two = b.float(2.0);
        let three = b.float(3.0);
        let product = b.binary(BinaryOp::Mul, two, three);
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let ctx = fx.root(rule, BlockPos::ZERO);
        let record = fx
            .eval()
            .subchunk_record(ctx, product, BlockPos::new(32, 0, 0))
            .expect("record");
        assert!(record.is_uniform());
        assert_eq!(record.at(17), Sample::Float(6.0));
    }

    #[test]
    fn test_varying_subchunk_record() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let world = b.world_position();
        let y = b.axis(world, Axis::Y);
        let limit = b.float(20.0);
        let below = b.compare(CompareOp::Lt, y, limit);
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let ctx = fx.root(rule, BlockPos::ZERO);
        let record = fx
            .eval()
            .subchunk_record(ctx, below, BlockPos::new(0, 16, 0))
            .expect("record");

        assert_eq!(record.len(), SUBCHUNK_VOLUME);
        assert_eq!(record.at(BlockPos::new(0, 19, 0).subchunk_index() as usize), Sample::Bool(true));
        assert_eq!(record.at(BlockPos::new(0, 20, 0).subchunk_index() as usize), Sample::Bool(false));
    }

    #[test]
    fn test_non_contextual_records_shared_in_cache() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let noise = b.block_random(5);
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let a = fx.root(rule, BlockPos::ZERO);
        let first = fx.eval().subchunk_record(a, noise, BlockPos::ZERO).expect("record");
        fx.contexts.clear();
        let b_ctx = fx.root(rule, BlockPos::new(5, 5, 5));
        let second = fx.eval().subchunk_record(b_ctx, noise, BlockPos::ZERO).expect("record");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fx.cache.stats().hits, 1);
    }

    /// Constant height that counts how often it is asked for its dimensionality.
    #[derive(Default)]
    struct CountingTerrain {
        dimensionality_calls: AtomicUsize,
    }

    impl FieldProvider for CountingTerrain {
        fn dimensionality(&self, _field: ExternalId) -> Dimensionality {
            self.dimensionality_calls.fetch_add(1, Ordering::Relaxed);
            Dimensionality::Varying
        }

        fn sample(&self, _field: ExternalId, _pos: BlockPos) -> Sample {
            Sample::Float(64.0)
        }
    }

    #[test]
    fn test_non_contextual_dimensionality_asked_once() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let height = b.external(ExternalId(0), ValueType::Float);
        let offset = b.float(1.0);
        let raised = b.binary(BinaryOp::Add, height, offset);
        let mut fx = Fixture::new(b.build().expect("grammar"));
        let terrain = CountingTerrain::default();

        let ctx = fx.root(rule, BlockPos::ZERO);
        let other = fx.root(rule, BlockPos::new(40, 0, 40));
        for i in 0..20 {
            let pos = BlockPos::new(i * 16, 0, 0);
            for handle in [ctx, other] {
                let mut eval = Evaluator::new(&fx.grammar, &terrain, &mut fx.contexts, &mut fx.cache);
                assert_eq!(eval.sample(handle, raised, pos).expect("sample"), Sample::Float(65.0));
                assert_eq!(eval.dimensionality(handle, raised).expect("dimensionality"), Dimensionality::Varying);
            }
        }

        assert_eq!(terrain.dimensionality_calls.load(Ordering::Relaxed), 1);

        // Dropping the cache drops what it learned
        fx.cache.clear();
        let mut eval = Evaluator::new(&fx.grammar, &terrain, &mut fx.contexts, &mut fx.cache);
        eval.dimensionality(ctx, height).expect("dimensionality");
        assert_eq!(terrain.dimensionality_calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_contextual_records_memoized_per_context() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let random = b.context_random(9);
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let a = fx.root(rule, BlockPos::ZERO);
        let first = fx.eval().sample(a, random, BlockPos::ZERO).expect("sample");
        let again = fx.eval().sample(a, random, BlockPos::new(3, 3, 3)).expect("sample");

        assert_eq!(first, again);
        assert_eq!(fx.contexts.get(a).memoized_records(), 1);
        assert!(fx.cache.is_empty());
    }

    #[test]
    fn test_param_bridges_to_parent_output() {
        let mut b = GrammarBuilder::new();
        let outer = b.rule("outer");
        let inner = b.rule("inner");
        b.expand_to_rule(outer, inner);
        b.expand_to_void(inner);
        let local = b.local_position();
        let lx = b.axis(local, Axis::X);
        b.set_param(SymbolRef::Rule(outer), "offset", lx);
        let zero = b.float(0.0);
        let offset = b.param(SymbolRef::Rule(inner), "offset", ValueType::Float, Some(zero));
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let root = fx.root(outer, BlockPos::new(10, 0, 0));
        fx.contexts.set_params(&fx.grammar, root);
        let child = fx.child(root, inner);

        // Evaluated in the parent frame: local x relative to (10, 0, 0)
        let v = fx.eval().sample(child, offset, BlockPos::new(14, 0, 0)).expect("sample");
        assert_eq!(v, Sample::Float(4.0));
        assert_eq!(fx.eval().dimensionality(child, offset).expect("dim"), Dimensionality::Varying);
    }

    #[test]
    fn test_param_default_when_not_supplied() {
        let mut b = GrammarBuilder::new();
        let rule = b.rule("r");
        b.expand_to_void(rule);
        let seven = b.float(7.0);
        let width = b.param(SymbolRef::Rule(rule), "width", ValueType::Float, Some(seven));
        let one = b.float(1.0);
        let wider = b.binary(BinaryOp::Add, width, one);
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let ctx = fx.root(rule, BlockPos::ZERO);
        assert_eq!(fx.eval().sample(ctx, wider, BlockPos::ZERO).expect("sample"), Sample::Float(8.0));
    }

    #[test]
    fn test_unbound_placeholder_reports_error() {
        let mut b = GrammarBuilder::new();
        let owner = b.rule("owner");
        let other = b.rule("other");
        b.expand_to_void(owner);
        b.expand_to_void(other);
        let zero = b.float(0.0);
        let placeholder = b.param(SymbolRef::Rule(owner), "depth", ValueType::Float, Some(zero));
        let mut fx = Fixture::new(b.build().expect("grammar"));

        let ctx = fx.root(other, BlockPos::ZERO);
        let err = fx.eval().sample(ctx, placeholder, BlockPos::ZERO).unwrap_err();
        assert_eq!(err, GrammarError::UnboundParam("depth".into()));
    }
}
