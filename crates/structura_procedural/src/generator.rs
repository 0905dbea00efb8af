//! # Structure Generator
//!
//! Backtracking search that expands a grammar into placed components.
//!
//! ## Search State
//!
//! ```text
//!   queue:  [ entry0 | entry1 | entry2 | ... ]
//!                      ^ cursor
//!   checkpoints: [ root | cp1 | cp2 ]   (LIFO, each a full queue snapshot)
//! ```
//!
//! Every queue entry is the current attempt of one rule instance: which
//! candidate expansion, which attachment option. Processing an entry first
//! replaces it with its next attempt, then tries the current one. A try that
//! can fail takes a checkpoint; failure restores it, so the restored queue
//! already points at the next attempt.
//!
//! Entries are `Rc`-shared and immutable, so a checkpoint copies pointers
//! only. The generator is therefore `!Send`; build one per worker thread.
//!
//! ## Determinism
//!
//! All randomness is drawn from the seed hash chain. The same grammar, rule,
//! origin and seed always yield the same components and the same output.

use std::rc::Rc;
use std::sync::Arc;

use structura_core::{
    hash, hash_pos, shuffle, BlockOrientation, BlockPos, BlockTransform, CompiledExpansion,
    ComponentId, ExpansionTarget, FieldId, Grammar, GrammarError, GrammarResult, OrientationFlags,
    OverlapPolicy, RuleId, Seed, SymbolRef,
};

use crate::cache::{CacheStats, ValueCache};
use crate::config::GeneratorConfig;
use crate::context::{ContextArena, ContextHandle, DataContext};
use crate::error::SearchFailure;
use crate::eval::{Evaluator, FieldProvider};
use crate::output::StructureOutput;

// Salts of the individual random decisions
const CANDIDATE_ORDER_SALT: u32 = 13_713;
const DEPTH_FIRST_SALT: u32 = 136_841;
const OPTION_ORDER_SALT: u32 = 16_512;
const NODE_ORDER_SALT: u32 = 1_531;

// =============================================================================
// Search state
// =============================================================================

/// One instance of a rule being expanded.
#[derive(Debug)]
struct RuleEntry {
    orientation: BlockOrientation,
    data: ContextHandle,
    candidates: Vec<CompiledExpansion>,
}

/// One candidate expansion of a rule entry with its attachment options.
#[derive(Debug)]
struct ExpansionChoice {
    entry: Rc<RuleEntry>,
    candidate_index: usize,
    data: ContextHandle,
    options: Vec<AttachOption>,
}

/// A component node and the orientation variant to attach it with.
///
/// Non-component expansions carry exactly one placeholder option.
#[derive(Clone, Copy, Debug)]
struct AttachOption {
    node: usize,
    orientation: BlockOrientation,
}

#[derive(Clone, Debug)]
enum QueueEntry {
    Pending {
        choice: Rc<ExpansionChoice>,
        option_index: usize,
    },
    Exhausted,
}

#[derive(Debug)]
struct Checkpoint {
    area_count: usize,
    component_count: usize,
    context_count: usize,
    cursor: usize,
    queue: Vec<QueueEntry>,
}

/// A recorded constraint box in world space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Area {
    /// Interned area name.
    pub name_id: u32,
    /// Minimum corner, inclusive.
    pub start: BlockPos,
    /// Maximum corner, inclusive.
    pub end: BlockPos,
}

impl Area {
    /// True if the boxes share at least one cell.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start.all_le(other.end) && other.start.all_le(self.end)
    }
}

/// An accepted component placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentInstance {
    /// Placed component.
    pub component: ComponentId,
    /// Node the component was attached by.
    pub entry_node: usize,
    /// Component data context.
    pub context: ContextHandle,
    /// Component-local to world transform.
    pub transform: BlockTransform,
}

// =============================================================================
// Generator
// =============================================================================

/// Grammar expansion engine. Reusable across placements via [`Self::setup`].
pub struct StructureGenerator {
    grammar: Arc<Grammar>,
    provider: Arc<dyn FieldProvider>,
    config: GeneratorConfig,
    cache: ValueCache,
    contexts: ContextArena,
    areas: Vec<Area>,
    components: Vec<ComponentInstance>,
    queue: Vec<QueueEntry>,
    checkpoints: Vec<Checkpoint>,
    cursor: usize,
    expansion_count: u32,
    seed: Seed,
    solved: bool,
}

impl StructureGenerator {
    /// Creates a generator with its own value cache.
    #[must_use]
    pub fn new(grammar: Arc<Grammar>, provider: Arc<dyn FieldProvider>, config: GeneratorConfig) -> Self {
        Self {
            grammar,
            provider,
            cache: ValueCache::with_policy(config.cache_capacity, config.eviction),
            config,
            contexts: ContextArena::new(),
            areas: Vec::new(),
            components: Vec::new(),
            queue: Vec::new(),
            checkpoints: Vec::new(),
            cursor: 0,
            expansion_count: 0,
            seed: 0,
            solved: false,
        }
    }

    /// Resets all search state and expands `rule` at `origin`.
    ///
    /// The value cache survives; everything else starts over.
    pub fn setup(&mut self, rule: RuleId, origin: BlockPos, seed: Seed) {
        self.areas.clear();
        self.components.clear();
        self.queue.clear();
        self.checkpoints.clear();
        self.contexts.clear();
        self.cursor = 0;
        self.expansion_count = 0;
        self.solved = false;
        self.seed = hash_pos(origin, seed);

        // Exhausting the top-level rule restores this empty state
        self.add_branch();

        if !self.expand_rule(rule, origin, BlockOrientation::Unspecified, None) {
            tracing::debug!(rule = %self.grammar.rule(rule).info.name, "entry rule cannot expand");
        }
    }

    /// Runs the search to completion.
    ///
    /// # Errors
    ///
    /// Returns the reason the search stopped without a structure.
    pub fn process(&mut self) -> Result<(), SearchFailure> {
        while self.cursor < self.queue.len() {
            self.expansion_count += 1;
            if self.expansion_count >= self.config.max_expansion_count {
                let limit = self.config.max_expansion_count;
                tracing::warn!(limit, "structure search stopped: maximum expansion count exceeded");
                return Err(SearchFailure::ExpansionLimit { limit });
            }
            if self.checkpoint_depth() >= self.config.max_stack_depth {
                let limit = self.config.max_stack_depth;
                tracing::warn!(limit, "structure search stopped: maximum stack depth exceeded");
                return Err(SearchFailure::StackDepthLimit { limit });
            }

            let QueueEntry::Pending { choice, option_index } = self.queue[self.cursor].clone() else {
                self.fail_branch();
                continue;
            };

            // Advance first so checkpoints taken below already hold the next attempt
            let entry = Rc::clone(&choice.entry);
            self.queue[self.cursor] = self.next_state(&entry, Some((&choice, option_index)));

            if self.process_expansion(&choice, option_index) {
                self.cursor += 1;
            }
        }

        if self.queue.is_empty() {
            tracing::debug!(
                attempts = self.expansion_count,
                "no solution found, tried all possible expansions"
            );
            return Err(SearchFailure::NoSolution {
                attempts: self.expansion_count,
            });
        }

        self.solved = true;
        tracing::debug!(
            attempts = self.expansion_count,
            components = self.components.len(),
            areas = self.areas.len(),
            "structure search succeeded"
        );
        Ok(())
    }

    /// `setup`, `process` and `generate_output` in one call.
    ///
    /// # Errors
    ///
    /// Returns the search failure, if any.
    pub fn generate(&mut self, rule: RuleId, origin: BlockPos, seed: Seed) -> Result<StructureOutput, SearchFailure> {
        self.setup(rule, origin, seed);
        self.process()?;
        Ok(self.generate_output())
    }

    /// Rasterizes the block fills of every accepted component.
    ///
    /// Undefined samples are skipped. A fill whose fields fail to evaluate is
    /// logged and skipped.
    ///
    /// # Panics
    ///
    /// Panics unless the last `process()` succeeded.
    pub fn generate_output(&mut self) -> StructureOutput {
        assert!(self.solved, "generate_output called without a successful search");

        let grammar = Arc::clone(&self.grammar);
        let mut output = StructureOutput::new();

        for index in 0..self.components.len() {
            let instance = self.components[index];
            let component = grammar.component(instance.component);

            for spec in &component.blocks {
                let result = if spec.positions.is_empty() {
                    match spec.start {
                        Some(start) => self.fill_box(&mut output, instance.context, spec.block, start, spec.end),
                        None => Ok(()),
                    }
                } else {
                    let offset = if spec.positions_offset { spec.start } else { None };
                    self.fill_positions(&mut output, instance.context, spec.block, &spec.positions, offset)
                };

                if let Err(err) = result {
                    tracing::warn!(component = %component.info.name, error = %err, "skipping block fill");
                }
            }
        }

        output
    }

    fn fill_box(
        &mut self,
        output: &mut StructureOutput,
        ctx: ContextHandle,
        block: FieldId,
        start: FieldId,
        end: Option<FieldId>,
    ) -> GrammarResult<()> {
        let p1 = self.world_pos(ctx, start)?;
        let p2 = match end {
            Some(end) => self.world_pos(ctx, end)?,
            None => p1,
        };
        let (lo, hi) = (p1.min(p2), p1.max(p2));
        let (first, last) = (lo.subchunk_origin(), hi.subchunk_origin());

        for sz in (first.z..=last.z).step_by(16) {
            for sy in (first.y..=last.y).step_by(16) {
                for sx in (first.x..=last.x).step_by(16) {
                    let origin = BlockPos::new(sx, sy, sz);
                    let samples = self.evaluator().subchunk_record(ctx, block, origin)?;

                    let start = lo.max(origin) - origin;
                    let end = hi.min(origin + BlockPos::splat(15)) - origin;
                    let volume = (end - start + BlockPos::splat(1)).volume() as usize;

                    let record = output.record_mut(origin);
                    record.should_use_flat(volume);
                    for z in start.z..=end.z {
                        for y in start.y..=end.y {
                            for x in start.x..=end.x {
                                let index = BlockPos::new(x, y, z).subchunk_index();
                                let id = samples.at(usize::from(index)).as_block();
                                if !id.is_undefined() {
                                    record.write(index, id);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn fill_positions(
        &mut self,
        output: &mut StructureOutput,
        ctx: ContextHandle,
        block: FieldId,
        positions: &[BlockPos],
        offset: Option<FieldId>,
    ) -> GrammarResult<()> {
        let offset = match offset {
            Some(field) => self.evaluator().sample_pos(ctx, field)?,
            None => BlockPos::ZERO,
        };

        for &pos in positions {
            let world = self.contexts.get(ctx).map_to_world(pos + offset);
            let id = self.evaluator().sample(ctx, block, world)?.as_block();
            if !id.is_undefined() {
                output.write_block(world, id);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Expansion
    // =========================================================================

    /// Instantiates a rule under `parent` and queues its first attempt.
    ///
    /// Returns false, leaving the queue untouched, if the rule's conditions
    /// fail or none of its expansions is applicable.
    fn expand_rule(
        &mut self,
        rule: RuleId,
        local_origin: BlockPos,
        orientation: BlockOrientation,
        parent: Option<ContextHandle>,
    ) -> bool {
        let grammar = Arc::clone(&self.grammar);
        let rule_def = grammar.rule(rule);
        let mark = self.contexts.len();

        let data = match self.contexts.create(
            &grammar,
            parent,
            SymbolRef::Rule(rule),
            BlockTransform::translation(local_origin),
            self.seed,
        ) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(rule = %rule_def.info.name, error = %err, "cannot enter rule");
                return false;
            }
        };

        if !self.check_conditions(data, &rule_def.info.conditions) {
            self.contexts.truncate(mark);
            return false;
        }

        let ctx_seed = self.contexts.get(data).seed();
        let candidates = rule_def.ordered_candidates(hash(CANDIDATE_ORDER_SALT, ctx_seed));
        if candidates.is_empty() {
            self.contexts.truncate(mark);
            return false;
        }

        self.contexts.set_params(&grammar, data);

        let entry = Rc::new(RuleEntry {
            orientation,
            data,
            candidates,
        });
        let state = self.next_state(&entry, None);
        if matches!(state, QueueEntry::Exhausted) {
            self.contexts.truncate(mark);
            return false;
        }

        let depth_first = !self.queue.is_empty() && {
            let p = rule_def.depth_first_probability();
            ((hash(DEPTH_FIRST_SALT, ctx_seed) % 1000) as f32) < p * 1000.0
        };

        if depth_first {
            self.queue.insert(self.cursor + 1, state);
        } else {
            self.queue.push(state);
        }
        true
    }

    /// The attempt after `previous`, or the first one.
    ///
    /// Moves through the options of the current candidate, then on to later
    /// candidates, skipping those whose conditions fail.
    fn next_state(&mut self, entry: &Rc<RuleEntry>, previous: Option<(&Rc<ExpansionChoice>, usize)>) -> QueueEntry {
        let (mut candidate_index, mut option_index, mut choice) = match previous {
            Some((choice, option_index)) => (choice.candidate_index, option_index + 1, Some(Rc::clone(choice))),
            None => (0, 0, None),
        };

        loop {
            if candidate_index >= entry.candidates.len() {
                return QueueEntry::Exhausted;
            }

            if let Some(current) = &choice {
                if option_index < current.options.len() {
                    return QueueEntry::Pending {
                        choice: Rc::clone(current),
                        option_index,
                    };
                }
                choice = None;
                candidate_index += 1;
                option_index = 0;
                continue;
            }

            match self.open_choice(entry, candidate_index) {
                Some(opened) => choice = Some(Rc::new(opened)),
                None => candidate_index += 1,
            }
        }
    }

    /// Enters a candidate expansion: creates its context, checks conditions
    /// and enumerates attachment options.
    fn open_choice(&mut self, entry: &Rc<RuleEntry>, candidate_index: usize) -> Option<ExpansionChoice> {
        let grammar = Arc::clone(&self.grammar);
        let id = entry.candidates[candidate_index].expansion;
        let expansion = grammar.expansion(id);
        let mark = self.contexts.len();

        let data = match self.contexts.create(
            &grammar,
            Some(entry.data),
            SymbolRef::Expansion(id),
            BlockTransform::IDENTITY,
            self.seed,
        ) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(expansion = %expansion.info.name, error = %err, "cannot enter expansion");
                return None;
            }
        };

        if !self.check_conditions(data, &expansion.info.conditions) {
            self.contexts.truncate(mark);
            return None;
        }

        let options = match &expansion.target {
            ExpansionTarget::Component { component, node } => {
                let comp = grammar.component(*component);
                let nodes = comp.nodes_named(node.as_deref());
                if nodes.is_empty() {
                    let err = GrammarError::MissingNode {
                        component: comp.info.name.clone(),
                        node: node.clone().unwrap_or_default(),
                    };
                    tracing::warn!(expansion = %expansion.info.name, error = %err, "skipping expansion");
                    self.contexts.truncate(mark);
                    return None;
                }

                let mut options = Vec::with_capacity(nodes.len() * 4);
                for index in nodes {
                    let node = &comp.nodes[index];
                    let mut orientation = node.orientation;
                    if orientation.is_specified() && node.allow_rotation() {
                        for _ in 0..4 {
                            options.push(AttachOption { node: index, orientation });
                            orientation = orientation.next_up_variant();
                        }
                    } else {
                        options.push(AttachOption { node: index, orientation });
                    }
                }
                shuffle(&mut options, hash(OPTION_ORDER_SALT, self.contexts.get(data).seed()));
                options
            }
            ExpansionTarget::Void | ExpansionTarget::Rule(_) => vec![AttachOption {
                node: 0,
                orientation: BlockOrientation::Unspecified,
            }],
        };

        self.contexts.set_params(&grammar, data);

        Some(ExpansionChoice {
            entry: Rc::clone(entry),
            candidate_index,
            data,
            options,
        })
    }

    /// Tries one attempt. Returns true if the entry is resolved.
    fn process_expansion(&mut self, choice: &Rc<ExpansionChoice>, option_index: usize) -> bool {
        let grammar = Arc::clone(&self.grammar);
        let candidate = choice.entry.candidates[choice.candidate_index];

        match &grammar.expansion(candidate.expansion).target {
            ExpansionTarget::Void => true,
            ExpansionTarget::Rule(target) => {
                self.add_branch();
                if !self.expand_rule(*target, BlockPos::ZERO, choice.entry.orientation, Some(choice.data)) {
                    self.fail_branch();
                    return false;
                }
                true
            }
            ExpansionTarget::Component { component, .. } => {
                self.expand_component(&grammar, *component, choice, option_index, candidate.mirror)
            }
        }
    }

    fn expand_component(
        &mut self,
        grammar: &Grammar,
        id: ComponentId,
        choice: &Rc<ExpansionChoice>,
        option_index: usize,
        mirror: bool,
    ) -> bool {
        let component = grammar.component(id);
        let option = choice.options[option_index];
        let node = &component.nodes[option.node];

        let flags = OrientationFlags::NONE
            .with(OrientationFlags::HORIZONTAL_EDGE, node.horizontal_edge())
            .with(OrientationFlags::VERTICAL_EDGE, node.vertical_edge())
            .with(OrientationFlags::ADJACENT, node.adjacent())
            .with(OrientationFlags::MIRROR, mirror);

        let node_pos = match self.evaluator().sample_pos(choice.data, node.position) {
            Ok(pos) => pos,
            Err(err) => {
                tracing::warn!(component = %component.info.name, error = %err, "cannot place node");
                return false;
            }
        };
        let local = option
            .orientation
            .transform_to_match(choice.entry.orientation.adjacent(), flags)
            * BlockTransform::translation(-node_pos);

        let mark = self.contexts.len();
        let data = match self.contexts.create(grammar, Some(choice.data), SymbolRef::Component(id), local, self.seed) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(component = %component.info.name, error = %err, "cannot enter component");
                return false;
            }
        };

        if !self.check_conditions(data, &component.info.conditions) {
            self.contexts.truncate(mark);
            return false;
        }

        // From here on every change is undone by fail_branch
        self.push_checkpoint(mark);
        self.components.push(ComponentInstance {
            component: id,
            entry_node: option.node,
            context: data,
            transform: self.contexts.get(data).local_to_world(),
        });

        for spec in &component.areas {
            let corners = self
                .world_pos(data, spec.start)
                .and_then(|a| self.world_pos(data, spec.end).map(|b| (a, b)));
            let (a, b) = match corners {
                Ok(corners) => corners,
                Err(err) => {
                    tracing::warn!(component = %component.info.name, error = %err, "cannot evaluate area");
                    self.fail_branch();
                    return false;
                }
            };
            let area = Area {
                name_id: spec.name_id,
                start: a.min(b),
                end: a.max(b),
            };

            if spec.policy != OverlapPolicy::MayOverlap {
                let overlaps = self
                    .areas
                    .iter()
                    .any(|other| other.name_id == area.name_id && other.overlaps(&area));
                if overlaps != (spec.policy == OverlapPolicy::MustOverlap) {
                    self.fail_branch();
                    return false;
                }
            }

            if !spec.virtual_only {
                self.areas.push(area);
            }
        }

        self.contexts.set_params(grammar, data);

        let mut order: Vec<usize> = (0..component.nodes.len()).collect();
        let node_seed = hash(self.contexts.get(data).seed() ^ NODE_ORDER_SALT, self.seed);
        shuffle(&mut order, node_seed);

        for index in order {
            let node = &component.nodes[index];
            let Some(rule) = node.rule else {
                continue;
            };
            if index == option.node {
                continue;
            }

            let pos = match self.evaluator().sample_pos(data, node.position) {
                Ok(pos) => pos,
                Err(err) => {
                    tracing::warn!(component = %component.info.name, error = %err, "cannot place node");
                    self.fail_branch();
                    return false;
                }
            };
            if !self.expand_rule(rule, pos, node.orientation, Some(data)) {
                self.fail_branch();
                return false;
            }
        }

        true
    }

    // =========================================================================
    // Checkpoints
    // =========================================================================

    fn add_branch(&mut self) {
        self.push_checkpoint(self.contexts.len());
    }

    fn push_checkpoint(&mut self, context_count: usize) {
        self.checkpoints.push(Checkpoint {
            area_count: self.areas.len(),
            component_count: self.components.len(),
            context_count,
            cursor: self.cursor,
            queue: self.queue.clone(),
        });
    }

    /// Rolls back to the most recent checkpoint.
    fn fail_branch(&mut self) {
        let Some(checkpoint) = self.checkpoints.pop() else {
            panic!("fail_branch with an empty checkpoint stack");
        };

        self.areas.truncate(checkpoint.area_count);
        self.components.truncate(checkpoint.component_count);
        self.contexts.truncate(checkpoint.context_count);
        self.queue = checkpoint.queue;
        self.cursor = checkpoint.cursor;
    }

    // =========================================================================
    // Evaluation helpers
    // =========================================================================

    fn evaluator(&mut self) -> Evaluator<'_> {
        Evaluator::new(&self.grammar, self.provider.as_ref(), &mut self.contexts, &mut self.cache)
    }

    /// Conditions of a symbol; evaluation errors count as failure.
    fn check_conditions(&mut self, ctx: ContextHandle, conditions: &[FieldId]) -> bool {
        match self.evaluator().check_conditions(ctx, conditions) {
            Ok(passed) => passed,
            Err(err) => {
                tracing::warn!(error = %err, "condition evaluation failed");
                false
            }
        }
    }

    /// A Float3 field sampled at the context origin, mapped to world space.
    fn world_pos(&mut self, ctx: ContextHandle, field: FieldId) -> GrammarResult<BlockPos> {
        let local = self.evaluator().sample_pos(ctx, field)?;
        Ok(self.contexts.get(ctx).map_to_world(local))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Accepted components, in acceptance order.
    #[must_use]
    pub fn components(&self) -> &[ComponentInstance] {
        &self.components
    }

    /// Recorded areas.
    #[must_use]
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Attempts made by the last search.
    #[must_use]
    pub const fn expansion_count(&self) -> u32 {
        self.expansion_count
    }

    /// Open checkpoints, not counting the root.
    #[must_use]
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len().saturating_sub(1)
    }

    /// Run seed derived from origin and seed.
    #[must_use]
    pub const fn seed(&self) -> Seed {
        self.seed
    }

    /// True if the last `process()` succeeded.
    #[must_use]
    pub const fn is_solved(&self) -> bool {
        self.solved
    }

    /// Value cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Data context of an accepted component.
    #[must_use]
    pub fn context(&self, handle: ContextHandle) -> &DataContext {
        self.contexts.get(handle)
    }

    /// The grammar being expanded.
    #[must_use]
    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }
}

impl std::fmt::Debug for StructureGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructureGenerator")
            .field("seed", &self.seed)
            .field("queue_len", &self.queue.len())
            .field("cursor", &self.cursor)
            .field("checkpoints", &self.checkpoints.len())
            .field("components", &self.components.len())
            .field("expansion_count", &self.expansion_count)
            .finish_non_exhaustive()
    }
}
