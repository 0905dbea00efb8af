//! # Grammar Builder
//!
//! Programmatic construction of a [`Grammar`], the shape a grammar-language
//! front end emits. Rules and components may be referenced before they are
//! declared; `build()` resolves and validates everything at once.
//!
//! Field constructors never fail. Type errors are collected and the first one
//! is returned by `build()`.

use std::collections::HashMap;

use super::component::{AreaSpec, BlockSpec, Component, ComponentId, ComponentNode, OverlapPolicy};
use super::field::{Axis, BinaryOp, CompareOp, ExternalId, FieldDef, FieldId, FieldKind, Sample, ValueType};
use super::pragma::{self, PragmaValue, Pragmas};
use super::rule::{compile_tiers, CompiledExpansion, ExpansionId, ExpansionTarget, Rule, RuleExpansion, RuleId};
use super::symbol::{ParamDeclare, ParamSet, SymbolInfo};
use super::{Grammar, SymbolRef};
use crate::block::BlockId;
use crate::error::{GrammarError, GrammarResult};
use crate::math::{BlockOrientation, BlockPos};

/// Incremental grammar construction.
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    rules: Vec<Rule>,
    rule_declared: Vec<bool>,
    expansions: Vec<RuleExpansion>,
    components: Vec<Component>,
    component_declared: Vec<bool>,
    fields: Vec<FieldDef>,
    rule_index: HashMap<String, RuleId>,
    component_index: HashMap<String, ComponentId>,
    errors: Vec<GrammarError>,
}

impl GrammarBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    /// Declares a rule (or returns the existing one).
    pub fn rule(&mut self, name: &str) -> RuleId {
        let id = self.rule_ref(name);
        self.rule_declared[id.index()] = true;
        id
    }

    /// References a rule that may be declared later.
    pub fn rule_ref(&mut self, name: &str) -> RuleId {
        if let Some(&id) = self.rule_index.get(name) {
            return id;
        }
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule {
            info: SymbolInfo::named(name),
            expansions: Vec::new(),
            tiers: Vec::new(),
        });
        self.rule_declared.push(false);
        self.rule_index.insert(name.to_owned(), id);
        id
    }

    /// Declares a component (or returns the existing one).
    pub fn component(&mut self, name: &str) -> ComponentId {
        let id = self.component_ref(name);
        self.component_declared[id.index()] = true;
        id
    }

    /// References a component that may be declared later.
    pub fn component_ref(&mut self, name: &str) -> ComponentId {
        if let Some(&id) = self.component_index.get(name) {
            return id;
        }
        let id = ComponentId(self.components.len() as u32);
        self.components.push(Component {
            info: SymbolInfo::named(name),
            nodes: Vec::new(),
            areas: Vec::new(),
            blocks: Vec::new(),
        });
        self.component_declared.push(false);
        self.component_index.insert(name.to_owned(), id);
        id
    }

    fn info_mut(&mut self, symbol: SymbolRef) -> &mut SymbolInfo {
        match symbol {
            SymbolRef::Rule(id) => &mut self.rules[id.index()].info,
            SymbolRef::Expansion(id) => &mut self.expansions[id.index()].info,
            SymbolRef::Component(id) => &mut self.components[id.index()].info,
        }
    }

    /// Adds a Bool condition to a symbol.
    pub fn add_condition(&mut self, symbol: SymbolRef, condition: FieldId) {
        let context = format!("condition of '{}'", self.info_mut(symbol).name);
        self.expect_type(&context, condition, ValueType::Bool);
        self.info_mut(symbol).conditions.push(condition);
    }

    /// Sets a pragma on a symbol.
    pub fn set_pragma(&mut self, symbol: SymbolRef, name: &str, value: PragmaValue) {
        self.info_mut(symbol).pragmas.set(name, value);
    }

    /// Declares an input parameter and returns its placeholder field.
    pub fn param(
        &mut self,
        symbol: SymbolRef,
        name: &str,
        ty: ValueType,
        default: Option<FieldId>,
    ) -> FieldId {
        if let Some(default) = default {
            self.expect_type(&format!("default of param '{name}'"), default, ty);
        }
        let placeholder = self.push_field(
            ty,
            FieldKind::Param {
                name: name.to_owned(),
            },
        );
        self.info_mut(symbol).params.push(ParamDeclare {
            name: name.to_owned(),
            ty,
            default,
            placeholder,
        });
        placeholder
    }

    /// Assigns an output parameter.
    pub fn set_param(&mut self, symbol: SymbolRef, name: &str, value: FieldId) {
        let ty = self.field_type(value);
        self.info_mut(symbol).param_sets.push(ParamSet {
            name: name.to_owned(),
            ty,
            value,
        });
    }

    // =========================================================================
    // Expansions
    // =========================================================================

    /// Adds an expansion that succeeds without doing anything.
    pub fn expand_to_void(&mut self, rule: RuleId) -> ExpansionId {
        self.push_expansion(rule, ExpansionTarget::Void, false)
    }

    /// Adds an expansion into another rule.
    pub fn expand_to_rule(&mut self, rule: RuleId, target: RuleId) -> ExpansionId {
        self.push_expansion(rule, ExpansionTarget::Rule(target), false)
    }

    /// Adds an expansion that places a component, attached by nodes named
    /// `node` (any node when `None`).
    pub fn expand_to_component(
        &mut self,
        rule: RuleId,
        component: ComponentId,
        node: Option<&str>,
        mirror: bool,
    ) -> ExpansionId {
        let target = ExpansionTarget::Component {
            component,
            node: node.map(str::to_owned),
        };
        self.push_expansion(rule, target, mirror)
    }

    fn push_expansion(&mut self, rule: RuleId, target: ExpansionTarget, mirror: bool) -> ExpansionId {
        let id = ExpansionId(self.expansions.len() as u32);
        let owner = &mut self.rules[rule.index()];
        let name = format!("{}#{}", owner.info.name, owner.expansions.len());
        owner.expansions.push(id);
        self.rule_declared[rule.index()] = true;

        self.expansions.push(RuleExpansion {
            info: SymbolInfo::named(name),
            owner: rule,
            target,
            mirror,
        });
        id
    }

    // =========================================================================
    // Component contents
    // =========================================================================

    /// Adds an attachment node and returns its index.
    pub fn node(
        &mut self,
        component: ComponentId,
        name: &str,
        position: FieldId,
        orientation: BlockOrientation,
        rule: Option<RuleId>,
    ) -> usize {
        let comp_name = self.components[component.index()].info.name.clone();
        self.expect_type(&format!("position of node '{name}'"), position, ValueType::Float3);
        if !orientation.is_valid() {
            self.errors.push(GrammarError::InvalidOrientation {
                component: comp_name,
                node: name.to_owned(),
            });
        }

        let nodes = &mut self.components[component.index()].nodes;
        nodes.push(ComponentNode {
            name: name.to_owned(),
            position,
            orientation,
            rule,
            pragmas: Pragmas::default(),
        });
        nodes.len() - 1
    }

    /// Sets a pragma on a node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not an index returned by [`Self::node`].
    pub fn set_node_pragma(&mut self, component: ComponentId, node: usize, name: &str, value: PragmaValue) {
        self.components[component.index()].nodes[node]
            .pragmas
            .set(name, value);
    }

    /// Adds a constraint area.
    pub fn area(
        &mut self,
        component: ComponentId,
        name: &str,
        start: FieldId,
        end: FieldId,
        policy: OverlapPolicy,
        virtual_only: bool,
    ) {
        self.expect_type(&format!("start of area '{name}'"), start, ValueType::Float3);
        self.expect_type(&format!("end of area '{name}'"), end, ValueType::Float3);
        self.components[component.index()].areas.push(AreaSpec {
            name: name.to_owned(),
            name_id: 0,
            start,
            end,
            policy,
            virtual_only,
        });
    }

    /// Fills the box `start..=end` (or the single cell `start`).
    pub fn fill_box(&mut self, component: ComponentId, block: FieldId, start: FieldId, end: Option<FieldId>) {
        self.expect_type("block fill", block, ValueType::Block);
        self.expect_type("block fill start", start, ValueType::Float3);
        if let Some(end) = end {
            self.expect_type("block fill end", end, ValueType::Float3);
        }
        self.components[component.index()].blocks.push(BlockSpec {
            block,
            start: Some(start),
            end,
            positions: Vec::new(),
            positions_offset: false,
        });
    }

    /// Fills explicit positions, optionally shifted by a Float3 offset field.
    pub fn fill_positions(
        &mut self,
        component: ComponentId,
        block: FieldId,
        positions: Vec<BlockPos>,
        offset: Option<FieldId>,
    ) {
        self.expect_type("block fill", block, ValueType::Block);
        if let Some(offset) = offset {
            self.expect_type("block fill offset", offset, ValueType::Float3);
        }
        self.components[component.index()].blocks.push(BlockSpec {
            block,
            start: offset,
            end: None,
            positions,
            positions_offset: offset.is_some(),
        });
    }

    // =========================================================================
    // Fields
    // =========================================================================

    fn push_field(&mut self, ty: ValueType, kind: FieldKind) -> FieldId {
        let contextual = kind.reads_context()
            || kind
                .inputs()
                .iter()
                .any(|input| self.fields[input.index()].contextual);
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldDef { ty, kind, contextual });
        id
    }

    fn field_type(&self, id: FieldId) -> ValueType {
        self.fields[id.index()].ty
    }

    fn expect_type(&mut self, context: &str, id: FieldId, expected: ValueType) {
        let found = self.field_type(id);
        if found != expected {
            self.errors.push(GrammarError::TypeMismatch {
                context: context.to_owned(),
                expected,
                found,
            });
        }
    }

    /// Constant field.
    pub fn constant(&mut self, value: Sample) -> FieldId {
        self.push_field(value.value_type(), FieldKind::Const(value))
    }

    /// Constant scalar.
    pub fn float(&mut self, value: f32) -> FieldId {
        self.constant(Sample::Float(value))
    }

    /// Constant boolean.
    pub fn boolean(&mut self, value: bool) -> FieldId {
        self.constant(Sample::Bool(value))
    }

    /// Constant vector.
    pub fn float3(&mut self, value: [f32; 3]) -> FieldId {
        self.constant(Sample::Float3(value))
    }

    /// Constant block position as a vector.
    pub fn position(&mut self, pos: BlockPos) -> FieldId {
        self.float3(pos.to_float3())
    }

    /// Constant block.
    pub fn block(&mut self, block: BlockId) -> FieldId {
        self.constant(Sample::Block(block))
    }

    /// The sampled world position.
    pub fn world_position(&mut self) -> FieldId {
        self.push_field(ValueType::Float3, FieldKind::WorldPosition)
    }

    /// The sampled position in the context's local frame.
    pub fn local_position(&mut self) -> FieldId {
        self.push_field(ValueType::Float3, FieldKind::LocalPosition)
    }

    /// One random scalar per data context.
    pub fn context_random(&mut self, salt: u32) -> FieldId {
        self.push_field(ValueType::Float, FieldKind::ContextRandom { salt })
    }

    /// One random scalar per world block.
    pub fn block_random(&mut self, salt: u32) -> FieldId {
        self.push_field(ValueType::Float, FieldKind::BlockRandom { salt })
    }

    /// Field served by the external provider.
    pub fn external(&mut self, id: ExternalId, ty: ValueType) -> FieldId {
        self.push_field(ty, FieldKind::External(id))
    }

    /// Arithmetic over scalars and vectors.
    pub fn binary(&mut self, op: BinaryOp, lhs: FieldId, rhs: FieldId) -> FieldId {
        let (a, b) = (self.field_type(lhs), self.field_type(rhs));
        for (id, ty) in [(lhs, a), (rhs, b)] {
            if !matches!(ty, ValueType::Float | ValueType::Float3) {
                self.expect_type("arithmetic operand", id, ValueType::Float);
            }
        }
        let ty = if a == ValueType::Float3 || b == ValueType::Float3 {
            ValueType::Float3
        } else {
            ValueType::Float
        };
        self.push_field(ty, FieldKind::Binary { op, lhs, rhs })
    }

    /// Comparison of two scalars or two blocks.
    pub fn compare(&mut self, op: CompareOp, lhs: FieldId, rhs: FieldId) -> FieldId {
        let expected = match self.field_type(lhs) {
            ValueType::Block => ValueType::Block,
            _ => ValueType::Float,
        };
        self.expect_type("comparison operand", lhs, expected);
        self.expect_type("comparison operand", rhs, expected);
        self.push_field(ValueType::Bool, FieldKind::Compare { op, lhs, rhs })
    }

    /// Logical and.
    pub fn and(&mut self, lhs: FieldId, rhs: FieldId) -> FieldId {
        self.expect_type("logical operand", lhs, ValueType::Bool);
        self.expect_type("logical operand", rhs, ValueType::Bool);
        self.push_field(ValueType::Bool, FieldKind::And(lhs, rhs))
    }

    /// Logical or.
    pub fn or(&mut self, lhs: FieldId, rhs: FieldId) -> FieldId {
        self.expect_type("logical operand", lhs, ValueType::Bool);
        self.expect_type("logical operand", rhs, ValueType::Bool);
        self.push_field(ValueType::Bool, FieldKind::Or(lhs, rhs))
    }

    /// Logical not.
    pub fn not(&mut self, value: FieldId) -> FieldId {
        self.expect_type("logical operand", value, ValueType::Bool);
        self.push_field(ValueType::Bool, FieldKind::Not(value))
    }

    /// Conditional value.
    pub fn select(&mut self, condition: FieldId, then: FieldId, otherwise: FieldId) -> FieldId {
        self.expect_type("select condition", condition, ValueType::Bool);
        let ty = self.field_type(then);
        self.expect_type("select branch", otherwise, ty);
        self.push_field(
            ty,
            FieldKind::Select {
                condition,
                then,
                otherwise,
            },
        )
    }

    /// Vector from three scalars.
    pub fn vector(&mut self, x: FieldId, y: FieldId, z: FieldId) -> FieldId {
        for c in [x, y, z] {
            self.expect_type("vector component", c, ValueType::Float);
        }
        self.push_field(ValueType::Float3, FieldKind::Vector([x, y, z]))
    }

    /// One component of a vector.
    pub fn axis(&mut self, vector: FieldId, axis: Axis) -> FieldId {
        self.expect_type("axis source", vector, ValueType::Float3);
        self.push_field(ValueType::Float, FieldKind::Axis { vector, axis })
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Validates and compiles the grammar.
    ///
    /// # Errors
    ///
    /// Returns the first type error, undefined reference, degenerate node
    /// orientation or mistyped pragma.
    pub fn build(mut self) -> GrammarResult<Grammar> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        if let Some(i) = self.rule_declared.iter().position(|d| !d) {
            return Err(GrammarError::UndefinedRule(self.rules[i].info.name.clone()));
        }
        if let Some(i) = self.component_declared.iter().position(|d| !d) {
            return Err(GrammarError::UndefinedComponent(
                self.components[i].info.name.clone(),
            ));
        }

        let mut infos: Vec<&SymbolInfo> = Vec::new();
        infos.extend(self.rules.iter().map(|r| &r.info));
        infos.extend(self.expansions.iter().map(|e| &e.info));
        infos.extend(self.components.iter().map(|c| &c.info));
        for info in infos {
            check_param_sets(info)?;
        }

        for rule in &self.rules {
            if rule.info.pragmas.is_non_number(pragma::DEPTH_FIRST_PROBABILITY) {
                return Err(invalid_pragma(&rule.info.name, pragma::DEPTH_FIRST_PROBABILITY));
            }
        }
        for expansion in &mut self.expansions {
            for name in [pragma::PRIORITY, pragma::PROBABILITY_RATIO] {
                if expansion.info.pragmas.is_non_number(name) {
                    return Err(invalid_pragma(&expansion.info.name, name));
                }
            }
            expansion.apply_default_pragmas();
        }
        for component in &mut self.components {
            for node in &mut component.nodes {
                for name in [
                    pragma::ALLOW_ROTATION,
                    pragma::ADJACENT,
                    pragma::HORIZONTAL_EDGE,
                    pragma::VERTICAL_EDGE,
                ] {
                    if node.pragmas.is_non_flag(name) {
                        return Err(invalid_pragma(&node.name, name));
                    }
                }
                node.apply_default_pragmas();
            }
        }

        // Intern area names
        let mut area_names: Vec<String> = Vec::new();
        let mut area_lookup: HashMap<String, u32> = HashMap::new();
        for component in &mut self.components {
            for area in &mut component.areas {
                area.name_id = if let Some(&id) = area_lookup.get(&area.name) {
                    id
                } else {
                    let id = area_names.len() as u32;
                    area_names.push(area.name.clone());
                    area_lookup.insert(area.name.clone(), id);
                    id
                };
            }
        }

        for rule in &mut self.rules {
            rule.info.pragmas.set_default(
                pragma::DEPTH_FIRST_PROBABILITY,
                PragmaValue::Number(pragma::DEFAULT_DEPTH_FIRST_PROBABILITY),
            );
            let candidates: Vec<(f32, CompiledExpansion)> = rule
                .expansions
                .iter()
                .map(|&id| {
                    let expansion = &self.expansions[id.index()];
                    (
                        expansion.priority(),
                        CompiledExpansion {
                            expansion: id,
                            probability_ratio: expansion.probability_ratio(),
                            mirror: expansion.mirror,
                        },
                    )
                })
                .collect();
            rule.tiers = compile_tiers(&candidates);
        }

        tracing::debug!(
            rules = self.rules.len(),
            components = self.components.len(),
            fields = self.fields.len(),
            "grammar built"
        );

        Ok(Grammar {
            rules: self.rules,
            expansions: self.expansions,
            components: self.components,
            fields: self.fields,
            area_names,
            rule_index: self.rule_index,
            component_index: self.component_index,
        })
    }
}

fn check_param_sets(info: &SymbolInfo) -> GrammarResult<()> {
    for set in &info.param_sets {
        if let Some(declared) = info.param(&set.name) {
            if declared.ty != set.ty {
                return Err(GrammarError::TypeMismatch {
                    context: format!("param set '{}' of '{}'", set.name, info.name),
                    expected: declared.ty,
                    found: set.ty,
                });
            }
        }
    }
    Ok(())
}

fn invalid_pragma(symbol: &str, pragma: &str) -> GrammarError {
    GrammarError::InvalidPragma {
        symbol: symbol.to_owned(),
        pragma: pragma.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Facing;

    #[test]
    fn test_forward_reference_resolves() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        let later = b.rule_ref("later");
        b.expand_to_rule(start, later);
        b.rule("later");
        b.expand_to_void(later);

        let grammar = b.build().expect("valid grammar");
        assert_eq!(grammar.find_rule("later"), Some(later));
        assert_eq!(grammar.rule(start).tiers.len(), 1);
    }

    #[test]
    fn test_undefined_rule_rejected() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        let ghost = b.rule_ref("ghost");
        b.expand_to_rule(start, ghost);

        assert_eq!(b.build().unwrap_err(), GrammarError::UndefinedRule("ghost".into()));
    }

    #[test]
    fn test_condition_must_be_bool() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        let f = b.float(1.0);
        b.add_condition(SymbolRef::Rule(start), f);

        assert!(matches!(
            b.build(),
            Err(GrammarError::TypeMismatch { expected: ValueType::Bool, found: ValueType::Float, .. })
        ));
    }

    #[test]
    fn test_param_set_type_checked() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        let default = b.float(2.0);
        b.param(SymbolRef::Rule(start), "width", ValueType::Float, Some(default));
        let wrong = b.boolean(true);
        b.set_param(SymbolRef::Rule(start), "width", wrong);

        assert!(matches!(b.build(), Err(GrammarError::TypeMismatch { .. })));
    }

    #[test]
    fn test_pragma_defaults_and_void_priority() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        let other = b.rule("other");
        b.expand_to_void(other);
        let void = b.expand_to_void(start);
        let into = b.expand_to_rule(start, other);

        let g = b.build().expect("valid grammar");
        assert!((g.expansion(void).priority() - 9999.0).abs() < f32::EPSILON);
        assert!((g.expansion(into).priority() - 1.0).abs() < f32::EPSILON);
        assert!((g.rule(start).depth_first_probability() - 0.5).abs() < f32::EPSILON);
        assert_eq!(g.rule(start).tiers[0].candidates[0].expansion, into);
    }

    #[test]
    fn test_bool_priority_rejected() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        let e = b.expand_to_void(start);
        b.set_pragma(SymbolRef::Expansion(e), pragma::PRIORITY, PragmaValue::Bool(true));

        assert!(matches!(b.build(), Err(GrammarError::InvalidPragma { .. })));
    }

    #[test]
    fn test_contextual_propagates() {
        let mut b = GrammarBuilder::new();
        let start = b.rule("start");
        b.expand_to_void(start);
        let random = b.context_random(1);
        let one = b.float(1.0);
        let sum = b.binary(BinaryOp::Add, random, one);
        let world = b.world_position();
        let x = b.axis(world, Axis::X);

        let g = b.build().expect("valid grammar");
        assert!(g.field(sum).contextual);
        assert!(!g.field(one).contextual);
        assert!(!g.field(x).contextual);
    }

    #[test]
    fn test_area_names_interned() {
        let mut b = GrammarBuilder::new();
        let c1 = b.component("a");
        let c2 = b.component("b");
        let p = b.position(BlockPos::ZERO);
        b.area(c1, "building", p, p, OverlapPolicy::MustNotOverlap, false);
        b.area(c2, "building", p, p, OverlapPolicy::MustNotOverlap, false);
        b.area(c2, "street", p, p, OverlapPolicy::MayOverlap, true);

        let g = b.build().expect("valid grammar");
        let a = &g.component(c1).areas[0];
        let b0 = &g.component(c2).areas[0];
        let b1 = &g.component(c2).areas[1];
        assert_eq!(a.name_id, b0.name_id);
        assert_ne!(a.name_id, b1.name_id);
        assert_eq!(g.area_name(b1.name_id), Some("street"));
    }

    #[test]
    fn test_degenerate_orientation_rejected() {
        let mut b = GrammarBuilder::new();
        let c = b.component("c");
        let p = b.position(BlockPos::ZERO);
        b.node(c, "n", p, BlockOrientation::new(Facing::PosY, Facing::PosY), None);

        assert!(matches!(b.build(), Err(GrammarError::InvalidOrientation { .. })));
    }
}
