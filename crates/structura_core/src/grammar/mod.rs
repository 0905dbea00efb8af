//! # Grammar Model
//!
//! Immutable compiled representation of rules, expansions, components and
//! fields. Built once with [`GrammarBuilder`], then shared read-only by every
//! generator (typically behind an `Arc`).
//!
//! ## Symbols
//!
//! | Symbol      | Owns                                   |
//! |-------------|----------------------------------------|
//! | `Rule`      | conditions, tiers of weighted expansions |
//! | `Expansion` | one outcome: void, rule or component   |
//! | `Component` | nodes, areas, block fills              |

mod builder;
mod component;
mod field;
pub mod pragma;
mod rule;
mod symbol;

use std::collections::HashMap;

pub use builder::GrammarBuilder;
pub use component::{AreaSpec, BlockSpec, Component, ComponentId, ComponentNode, OverlapPolicy};
pub use field::{
    Axis, BinaryOp, CompareOp, Dimensionality, ExternalId, FieldDef, FieldId, FieldKind, Sample,
    ValueType,
};
pub use pragma::{PragmaValue, Pragmas};
pub use rule::{
    CompiledExpansion, ExpansionId, ExpansionTarget, ExpansionTier, Rule, RuleExpansion, RuleId,
};
pub use symbol::{ParamDeclare, ParamSet, SymbolInfo};

/// Reference to any symbol that owns a data context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    /// A rule.
    Rule(RuleId),
    /// A rule expansion.
    Expansion(ExpansionId),
    /// A component.
    Component(ComponentId),
}

/// A compiled grammar.
#[derive(Clone, Debug)]
pub struct Grammar {
    pub(crate) rules: Vec<Rule>,
    pub(crate) expansions: Vec<RuleExpansion>,
    pub(crate) components: Vec<Component>,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) area_names: Vec<String>,
    pub(crate) rule_index: HashMap<String, RuleId>,
    pub(crate) component_index: HashMap<String, ComponentId>,
}

impl Grammar {
    /// Rule by ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID belongs to another grammar.
    #[inline]
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// Expansion by ID.
    #[inline]
    #[must_use]
    pub fn expansion(&self, id: ExpansionId) -> &RuleExpansion {
        &self.expansions[id.index()]
    }

    /// Component by ID.
    #[inline]
    #[must_use]
    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.index()]
    }

    /// Field by ID.
    #[inline]
    #[must_use]
    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    /// Conditions, params and pragmas of any context-owning symbol.
    #[must_use]
    pub fn symbol(&self, symbol: SymbolRef) -> &SymbolInfo {
        match symbol {
            SymbolRef::Rule(id) => &self.rule(id).info,
            SymbolRef::Expansion(id) => &self.expansion(id).info,
            SymbolRef::Component(id) => &self.component(id).info,
        }
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn find_rule(&self, name: &str) -> Option<RuleId> {
        self.rule_index.get(name).copied()
    }

    /// Looks up a component by name.
    #[must_use]
    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.component_index.get(name).copied()
    }

    /// Name of an interned area.
    #[must_use]
    pub fn area_name(&self, name_id: u32) -> Option<&str> {
        self.area_names.get(name_id as usize).map(String::as_str)
    }

    /// Number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Number of components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
