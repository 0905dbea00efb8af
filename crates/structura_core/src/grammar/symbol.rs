//! Attributes shared by every grammar symbol.

use super::field::{FieldId, ValueType};
use super::pragma::Pragmas;

/// A parameter the symbol accepts from its parent.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDeclare {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    pub ty: ValueType,
    /// Value used when no parent supplies one.
    pub default: Option<FieldId>,
    /// Placeholder field that reads the bound value.
    pub placeholder: FieldId,
}

/// A parameter the symbol passes on to its children.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSet {
    /// Parameter name.
    pub name: String,
    /// Type of `value`.
    pub ty: ValueType,
    /// Field evaluated in the setting symbol's context.
    pub value: FieldId,
}

/// Name, conditions, parameters and pragmas of a rule, expansion or component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolInfo {
    /// Human-readable name.
    pub name: String,
    /// Bool fields that must all hold at the context's sample point.
    pub conditions: Vec<FieldId>,
    /// Declared input parameters.
    pub params: Vec<ParamDeclare>,
    /// Output parameter assignments.
    pub param_sets: Vec<ParamSet>,
    /// Named options.
    pub pragmas: Pragmas,
}

impl SymbolInfo {
    /// Creates an empty symbol.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declared parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamDeclare> {
        self.params.iter().find(|p| p.name == name)
    }
}
