//! Named numeric/boolean options attached to grammar symbols.

use std::collections::BTreeMap;

/// Rule pragma: chance that a new rule entry is explored depth-first.
pub const DEPTH_FIRST_PROBABILITY: &str = "depthFirstProbability";
/// Expansion pragma: tier, lower is tried first.
pub const PRIORITY: &str = "priority";
/// Expansion pragma: relative weight within a tier.
pub const PROBABILITY_RATIO: &str = "probabilityRatio";
/// Node pragma: generate the four rotations around the up axis.
pub const ALLOW_ROTATION: &str = "allowRotation";
/// Node pragma: attached fragment starts one block out.
pub const ADJACENT: &str = "adjacent";
/// Node pragma: horizontal pivot on the block edge.
pub const HORIZONTAL_EDGE: &str = "horizontalEdge";
/// Node pragma: vertical pivot on the block edge.
pub const VERTICAL_EDGE: &str = "verticalEdge";

/// Default `depthFirstProbability`.
pub const DEFAULT_DEPTH_FIRST_PROBABILITY: f32 = 0.5;
/// Default `priority` of a non-void expansion.
pub const DEFAULT_PRIORITY: f32 = 1.0;
/// Default `priority` of a void expansion, so giving up sorts last.
pub const DEFAULT_VOID_PRIORITY: f32 = 9999.0;
/// Default `probabilityRatio`.
pub const DEFAULT_PROBABILITY_RATIO: f32 = 100.0;

/// A pragma value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PragmaValue {
    /// Numeric option.
    Number(f32),
    /// Boolean option.
    Bool(bool),
}

/// Pragmas of one symbol, ordered by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pragmas(BTreeMap<String, PragmaValue>);

impl Pragmas {
    /// Sets a pragma, replacing any previous value.
    pub fn set(&mut self, name: &str, value: PragmaValue) {
        self.0.insert(name.to_owned(), value);
    }

    /// Sets a pragma only if it is absent.
    pub fn set_default(&mut self, name: &str, value: PragmaValue) {
        self.0.entry(name.to_owned()).or_insert(value);
    }

    /// Raw lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PragmaValue> {
        self.0.get(name).copied()
    }

    /// Numeric lookup; `None` if absent or boolean.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            PragmaValue::Number(v) => Some(v),
            PragmaValue::Bool(_) => None,
        }
    }

    /// Boolean lookup; `None` if absent or numeric.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PragmaValue::Bool(v) => Some(v),
            PragmaValue::Number(_) => None,
        }
    }

    /// True if `name` is set to something other than a number.
    #[must_use]
    pub fn is_non_number(&self, name: &str) -> bool {
        matches!(self.get(name), Some(PragmaValue::Bool(_)))
    }

    /// True if `name` is set to something other than a boolean.
    #[must_use]
    pub fn is_non_flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(PragmaValue::Number(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_does_not_override() {
        let mut p = Pragmas::default();
        p.set(PRIORITY, PragmaValue::Number(0.0));
        p.set_default(PRIORITY, PragmaValue::Number(DEFAULT_PRIORITY));
        p.set_default(PROBABILITY_RATIO, PragmaValue::Number(DEFAULT_PROBABILITY_RATIO));

        assert_eq!(p.number(PRIORITY), Some(0.0));
        assert_eq!(p.number(PROBABILITY_RATIO), Some(100.0));
        assert_eq!(p.flag(PRIORITY), None);
    }
}
