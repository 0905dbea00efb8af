//! # Rules and Expansions
//!
//! A rule is a production with prioritized, weighted candidate expansions.
//! Ordering the candidates is the only algorithm the grammar model owns.

use super::component::ComponentId;
use super::pragma::{self, PragmaValue};
use super::symbol::SymbolInfo;
use crate::hash::{rehash, Seed};

/// Index of a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub u32);

impl RuleId {
    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a rule expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpansionId(pub u32);

impl ExpansionId {
    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What an expansion turns into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpansionTarget {
    /// Nothing; succeeds immediately.
    Void,
    /// Another rule, expanded in place.
    Rule(RuleId),
    /// A component attached by one of its nodes.
    Component {
        /// Component to place.
        component: ComponentId,
        /// Attach only by nodes with this name; any node when `None`.
        node: Option<String>,
    },
}

/// One candidate outcome of a rule.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleExpansion {
    /// Conditions, params and pragmas of the expansion itself.
    pub info: SymbolInfo,
    /// Rule this expansion belongs to.
    pub owner: RuleId,
    /// Outcome.
    pub target: ExpansionTarget,
    /// Place the component mirrored.
    pub mirror: bool,
}

impl RuleExpansion {
    /// `priority` pragma.
    #[must_use]
    pub fn priority(&self) -> f32 {
        let default = if self.target == ExpansionTarget::Void {
            pragma::DEFAULT_VOID_PRIORITY
        } else {
            pragma::DEFAULT_PRIORITY
        };
        self.info.pragmas.number(pragma::PRIORITY).unwrap_or(default)
    }

    /// `probabilityRatio` pragma.
    #[must_use]
    pub fn probability_ratio(&self) -> f32 {
        self.info
            .pragmas
            .number(pragma::PROBABILITY_RATIO)
            .unwrap_or(pragma::DEFAULT_PROBABILITY_RATIO)
    }

    pub(crate) fn apply_default_pragmas(&mut self) {
        let priority = self.priority();
        self.info
            .pragmas
            .set_default(pragma::PRIORITY, PragmaValue::Number(priority));
        self.info.pragmas.set_default(
            pragma::PROBABILITY_RATIO,
            PragmaValue::Number(pragma::DEFAULT_PROBABILITY_RATIO),
        );
    }
}

/// An expansion as seen by candidate ordering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompiledExpansion {
    /// Expansion.
    pub expansion: ExpansionId,
    /// Weight within the tier.
    pub probability_ratio: f32,
    /// Mirror flag of the expansion.
    pub mirror: bool,
}

/// Candidates sharing one priority.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpansionTier {
    /// Priority value of every candidate in the tier.
    pub priority: f32,
    /// Candidates in declaration order.
    pub candidates: Vec<CompiledExpansion>,
    /// Sum of candidate weights.
    pub ratio_sum: f32,
}

/// A grammar production.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// Conditions, params and pragmas.
    pub info: SymbolInfo,
    /// Expansions in declaration order.
    pub expansions: Vec<ExpansionId>,
    /// Compiled tiers, lowest priority value first.
    pub tiers: Vec<ExpansionTier>,
}

impl Rule {
    /// `depthFirstProbability` pragma.
    #[must_use]
    pub fn depth_first_probability(&self) -> f32 {
        self.info
            .pragmas
            .number(pragma::DEPTH_FIRST_PROBABILITY)
            .unwrap_or(pragma::DEFAULT_DEPTH_FIRST_PROBABILITY)
    }

    /// Orders every candidate for one rule entry.
    ///
    /// Tiers come out in priority order. Inside a tier candidates are drawn
    /// without replacement, each draw weighted by `probability_ratio` and
    /// advancing `seed` by one hash step.
    #[must_use]
    pub fn ordered_candidates(&self, mut seed: Seed) -> Vec<CompiledExpansion> {
        let mut ordered = Vec::with_capacity(self.expansions.len());

        for tier in &self.tiers {
            let mut remaining = tier.candidates.clone();
            let mut remaining_sum = tier.ratio_sum;

            while !remaining.is_empty() {
                seed = rehash(seed);
                let point = (seed & 0xffff) as f32 / 65535.0 * remaining_sum;

                let mut accumulated = 0.0;
                let mut pick = remaining.len() - 1;
                for (i, candidate) in remaining.iter().enumerate() {
                    accumulated += candidate.probability_ratio;
                    if point <= accumulated {
                        pick = i;
                        break;
                    }
                }

                let chosen = remaining.remove(pick);
                remaining_sum -= chosen.probability_ratio;
                ordered.push(chosen);
            }
        }

        ordered
    }
}

/// Groups candidates into tiers sorted by priority.
pub(crate) fn compile_tiers(candidates: &[(f32, CompiledExpansion)]) -> Vec<ExpansionTier> {
    let mut tiers: Vec<ExpansionTier> = Vec::new();

    for &(priority, candidate) in candidates {
        match tiers.iter_mut().find(|t| t.priority.total_cmp(&priority).is_eq()) {
            Some(tier) => {
                tier.candidates.push(candidate);
                tier.ratio_sum += candidate.probability_ratio;
            }
            None => tiers.push(ExpansionTier {
                priority,
                candidates: vec![candidate],
                ratio_sum: candidate.probability_ratio,
            }),
        }
    }

    tiers.sort_by(|a, b| a.priority.total_cmp(&b.priority));
    tiers
}
