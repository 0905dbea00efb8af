//! # Components
//!
//! Placeable fragments: attachment nodes, constraint areas, block fills.

use super::field::FieldId;
use super::pragma::{self, PragmaValue, Pragmas};
use super::rule::RuleId;
use super::symbol::SymbolInfo;
use crate::math::{BlockOrientation, BlockPos};

/// Index of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// An attachment point.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentNode {
    /// Node name; several nodes may share one.
    pub name: String,
    /// Float3 position in component space.
    pub position: FieldId,
    /// Facing of the node.
    pub orientation: BlockOrientation,
    /// Rule expanded from this node once the component is placed.
    pub rule: Option<RuleId>,
    /// `allowRotation`, `adjacent`, `horizontalEdge`, `verticalEdge`.
    pub pragmas: Pragmas,
}

impl ComponentNode {
    /// `allowRotation` pragma.
    #[must_use]
    pub fn allow_rotation(&self) -> bool {
        self.pragmas.flag(pragma::ALLOW_ROTATION).unwrap_or(true)
    }

    /// `adjacent` pragma.
    #[must_use]
    pub fn adjacent(&self) -> bool {
        self.pragmas.flag(pragma::ADJACENT).unwrap_or(false)
    }

    /// `horizontalEdge` pragma.
    #[must_use]
    pub fn horizontal_edge(&self) -> bool {
        self.pragmas.flag(pragma::HORIZONTAL_EDGE).unwrap_or(false)
    }

    /// `verticalEdge` pragma.
    #[must_use]
    pub fn vertical_edge(&self) -> bool {
        self.pragmas.flag(pragma::VERTICAL_EDGE).unwrap_or(false)
    }

    pub(crate) fn apply_default_pragmas(&mut self) {
        self.pragmas
            .set_default(pragma::ALLOW_ROTATION, PragmaValue::Bool(true));
        for name in [pragma::ADJACENT, pragma::HORIZONTAL_EDGE, pragma::VERTICAL_EDGE] {
            self.pragmas.set_default(name, PragmaValue::Bool(false));
        }
    }
}

/// How an area relates to earlier areas of the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverlapPolicy {
    /// Not checked.
    MayOverlap,
    /// Placement fails if it overlaps.
    MustNotOverlap,
    /// Placement fails unless it overlaps.
    MustOverlap,
}

/// A named box in component space.
#[derive(Clone, Debug, PartialEq)]
pub struct AreaSpec {
    /// Area name.
    pub name: String,
    /// Interned name, assigned at build.
    pub name_id: u32,
    /// Float3 corner.
    pub start: FieldId,
    /// Float3 opposite corner (inclusive).
    pub end: FieldId,
    /// Overlap rule.
    pub policy: OverlapPolicy,
    /// Checked, never recorded.
    pub virtual_only: bool,
}

/// A block fill.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockSpec {
    /// Block-typed field.
    pub block: FieldId,
    /// Float3 box corner.
    pub start: Option<FieldId>,
    /// Float3 opposite corner; a single cell when `None`.
    pub end: Option<FieldId>,
    /// Explicit positions in component space.
    pub positions: Vec<BlockPos>,
    /// Shift `positions` by the `start` value.
    pub positions_offset: bool,
}

/// A placeable structure fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    /// Conditions, params and pragmas.
    pub info: SymbolInfo,
    /// Attachment points.
    pub nodes: Vec<ComponentNode>,
    /// Constraint areas.
    pub areas: Vec<AreaSpec>,
    /// Block fills.
    pub blocks: Vec<BlockSpec>,
}

impl Component {
    /// Indices of nodes named `name`, or of all nodes.
    #[must_use]
    pub fn nodes_named(&self, name: Option<&str>) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| name.map_or(true, |name| n.name == name))
            .map(|(i, _)| i)
            .collect()
    }
}
