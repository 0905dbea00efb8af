//! # Fields
//!
//! Typed value definitions sampled at block positions. A field is either a
//! leaf (constant, position, random, parameter placeholder, provider-backed)
//! or a composite over earlier fields.

use std::fmt;

use crate::block::BlockId;

/// Index of a field in the grammar's field table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u32);

impl FieldId {
    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a field served by an external `FieldProvider`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExternalId(pub u32);

/// Value type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// Scalar.
    Float,
    /// Boolean.
    Bool,
    /// Three-component vector.
    Float3,
    /// Block identifier.
    Block,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Float3 => "float3",
            Self::Block => "block",
        };
        f.write_str(name)
    }
}

/// One sampled value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    /// Scalar.
    Float(f32),
    /// Boolean.
    Bool(bool),
    /// Vector.
    Float3([f32; 3]),
    /// Block.
    Block(BlockId),
}

impl Sample {
    /// Type of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Float(_) => ValueType::Float,
            Self::Bool(_) => ValueType::Bool,
            Self::Float3(_) => ValueType::Float3,
            Self::Block(_) => ValueType::Block,
        }
    }

    /// Scalar view; non-scalars read as zero.
    #[must_use]
    pub fn as_float(&self) -> f32 {
        match *self {
            Self::Float(v) => v,
            Self::Bool(b) => f32::from(u8::from(b)),
            Self::Float3(v) => v[0],
            Self::Block(b) => f32::from(b.0),
        }
    }

    /// Boolean view; scalars are true when non-zero.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match *self {
            Self::Bool(b) => b,
            Self::Float(v) => v != 0.0,
            Self::Float3(_) | Self::Block(_) => false,
        }
    }

    /// Vector view; scalars are splatted.
    #[must_use]
    pub fn as_float3(&self) -> [f32; 3] {
        match *self {
            Self::Float3(v) => v,
            other => [other.as_float(); 3],
        }
    }

    /// Block view; anything else is undefined.
    #[must_use]
    pub const fn as_block(&self) -> BlockId {
        match *self {
            Self::Block(b) => b,
            _ => BlockId::UNDEFINED,
        }
    }

    /// Applies an arithmetic operator, broadcasting scalars over vectors.
    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        match (lhs, rhs) {
            (Self::Float(a), Self::Float(b)) => Self::Float(op.apply(a, b)),
            (a, b) => {
                let (a, b) = (a.as_float3(), b.as_float3());
                Self::Float3([op.apply(a[0], b[0]), op.apply(a[1], b[1]), op.apply(a[2], b[2])])
            }
        }
    }
}

/// Whether a field changes with position.
///
/// `Constant < Varying`, so the dimensionality of a composite is the maximum
/// over its inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimensionality {
    /// Same value everywhere in a context.
    Constant,
    /// Depends on the sample position.
    Varying,
}

/// Arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
}

impl BinaryOp {
    /// Applies the operator to scalars.
    #[inline]
    #[must_use]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    /// Compares two samples. Blocks compare by ID, everything else as scalars.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn apply(self, lhs: Sample, rhs: Sample) -> bool {
        let (a, b) = match (lhs, rhs) {
            (Sample::Block(a), Sample::Block(b)) => (f32::from(a.0), f32::from(b.0)),
            (a, b) => (a.as_float(), b.as_float()),
        };
        match self {
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Eq => a == b,
            Self::Ne => a != b,
        }
    }
}

/// Vector component selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// First component.
    X,
    /// Second component.
    Y,
    /// Third component.
    Z,
}

impl Axis {
    /// Component index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// How a field computes its value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// Fixed value.
    Const(Sample),
    /// The world position being sampled.
    WorldPosition,
    /// The sampled position in the context's local frame.
    LocalPosition,
    /// Uniform `[0, 1)` drawn once per data context.
    ContextRandom {
        /// Decorrelates several random fields in one context.
        salt: u32,
    },
    /// Uniform `[0, 1)` drawn per world block.
    BlockRandom {
        /// Decorrelates several random fields.
        salt: u32,
    },
    /// Placeholder bound to a declared parameter.
    Param {
        /// Parameter name.
        name: String,
    },
    /// Served by the external field provider.
    External(ExternalId),
    /// Arithmetic.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: FieldId,
        /// Right operand.
        rhs: FieldId,
    },
    /// Comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        lhs: FieldId,
        /// Right operand.
        rhs: FieldId,
    },
    /// Logical and.
    And(FieldId, FieldId),
    /// Logical or.
    Or(FieldId, FieldId),
    /// Logical not.
    Not(FieldId),
    /// `if condition { then } else { otherwise }`
    Select {
        /// Bool selector.
        condition: FieldId,
        /// Value when true.
        then: FieldId,
        /// Value when false.
        otherwise: FieldId,
    },
    /// Builds a vector from three scalars.
    Vector([FieldId; 3]),
    /// Extracts one vector component.
    Axis {
        /// Source vector.
        vector: FieldId,
        /// Component.
        axis: Axis,
    },
}

impl FieldKind {
    /// Input fields of a composite.
    #[must_use]
    pub fn inputs(&self) -> Vec<FieldId> {
        match *self {
            Self::Binary { lhs, rhs, .. } | Self::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            Self::And(a, b) | Self::Or(a, b) => vec![a, b],
            Self::Not(a) => vec![a],
            Self::Select {
                condition,
                then,
                otherwise,
            } => vec![condition, then, otherwise],
            Self::Vector(v) => v.to_vec(),
            Self::Axis { vector, .. } => vec![vector],
            Self::Const(_)
            | Self::WorldPosition
            | Self::LocalPosition
            | Self::ContextRandom { .. }
            | Self::BlockRandom { .. }
            | Self::Param { .. }
            | Self::External(_) => Vec::new(),
        }
    }

    /// True for leaves that read the data context.
    #[must_use]
    pub const fn reads_context(&self) -> bool {
        matches!(
            self,
            Self::LocalPosition | Self::ContextRandom { .. } | Self::Param { .. }
        )
    }
}

/// A field table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    /// Result type.
    pub ty: ValueType,
    /// Computation.
    pub kind: FieldKind,
    /// Memoized per data context rather than in the shared value cache.
    pub contextual: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_broadcasts_scalar() {
        let v = Sample::binary(BinaryOp::Mul, Sample::Float3([1.0, 2.0, 3.0]), Sample::Float(2.0));
        assert_eq!(v, Sample::Float3([2.0, 4.0, 6.0]));

        let s = Sample::binary(BinaryOp::Sub, Sample::Float(1.0), Sample::Float(3.0));
        assert_eq!(s, Sample::Float(-2.0));
    }

    #[test]
    fn test_compare_blocks_by_id() {
        let a = Sample::Block(BlockId(5));
        assert!(CompareOp::Eq.apply(a, Sample::Block(BlockId(5))));
        assert!(CompareOp::Lt.apply(a, Sample::Block(BlockId(6))));
    }

    #[test]
    fn test_dimensionality_order() {
        assert_eq!(
            Dimensionality::Constant.max(Dimensionality::Varying),
            Dimensionality::Varying
        );
    }
}
