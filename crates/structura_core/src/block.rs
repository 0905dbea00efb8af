//! # Block IDs
//!
//! Numeric block identifiers and subchunk geometry.
//!
//! Mapping string block names to IDs is the caller's job. Two IDs are
//! reserved: `0` is air and `1` marks a cell the generator must not write.

use bytemuck::{Pod, Zeroable};

use crate::math::BlockPos;

/// Subchunk edge length in blocks.
pub const SUBCHUNK_SIZE: i32 = 16;

/// Blocks per subchunk.
pub const SUBCHUNK_VOLUME: usize = 4096;

/// A numeric block identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    /// Air.
    pub const AIR: Self = Self(0);
    /// Unset: never written to the output.
    pub const UNDEFINED: Self = Self(1);

    /// Returns true for the reserved "do not write" ID.
    #[inline]
    #[must_use]
    pub const fn is_undefined(self) -> bool {
        self.0 == Self::UNDEFINED.0
    }
}

impl BlockPos {
    /// Origin of the subchunk containing this position.
    #[inline]
    #[must_use]
    pub const fn subchunk_origin(self) -> Self {
        Self::new(self.x & !15, self.y & !15, self.z & !15)
    }

    /// Index of this position inside its subchunk: `x | y << 4 | z << 8`.
    #[inline]
    #[must_use]
    pub const fn subchunk_index(self) -> u16 {
        ((self.x & 15) | ((self.y & 15) << 4) | ((self.z & 15) << 8)) as u16
    }
}

/// Local offset of a subchunk cell index.
#[inline]
#[must_use]
pub const fn cell_offset(index: usize) -> BlockPos {
    BlockPos::new(
        (index & 15) as i32,
        ((index >> 4) & 15) as i32,
        ((index >> 8) & 15) as i32,
    )
}
