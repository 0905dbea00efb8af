//! # Data Records
//!
//! The unit of field memoization: the samples of one field over one spatial
//! key. A record is either uniform (one sample, broadcast to every cell) or
//! holds one sample per cell of a subchunk.

use structura_core::{BlockPos, FieldId, Sample, SUBCHUNK_VOLUME};

/// Spatial extent of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubKey {
    /// A single position.
    Point,
    /// The 16x16x16 subchunk whose origin is the record origin.
    SubChunk,
}

/// Identity of a memoized record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Field the record samples.
    pub field: FieldId,
    /// Sample position or subchunk origin.
    pub origin: BlockPos,
    /// Extent.
    pub sub_key: SubKey,
}

impl RecordKey {
    /// Key of a spatially constant field.
    #[must_use]
    pub const fn constant(field: FieldId) -> Self {
        Self {
            field,
            origin: BlockPos::ZERO,
            sub_key: SubKey::Point,
        }
    }

    /// Key of a single sample.
    #[must_use]
    pub const fn point(field: FieldId, pos: BlockPos) -> Self {
        Self {
            field,
            origin: pos,
            sub_key: SubKey::Point,
        }
    }

    /// Key of a subchunk; `origin` is rounded down to the subchunk grid.
    #[must_use]
    pub const fn subchunk(field: FieldId, origin: BlockPos) -> Self {
        Self {
            field,
            origin: origin.subchunk_origin(),
            sub_key: SubKey::SubChunk,
        }
    }

    /// Number of cells this key covers.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        match self.sub_key {
            SubKey::Point => 1,
            SubKey::SubChunk => SUBCHUNK_VOLUME,
        }
    }
}

/// Computed samples of one field.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRecord {
    samples: Box<[Sample]>,
}

impl DataRecord {
    /// A record with the same value everywhere.
    #[must_use]
    pub fn uniform(sample: Sample) -> Self {
        Self {
            samples: Box::new([sample]),
        }
    }

    /// A record with one sample per cell.
    #[must_use]
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        debug_assert!(!samples.is_empty());
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    /// Builds a record of `len` cells from a per-cell function.
    pub fn from_fn(len: usize, f: impl FnMut(usize) -> Sample) -> Self {
        Self::from_samples((0..len).map(f).collect())
    }

    /// Sample of cell `index`; uniform records answer every index.
    #[inline]
    #[must_use]
    pub fn at(&self, index: usize) -> Sample {
        if self.samples.len() == 1 {
            self.samples[0]
        } else {
            self.samples[index]
        }
    }

    /// True if one sample covers every cell.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.samples.len() == 1
    }

    /// Number of stored samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; records hold at least one sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes charged against the value cache.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.samples.len() * std::mem::size_of::<Sample>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_broadcasts() {
        let r = DataRecord::uniform(Sample::Float(2.5));
        assert!(r.is_uniform());
        assert_eq!(r.at(0), Sample::Float(2.5));
        assert_eq!(r.at(4095), Sample::Float(2.5));
    }

    #[test]
    fn test_subchunk_key_snaps_origin() {
        let key = RecordKey::subchunk(FieldId(3), BlockPos::new(17, -1, 40));
        assert_eq!(key.origin, BlockPos::new(16, -16, 32));
        assert_eq!(key.cell_count(), SUBCHUNK_VOLUME);
    }

    #[test]
    fn test_memory_size_grows_with_cells() {
        let small = DataRecord::uniform(Sample::Bool(true));
        let large = DataRecord::from_fn(SUBCHUNK_VOLUME, |i| Sample::Float(i as f32));
        assert!(large.memory_size() > small.memory_size() * 1000);
    }
}
