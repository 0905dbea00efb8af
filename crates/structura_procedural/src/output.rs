//! # Structure Output
//!
//! Blocks written by one generated structure, grouped per 16x16x16 subchunk.
//!
//! ## Representation
//!
//! A subchunk record starts sparse, a list of `(cell index, block)` pairs, and
//! switches to a flat 4096-cell array once a write would push the list past a
//! quarter of the subchunk. Cells never written hold `BlockId::UNDEFINED`.
//!
//! ## Binary Layout
//!
//! ```text
//! "STRO" | version u32 | record count u32
//! per record: origin i32 x3 | kind u8 | payload
//!   kind 0 (sparse): cell count u32 | (index u16, block u16) * count
//!   kind 1 (flat):   block u16 * 4096
//! ```
//!
//! All integers are little-endian. Buffers are LZ4-compressed for storage.

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use structura_core::{BlockId, BlockPos, SUBCHUNK_VOLUME};

use crate::error::{OutputError, OutputResult};

const MAGIC: &[u8; 4] = b"STRO";
const FORMAT_VERSION: u32 = 1;

const KIND_SPARSE: u8 = 0;
const KIND_FLAT: u8 = 1;

/// Sparse list length beyond which a record goes flat.
const FLAT_THRESHOLD: usize = SUBCHUNK_VOLUME / 4;

/// One written cell of a sparse record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SparseCell {
    /// Cell index `x | y << 4 | z << 8`.
    pub index: u16,
    /// Written block.
    pub block: BlockId,
}

/// Blocks written into one subchunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubChunkRecord {
    /// Written cells in write order; later entries win.
    Sparse(Vec<SparseCell>),
    /// One block per cell.
    Flat(Vec<BlockId>),
}

impl Default for SubChunkRecord {
    fn default() -> Self {
        Self::Sparse(Vec::new())
    }
}

impl SubChunkRecord {
    /// Decides the representation for an upcoming write of `volume` cells,
    /// converting to flat if the sparse list would grow too long.
    ///
    /// Returns true if the record is flat afterwards.
    pub fn should_use_flat(&mut self, volume: usize) -> bool {
        match self {
            Self::Flat(_) => true,
            Self::Sparse(cells) => {
                if cells.len() + volume <= FLAT_THRESHOLD {
                    return false;
                }
                let mut flat = vec![BlockId::UNDEFINED; SUBCHUNK_VOLUME];
                for cell in cells.iter() {
                    flat[usize::from(cell.index)] = cell.block;
                }
                *self = Self::Flat(flat);
                true
            }
        }
    }

    /// Writes one cell in the current representation.
    pub fn write(&mut self, index: u16, block: BlockId) {
        match self {
            Self::Flat(flat) => flat[usize::from(index)] = block,
            Self::Sparse(cells) => cells.push(SparseCell { index, block }),
        }
    }

    /// Block at a cell, `UNDEFINED` if never written.
    #[must_use]
    pub fn block_at(&self, index: u16) -> BlockId {
        match self {
            Self::Flat(flat) => flat[usize::from(index)],
            Self::Sparse(cells) => cells
                .iter()
                .rev()
                .find(|c| c.index == index)
                .map_or(BlockId::UNDEFINED, |c| c.block),
        }
    }

    /// True if the record is flat.
    #[must_use]
    pub const fn is_flat(&self) -> bool {
        matches!(self, Self::Flat(_))
    }

    /// Written cells as `(index, block)`. Sparse records may repeat an index.
    pub fn iter(&self) -> SubChunkIter<'_> {
        match self {
            Self::Flat(flat) => SubChunkIter::Flat(flat.iter().enumerate()),
            Self::Sparse(cells) => SubChunkIter::Sparse(cells.iter()),
        }
    }

    /// Bytes used by the record.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Self::Flat(flat) => flat.len() * std::mem::size_of::<BlockId>(),
                Self::Sparse(cells) => cells.len() * std::mem::size_of::<SparseCell>(),
            }
    }
}

/// Iterator over the written cells of a [`SubChunkRecord`].
pub enum SubChunkIter<'a> {
    /// Over a flat record.
    Flat(std::iter::Enumerate<std::slice::Iter<'a, BlockId>>),
    /// Over a sparse record.
    Sparse(std::slice::Iter<'a, SparseCell>),
}

impl Iterator for SubChunkIter<'_> {
    type Item = (u16, BlockId);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Flat(it) => it
                .find(|(_, b)| !b.is_undefined())
                .map(|(i, b)| (i as u16, *b)),
            Self::Sparse(it) => it.next().map(|c| (c.index, c.block)),
        }
    }
}

/// Everything one structure writes, keyed by subchunk origin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureOutput {
    records: BTreeMap<BlockPos, SubChunkRecord>,
}

impl StructureOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of the subchunk at `origin`, created on first use.
    pub fn record_mut(&mut self, origin: BlockPos) -> &mut SubChunkRecord {
        self.records.entry(origin.subchunk_origin()).or_default()
    }

    /// Writes one block at a world position.
    pub fn write_block(&mut self, pos: BlockPos, block: BlockId) {
        let record = self.record_mut(pos.subchunk_origin());
        record.should_use_flat(1);
        record.write(pos.subchunk_index(), block);
    }

    /// Block at a world position, `UNDEFINED` if never written.
    #[must_use]
    pub fn block_at(&self, pos: BlockPos) -> BlockId {
        self.records
            .get(&pos.subchunk_origin())
            .map_or(BlockId::UNDEFINED, |r| r.block_at(pos.subchunk_index()))
    }

    /// Subchunk records in origin order.
    pub fn records(&self) -> impl Iterator<Item = (&BlockPos, &SubChunkRecord)> {
        self.records.iter()
    }

    /// Number of touched subchunks.
    #[must_use]
    pub fn subchunk_count(&self) -> usize {
        self.records.len()
    }

    /// True if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes held by all records.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.records.values().map(SubChunkRecord::memory_size).sum()
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serializes to the binary layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.data_size());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.records.len() as u32).to_le_bytes());

        for (origin, record) in &self.records {
            for v in origin.to_array() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            match record {
                SubChunkRecord::Sparse(cells) => {
                    buf.push(KIND_SPARSE);
                    buf.extend_from_slice(&(cells.len() as u32).to_le_bytes());
                    buf.extend_from_slice(bytemuck::cast_slice::<SparseCell, u8>(cells));
                }
                SubChunkRecord::Flat(flat) => {
                    buf.push(KIND_FLAT);
                    buf.extend_from_slice(bytemuck::cast_slice::<BlockId, u8>(flat));
                }
            }
        }
        buf
    }

    /// Decodes the binary layout.
    ///
    /// # Errors
    ///
    /// Returns an error on a foreign, newer or truncated buffer.
    pub fn from_bytes(data: &[u8]) -> OutputResult<Self> {
        let mut reader = Reader { data, pos: 0 };
        if reader.take(4)? != MAGIC {
            return Err(OutputError::BadMagic);
        }
        let version = reader.u32()?;
        if version != FORMAT_VERSION {
            return Err(OutputError::UnsupportedVersion(version));
        }

        let count = reader.u32()?;
        let mut records = BTreeMap::new();
        for _ in 0..count {
            let origin = BlockPos::new(reader.i32()?, reader.i32()?, reader.i32()?);
            let record = match reader.take(1)?[0] {
                KIND_SPARSE => {
                    let cells = reader.u32()? as usize;
                    let bytes = reader.take(cells * std::mem::size_of::<SparseCell>())?;
                    SubChunkRecord::Sparse(bytemuck::pod_collect_to_vec(bytes))
                }
                KIND_FLAT => {
                    let bytes = reader.take(SUBCHUNK_VOLUME * std::mem::size_of::<BlockId>())?;
                    SubChunkRecord::Flat(bytemuck::pod_collect_to_vec(bytes))
                }
                _ => return Err(OutputError::Truncated),
            };
            records.insert(origin, record);
        }

        Ok(Self { records })
    }

    /// Serializes and LZ4-compresses.
    #[must_use]
    pub fn compress(&self) -> Vec<u8> {
        compress_prepend_size(&self.to_bytes())
    }

    /// Decompresses and decodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame or its content is invalid.
    pub fn decompress(data: &[u8]) -> OutputResult<Self> {
        let bytes = decompress_size_prepended(data).map_err(|e| OutputError::Decompress(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> OutputResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(OutputError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(OutputError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> OutputResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> OutputResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: BlockId = BlockId(7);

    #[test]
    fn test_sparse_until_threshold() {
        let mut record = SubChunkRecord::default();
        assert!(!record.should_use_flat(FLAT_THRESHOLD));
        assert!(record.should_use_flat(FLAT_THRESHOLD + 1));
        assert!(record.is_flat());
    }

    #[test]
    fn test_promotion_keeps_sparse_cells() {
        let mut record = SubChunkRecord::default();
        record.write(5, STONE);
        record.write(5, BlockId::AIR);
        assert!(record.should_use_flat(SUBCHUNK_VOLUME));

        assert_eq!(record.block_at(5), BlockId::AIR);
        assert_eq!(record.block_at(6), BlockId::UNDEFINED);
        assert_eq!(record.iter().collect::<Vec<_>>(), vec![(5, BlockId::AIR)]);
    }

    #[test]
    fn test_write_block_groups_by_subchunk() {
        let mut out = StructureOutput::new();
        out.write_block(BlockPos::new(1, 2, 3), STONE);
        out.write_block(BlockPos::new(-1, 2, 3), STONE);

        assert_eq!(out.subchunk_count(), 2);
        assert_eq!(out.block_at(BlockPos::new(1, 2, 3)), STONE);
        assert_eq!(out.block_at(BlockPos::new(-1, 2, 3)), STONE);
        assert_eq!(out.block_at(BlockPos::new(2, 2, 3)), BlockId::UNDEFINED);
    }

    #[test]
    fn test_compressed_roundtrip_mixed_records() {
        let mut out = StructureOutput::new();
        out.write_block(BlockPos::new(40, 0, 0), STONE);
        let flat = out.record_mut(BlockPos::ZERO);
        flat.should_use_flat(SUBCHUNK_VOLUME);
        flat.write(0, STONE);

        let decoded = StructureOutput::decompress(&out.compress()).expect("decode");
        assert_eq!(decoded, out);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_eq!(StructureOutput::from_bytes(b"NOPE\x01\0\0\0\0\0\0\0"), Err(OutputError::BadMagic));

        let mut bytes = StructureOutput::new().to_bytes();
        bytes[4] = 9;
        assert_eq!(StructureOutput::from_bytes(&bytes), Err(OutputError::UnsupportedVersion(9)));

        let mut out = StructureOutput::new();
        out.write_block(BlockPos::ZERO, STONE);
        let bytes = out.to_bytes();
        assert_eq!(
            StructureOutput::from_bytes(&bytes[..bytes.len() - 1]),
            Err(OutputError::Truncated)
        );
    }
}
