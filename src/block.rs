// Copyright (C) 2019-2023, Cloudflare, Inc.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The coding block: source and repair symbols for one FEC group, indexed
//! by block number and intra-block offset.

use smallvec::SmallVec;

use crate::symbol::Symbol;
use crate::Error;
use crate::Result;

/// A handful of block offsets — missing or recovered — almost always fits
/// in a handful of slots (a single loss is the common case), so this
/// avoids a heap allocation for the typical block.
pub type Offsets = SmallVec<[u8; 4]>;

/// Highest offset a symbol can take within a block (offsets are `u8`).
pub const MAX_BLOCK_OFFSET: u8 = 0xFF;

/// Number of slots reserved per side of a block; caps per-block memory at
/// `2 * MAX_BLOCK_SYMBOLS * E`.
pub const MAX_BLOCK_SYMBOLS: usize = MAX_BLOCK_OFFSET as usize + 1;

/// Identifies a block; only the low 24 bits are ever significant on the
/// wire.
pub type BlockNumber = u32;

/// `(block_number, block_offset)`, locating a source symbol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockSourceID {
    pub block_number: BlockNumber,
    pub offset: u8,
}

impl BlockSourceID {
    pub fn new(block_number: BlockNumber, offset: u8) -> Self {
        BlockSourceID { block_number, offset }
    }

    /// The ID one offset past this one, in the same block.
    pub fn next_offset(self) -> Result<BlockSourceID> {
        if self.offset == MAX_BLOCK_OFFSET {
            return Err(Error::OffsetOverflow);
        }

        Ok(BlockSourceID {
            block_number: self.block_number,
            offset: self.offset + 1,
        })
    }

    /// Encodes the 4-byte wire form: 3-byte big-endian block number, 1-byte
    /// offset.
    pub fn to_bytes(self) -> [u8; 4] {
        let n = self.block_number.to_be_bytes();
        [n[1], n[2], n[3], self.offset]
    }

    pub fn from_bytes(b: [u8; 4]) -> Self {
        let block_number = u32::from_be_bytes([0, b[0], b[1], b[2]]);
        BlockSourceID { block_number, offset: b[3] }
    }
}

/// `(fec_scheme_specific, BlockSourceID)`, locating a repair symbol. The
/// scheme-specific bytes are opaque to the framework.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockRepairID {
    pub scheme_specific: [u8; 4],
    pub source: BlockSourceID,
}

impl BlockRepairID {
    pub fn new(block_number: BlockNumber, offset: u8) -> Self {
        BlockRepairID {
            scheme_specific: [0; 4],
            source: BlockSourceID::new(block_number, offset),
        }
    }

    /// Encodes the 8-byte wire form.
    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.scheme_specific);
        out[4..].copy_from_slice(&self.source.to_bytes());
        out
    }

    pub fn from_bytes(b: [u8; 8]) -> Self {
        let mut scheme_specific = [0u8; 4];
        scheme_specific.copy_from_slice(&b[..4]);
        let mut src = [0u8; 4];
        src.copy_from_slice(&b[4..]);
        BlockRepairID {
            scheme_specific,
            source: BlockSourceID::from_bytes(src),
        }
    }
}

/// A coding block: source and repair symbols for one FEC group.
///
/// Both sides are fixed-capacity `Option<Symbol>` slots indexed by offset,
/// so gaps (symbols not yet received) are just `None` — no allocation is
/// needed per symbol beyond the symbol data itself, and offset lookups are
/// O(1) rather than going through a hash map.
pub struct Block {
    number: BlockNumber,
    source: Box<[Option<Symbol>; MAX_BLOCK_SYMBOLS]>,
    repair: Box<[Option<Symbol>; MAX_BLOCK_SYMBOLS]>,
    source_high_water: usize,
    repair_high_water: usize,
    present_source: usize,
    present_repair: usize,
    total_source: Option<u32>,
    total_repair: Option<u32>,
    closed: bool,
}

impl Block {
    pub fn new(number: BlockNumber) -> Self {
        Block {
            number,
            source: Box::new(std::array::from_fn(|_| None)),
            repair: Box::new(std::array::from_fn(|_| None)),
            source_high_water: 0,
            repair_high_water: 0,
            present_source: 0,
            present_repair: 0,
            total_source: None,
            total_repair: None,
            closed: false,
        }
    }

    pub fn number(&self) -> BlockNumber {
        self.number
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Appends a source symbol at the next offset, auto-assigning it.
    /// Used by the sender, which only ever appends in order.
    pub fn add_source(&mut self, symbol: Symbol) -> Result<BlockSourceID> {
        if self.source_high_water >= MAX_BLOCK_SYMBOLS {
            return Err(Error::OffsetOverflow);
        }

        let offset = self.source_high_water as u8;
        self.source[offset as usize] = Some(symbol);
        self.source_high_water += 1;
        self.present_source += 1;

        Ok(BlockSourceID::new(self.number, offset))
    }

    /// Places a source symbol at a specific offset, growing the sparse
    /// array with holes if needed. Idempotent: placing at an
    /// already-filled offset just replaces the symbol without double
    /// counting.
    pub fn set_source(&mut self, offset: u8, symbol: Symbol) {
        let idx = offset as usize;
        if self.source[idx].is_none() {
            self.present_source += 1;
        }
        self.source[idx] = Some(symbol);
        self.source_high_water = self.source_high_water.max(idx + 1);
    }

    pub fn set_repair(&mut self, offset: u8, symbol: Symbol) {
        let idx = offset as usize;
        if self.repair[idx].is_none() {
            self.present_repair += 1;
        }
        self.repair[idx] = Some(symbol);
        self.repair_high_water = self.repair_high_water.max(idx + 1);
    }

    pub fn present_source(&self) -> usize {
        self.present_source
    }

    pub fn present_repair(&self) -> usize {
        self.present_repair
    }

    pub fn total_source(&self) -> Option<u32> {
        self.total_source
    }

    pub fn total_repair(&self) -> Option<u32> {
        self.total_repair
    }

    /// Sets the authoritative totals, as learned from closing the block
    /// (sender) or from a repair frame's metadata (receiver).
    pub fn set_totals(&mut self, total_source: u32, total_repair: u32) {
        self.total_source = Some(total_source);
        self.total_repair = Some(total_repair);
    }

    /// Freezes the block: the sender calls this once the redundancy
    /// controller triggers closure, passing the number of repair symbols
    /// the scheme will generate for it. Neither array grows afterward.
    ///
    /// `total_repair` is a parameter rather than `present_repair` because
    /// the sender's own block never holds repair symbols — it only ever
    /// holds source symbols; `generate_repair` reads them and returns fresh
    /// repair symbols without writing them back. `present_repair` is
    /// therefore always 0 here and would otherwise freeze a wrong total
    /// into the wire metadata.
    pub fn close(&mut self, total_repair: u32) {
        self.total_source = Some(self.present_source as u32);
        self.total_repair = Some(total_repair);
        self.closed = true;
    }

    /// Logical length of the dense source array: `total_source` once
    /// known, otherwise the high-water mark of offsets touched so far.
    pub fn source_len(&self) -> usize {
        self.total_source.map(|t| t as usize).unwrap_or(self.source_high_water)
    }

    pub fn repair_len(&self) -> usize {
        self.total_repair.map(|t| t as usize).unwrap_or(self.repair_high_water)
    }

    pub fn source_slice(&self) -> &[Option<Symbol>] {
        &self.source[..self.source_len()]
    }

    pub fn source_slice_mut(&mut self) -> &mut [Option<Symbol>] {
        let len = self.source_len();
        &mut self.source[..len]
    }

    pub fn repair_slice(&self) -> &[Option<Symbol>] {
        &self.repair[..self.repair_len()]
    }

    /// Whether the block is fully complete: every source and repair
    /// symbol promised by its totals has arrived.
    pub fn is_complete(&self) -> bool {
        match (self.total_source, self.total_repair) {
            (Some(ts), Some(tr)) => {
                self.present_source == ts as usize && self.present_repair == tr as usize
            },
            _ => false,
        }
    }

    /// Offsets in `[0, source_len)` with no symbol present, ascending.
    pub fn missing_source_offsets(&self) -> Offsets {
        self.source_slice()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_round_trips_through_bytes() {
        let id = BlockSourceID::new(0x00AB_CDEF & 0x00FF_FFFF, 7);
        assert_eq!(BlockSourceID::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn repair_id_round_trips_through_bytes() {
        let id = BlockRepairID {
            scheme_specific: [1, 2, 3, 4],
            source: BlockSourceID::new(42, 9),
        };
        assert_eq!(BlockRepairID::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn next_offset_overflows_at_max() {
        let id = BlockSourceID::new(0, MAX_BLOCK_OFFSET);
        assert_eq!(id.next_offset(), Err(Error::OffsetOverflow));
    }

    #[test]
    fn add_source_assigns_increasing_offsets() {
        let mut block = Block::new(0);
        let a = block.add_source(vec![0u8; 4].into_boxed_slice()).unwrap();
        let b = block.add_source(vec![0u8; 4].into_boxed_slice()).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 1);
        assert_eq!(block.present_source(), 2);
    }

    #[test]
    fn set_source_grows_sparse_array_with_holes() {
        let mut block = Block::new(0);
        block.set_source(3, vec![1u8; 4].into_boxed_slice());
        assert_eq!(block.present_source(), 1);
        assert_eq!(block.source_high_water, 4);
        assert!(block.source[0].is_none());
        assert!(block.source[3].is_some());
    }

    #[test]
    fn set_source_is_idempotent_on_count() {
        let mut block = Block::new(0);
        block.set_source(0, vec![1u8; 4].into_boxed_slice());
        block.set_source(0, vec![2u8; 4].into_boxed_slice());
        assert_eq!(block.present_source(), 1);
    }

    #[test]
    fn close_freezes_totals() {
        let mut block = Block::new(0);
        block.add_source(vec![0u8; 4].into_boxed_slice()).unwrap();
        block.close(1);
        assert_eq!(block.total_source(), Some(1));
        assert_eq!(block.total_repair(), Some(1));
    }
}
