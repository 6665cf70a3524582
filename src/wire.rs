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

//! Wire encoding for the three FEC frame types, built on [`octets`] the same
//! way the rest of quiche encodes its frames: a type byte followed by
//! VarInt-prefixed fields.

use crate::block::BlockRepairID;
use crate::block::BlockSourceID;
use crate::Error;
use crate::Result;

/// Accompanies protected packets; carries the source symbol's location so
/// the receiver can place it in the right block at the right offset.
pub const FRAME_TYPE_FEC_SRC_FPI: u64 = 0x21;

/// Carries one or more repair symbols plus the totals needed to recognize
/// block completion.
pub const FRAME_TYPE_REPAIR: u64 = 0x22;

/// Tells the peer which source symbols no longer need retransmitting
/// because the local FEC recovered them.
pub const FRAME_TYPE_RECOVERED: u64 = 0x23;

/// `FEC_SRC_FPI`: `BlockSourceID` (4 bytes), attached to a protected packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceFpiFrame {
    pub id: BlockSourceID,
}

impl SourceFpiFrame {
    pub fn to_bytes(self, out: &mut octets::OctetsMut) -> Result<usize> {
        let before = out.cap();
        out.put_varint(FRAME_TYPE_FEC_SRC_FPI)?;
        out.put_bytes(&self.id.to_bytes())?;
        Ok(before - out.cap())
    }

    pub fn from_bytes(b: &mut octets::Octets) -> Result<SourceFpiFrame> {
        let bytes = b.get_bytes(4)?;
        let mut id = [0u8; 4];
        id.copy_from_slice(bytes.buf());
        Ok(SourceFpiFrame { id: BlockSourceID::from_bytes(id) })
    }

    /// Encoded length, type byte included.
    pub fn wire_len(&self) -> usize {
        octets::varint_len(FRAME_TYPE_FEC_SRC_FPI) + 4
    }
}

/// `REPAIR`: metadata plus one or more repair symbols for a single block.
///
/// Wire layout after the type byte:
/// `VarInt(total_source) || VarInt(total_repair) || BlockRepairID(8B) ||
/// VarInt(n_symbols) || symbols[n_symbols * E]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairFrame {
    pub total_source: u32,
    pub total_repair: u32,
    pub id: BlockRepairID,
    pub symbols: Vec<Vec<u8>>,
}

impl RepairFrame {
    pub fn to_bytes(&self, out: &mut octets::OctetsMut) -> Result<usize> {
        if self.symbols.is_empty() {
            return Err(Error::ZeroSymbols);
        }

        let before = out.cap();
        out.put_varint(FRAME_TYPE_REPAIR)?;
        out.put_varint(self.total_source as u64)?;
        out.put_varint(self.total_repair as u64)?;
        out.put_bytes(&self.id.to_bytes())?;
        out.put_varint(self.symbols.len() as u64)?;
        for symbol in &self.symbols {
            out.put_bytes(symbol)?;
        }
        Ok(before - out.cap())
    }

    /// Decodes a `REPAIR` frame, given the negotiated symbol size `E`.
    pub fn from_bytes(b: &mut octets::Octets, symbol_size: u16) -> Result<RepairFrame> {
        let total_source = b.get_varint()?;
        let total_repair = b.get_varint()?;

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(b.get_bytes(8)?.buf());
        let id = BlockRepairID::from_bytes(id_bytes);

        let n_symbols = b.get_varint()?;
        if n_symbols == 0 {
            return Err(Error::ZeroSymbols);
        }

        let mut symbols = Vec::with_capacity(n_symbols as usize);
        for _ in 0..n_symbols {
            symbols.push(b.get_bytes(symbol_size as usize)?.buf().to_vec());
        }

        if total_source > u32::MAX as u64 || total_repair > u32::MAX as u64 {
            return Err(Error::MalformedRepair);
        }

        Ok(RepairFrame {
            total_source: total_source as u32,
            total_repair: total_repair as u32,
            id,
            symbols,
        })
    }

    /// Encoded length this frame would take, type byte included.
    pub fn wire_len(&self) -> usize {
        octets::varint_len(FRAME_TYPE_REPAIR)
            + octets::varint_len(self.total_source as u64)
            + octets::varint_len(self.total_repair as u64)
            + 8
            + octets::varint_len(self.symbols.len() as u64)
            + self.symbols.iter().map(Vec::len).sum::<usize>()
    }
}

/// `RECOVERED`: `VarInt(n) || VarInt(pn)^n`, acknowledging packet numbers
/// the local FEC reconstructed so the peer can skip retransmitting them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredFrame {
    pub pns: Vec<u64>,
}

impl RecoveredFrame {
    pub fn to_bytes(&self, out: &mut octets::OctetsMut) -> Result<usize> {
        if self.pns.is_empty() {
            return Err(Error::ZeroSymbols);
        }

        let before = out.cap();
        out.put_varint(FRAME_TYPE_RECOVERED)?;
        out.put_varint(self.pns.len() as u64)?;
        for pn in &self.pns {
            out.put_varint(*pn)?;
        }
        Ok(before - out.cap())
    }

    pub fn from_bytes(b: &mut octets::Octets) -> Result<RecoveredFrame> {
        let n = b.get_varint()?;
        if n == 0 {
            return Err(Error::ZeroSymbols);
        }

        let mut pns = Vec::with_capacity(n as usize);
        for _ in 0..n {
            pns.push(b.get_varint()?);
        }

        Ok(RecoveredFrame { pns })
    }

    pub fn wire_len(&self) -> usize {
        octets::varint_len(FRAME_TYPE_RECOVERED)
            + octets::varint_len(self.pns.len() as u64)
            + self.pns.iter().map(|pn| octets::varint_len(*pn)).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_fpi_round_trips() {
        let frame = SourceFpiFrame { id: BlockSourceID::new(7, 3) };
        let mut buf = vec![0u8; frame.wire_len()];
        let mut w = octets::OctetsMut::with_slice(&mut buf);
        frame.to_bytes(&mut w).unwrap();

        let mut r = octets::Octets::with_slice(&buf);
        assert_eq!(r.get_varint().unwrap(), FRAME_TYPE_FEC_SRC_FPI);
        let decoded = SourceFpiFrame::from_bytes(&mut r).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn repair_frame_round_trips() {
        let frame = RepairFrame {
            total_source: 5,
            total_repair: 1,
            id: BlockRepairID::new(9, 0),
            symbols: vec![vec![0xAAu8; 8], vec![0xBBu8; 8]],
        };
        let mut buf = vec![0u8; frame.wire_len()];
        let mut w = octets::OctetsMut::with_slice(&mut buf);
        frame.to_bytes(&mut w).unwrap();

        let mut r = octets::Octets::with_slice(&buf);
        assert_eq!(r.get_varint().unwrap(), FRAME_TYPE_REPAIR);
        let decoded = RepairFrame::from_bytes(&mut r, 8).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn repair_frame_rejects_zero_symbols() {
        let frame = RepairFrame {
            total_source: 5,
            total_repair: 1,
            id: BlockRepairID::new(9, 0),
            symbols: vec![],
        };
        let mut buf = vec![0u8; 64];
        let mut w = octets::OctetsMut::with_slice(&mut buf);
        assert_eq!(frame.to_bytes(&mut w), Err(Error::ZeroSymbols));
    }

    #[test]
    fn recovered_frame_round_trips() {
        let frame = RecoveredFrame { pns: vec![1, 2, 300] };
        let mut buf = vec![0u8; frame.wire_len()];
        let mut w = octets::OctetsMut::with_slice(&mut buf);
        frame.to_bytes(&mut w).unwrap();

        let mut r = octets::Octets::with_slice(&buf);
        assert_eq!(r.get_varint().unwrap(), FRAME_TYPE_RECOVERED);
        let decoded = RecoveredFrame::from_bytes(&mut r).unwrap();
        assert_eq!(decoded, frame);
    }
}
