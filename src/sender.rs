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

//! The sending side: turns outgoing packet payloads into source symbols,
//! closes blocks per the redundancy controller, and produces `REPAIR`
//! frames.

use log::debug;
use log::trace;

use crate::block::Block;
use crate::block::BlockNumber;
use crate::block::BlockRepairID;
use crate::block::BlockSourceID;
use crate::controller::Controller;
use crate::scheme::Scheme;
use crate::symbol;
use crate::symbol::Symbol;
use crate::wire::RepairFrame;
use crate::Config;
use crate::Error;
use crate::Result;

/// Sender lifecycle state, advanced only by the application (there is no
/// internal trigger that moves a sender past `Open` on its own).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Accepting new protected payloads and emitting repair frames.
    Open,

    /// No further payloads are accepted; the current block still drains
    /// its repair frames.
    Closed,

    /// The last block has been fully drained of repair frames.
    Draining,

    /// Nothing left to do; the sender can be dropped.
    Done,
}

/// The full repair-symbol codeword for one closed block, plus how much of
/// it has already been handed out as `REPAIR` frames.
///
/// The whole codeword is computed once, at block closure, from the block's
/// frozen `(total_source, total_repair)` — never re-derived from a partial
/// count. A systematic Reed-Solomon codeword's byte values depend on the
/// full `(k, r)` shard configuration used to build it; asking the encoder
/// for a different `r` on a later drain would silently produce symbols that
/// don't belong to the codeword the receiver expects to decode against.
struct PendingRepair {
    block_number: BlockNumber,
    total_source: u32,
    symbols: Vec<Symbol>,
    drained: usize,
}

/// Sends source symbols and the repair frames that protect them.
pub struct Sender {
    config: Config,
    scheme: Scheme,
    controller: Controller,
    state: State,
    next_block_number: BlockNumber,
    current: Block,
    /// Closed blocks whose repair frame hasn't been fully handed out yet.
    pending_repair: std::collections::VecDeque<PendingRepair>,
}

impl Sender {
    pub fn new(config: Config, scheme: Scheme, controller: Controller) -> Sender {
        Sender {
            config,
            scheme,
            controller,
            state: State::Open,
            next_block_number: 0,
            current: Block::new(0),
            pending_repair: std::collections::VecDeque::new(),
        }
    }

    /// Whether the sender has nothing left to emit: no payloads will be
    /// accepted and every queued repair frame has been handed out.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Draining | State::Done)
    }

    /// Preprocesses and splits `protectable_frames` from packet `pn`,
    /// appends the resulting source symbols to the current block, and
    /// returns the `BlockSourceID` of the first one — the caller attaches
    /// a `FEC_SRC_FPI` frame carrying it (and the following ones, derived
    /// by incrementing the offset) to the outgoing packet.
    ///
    /// Returns `Ok(None)` if there was nothing to protect.
    pub fn protect_payload(
        &mut self, pn: u64, protectable_frames: &[u8],
    ) -> Result<Option<BlockSourceID>> {
        if self.state != State::Open {
            return Err(Error::SenderClosed);
        }

        let preprocessed = match symbol::preprocess(pn, protectable_frames, self.config.symbol_size)? {
            Some(p) => p,
            None => return Ok(None),
        };

        let symbols = symbol::split(&preprocessed, self.config.symbol_size)?;
        let mut first = None;
        for symbol in symbols {
            let id = self.current.add_source(symbol)?;
            first.get_or_insert(id);
        }

        trace!("fec sender protected pn={} block={}", pn, self.current.number());

        if self.controller.should_close(self.current.present_source() as u32) {
            self.close_current_block()?;
        }

        Ok(first)
    }

    fn close_current_block(&mut self) -> Result<()> {
        let n = self.controller.repair_count();
        self.current.close(n);

        let block_number = self.current.number();
        let total_source = self.current.source_len() as u32;
        self.next_block_number = self.next_block_number.wrapping_add(1);
        let closed = std::mem::replace(&mut self.current, Block::new(self.next_block_number));

        if n > 0 {
            let symbols = self.scheme.generate_repair(&closed, n, self.config.symbol_size as usize)?;
            debug!("fec sender closed block={} repair_count={}", block_number, n);
            self.pending_repair.push_back(PendingRepair {
                block_number,
                total_source,
                symbols,
                drained: 0,
            });
        }

        Ok(())
    }

    /// Forces the current (possibly partial) block closed and stops
    /// accepting new payloads, e.g. at connection idle or shutdown.
    /// Already-queued repair frames still drain normally afterward.
    pub fn flush(&mut self) -> Result<()> {
        if self.state != State::Open {
            return Ok(());
        }

        if self.current.present_source() > 0 {
            self.close_current_block()?;
        }

        self.state = State::Closed;
        if self.pending_repair.is_empty() {
            self.state = State::Draining;
        }

        Ok(())
    }

    /// Produces the next `REPAIR` frame, if any repair symbols are owed
    /// and fit in `max_bytes`. Returns `None` rather than producing a
    /// frame that would exceed the budget.
    ///
    /// Slices a stable window out of the block's already-computed
    /// codeword rather than re-encoding; the returned frame's
    /// `BlockRepairID` offset picks up where the previous frame for this
    /// block left off, so a codeword that spans more than one frame
    /// still reads back as one contiguous sequence on the receiver.
    pub fn take_repair_frame(&mut self, max_bytes: usize) -> Result<Option<RepairFrame>> {
        let (block_number, total_source, total_repair, drained) = match self.pending_repair.front() {
            Some(p) => (p.block_number, p.total_source, p.symbols.len() as u32, p.drained),
            None => return Ok(None),
        };

        let mut n = total_repair as usize - drained;
        let frame = loop {
            if n == 0 {
                return Ok(None);
            }

            let id = BlockRepairID::new(block_number, drained as u8);
            let symbols: Vec<Vec<u8>> = self.pending_repair.front().unwrap().symbols[drained..drained + n]
                .iter()
                .map(|s| s.to_vec())
                .collect();
            let frame = RepairFrame { total_source, total_repair, id, symbols };

            if frame.wire_len() <= max_bytes {
                break frame;
            }

            n -= 1;
        };

        let pending = self.pending_repair.front_mut().unwrap();
        pending.drained += n;
        if pending.drained == pending.symbols.len() {
            self.pending_repair.pop_front();
            if self.state == State::Closed && self.pending_repair.is_empty() {
                self.state = State::Draining;
            }
        }

        Ok(Some(frame))
    }

    /// Marks the sender fully finished once the caller has confirmed there
    /// is nothing left to drain. A no-op outside `Draining`.
    pub fn finish(&mut self) {
        if self.state == State::Draining {
            self.state = State::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemeKind;

    fn sender(k: u32, r: u32, scheme: Scheme) -> Sender {
        let config = Config::new(SchemeKind::Xor, 8).unwrap().with_window(k, r).unwrap();
        let controller = Controller::constant(k, r).unwrap();
        Sender::new(config, scheme, controller)
    }

    #[test]
    fn protect_payload_returns_first_source_id() {
        let mut s = sender(5, 1, Scheme::Xor);
        let id = s.protect_payload(1, b"hello world").unwrap().unwrap();
        assert_eq!(id.block_number, 0);
        assert_eq!(id.offset, 0);
    }

    #[test]
    fn protect_payload_ignores_empty_frames() {
        let mut s = sender(5, 1, Scheme::Xor);
        assert_eq!(s.protect_payload(1, &[]).unwrap(), None);
    }

    #[test]
    fn closing_window_produces_repair_frame() {
        let mut s = sender(2, 1, Scheme::Xor);
        s.protect_payload(1, b"aaaaaaa").unwrap();
        s.protect_payload(2, b"bbbbbbb").unwrap();
        // window of 2 reached: block 0 closed, repair owed
        let frame = s.take_repair_frame(1500).unwrap().unwrap();
        assert_eq!(frame.symbols.len(), 1);
        assert_eq!(frame.id.source.block_number, 0);
    }

    #[test]
    fn flush_closes_partial_block() {
        let mut s = sender(5, 1, Scheme::Xor);
        s.protect_payload(1, b"aaaaaaa").unwrap();
        s.flush().unwrap();
        assert!(s.take_repair_frame(1500).unwrap().is_some());
    }

    #[test]
    fn take_repair_frame_respects_byte_budget() {
        let mut s = sender(2, 1, Scheme::Xor);
        s.protect_payload(1, b"aaaaaaa").unwrap();
        s.protect_payload(2, b"bbbbbbb").unwrap();
        assert_eq!(s.take_repair_frame(2).unwrap(), None);
    }

    /// A Reed-Solomon codeword's byte values depend on the full `(k, r)`
    /// shard configuration it was built with. When a budget only fits one
    /// repair symbol per frame, draining a `(k, r)` block across several
    /// `take_repair_frame` calls must still hand out a stable prefix of the
    /// *one* codeword computed for the whole block — not re-encode with a
    /// shrinking `r` on each call — and each frame's `BlockRepairID` offset
    /// must continue where the previous one left off.
    #[test]
    fn reed_solomon_repair_drains_across_multiple_frames_as_one_codeword() {
        let config = Config::new(SchemeKind::ReedSolomon, 8).unwrap().with_window(5, 3).unwrap();
        let controller = Controller::constant(5, 3).unwrap();
        let mut s = Sender::new(config, Scheme::ReedSolomon, controller);
        for pn in 1..=5u64 {
            s.protect_payload(pn, format!("{pn}aaaaa").as_bytes()).unwrap();
        }

        // budget that fits exactly one repair symbol's worth of metadata + E
        let one_symbol_frame = s.take_repair_frame(usize::MAX).unwrap().unwrap();
        assert_eq!(one_symbol_frame.symbols.len(), 3, "sanity: whole codeword in one frame");
        let budget = {
            let RepairFrame { total_source, total_repair, id, symbols } = one_symbol_frame.clone();
            RepairFrame { total_source, total_repair, id, symbols: vec![symbols[0].clone()] }.wire_len()
        };

        let mut s = Sender::new(
            Config::new(SchemeKind::ReedSolomon, 8).unwrap().with_window(5, 3).unwrap(),
            Scheme::ReedSolomon,
            Controller::constant(5, 3).unwrap(),
        );
        for pn in 1..=5u64 {
            s.protect_payload(pn, format!("{pn}aaaaa").as_bytes()).unwrap();
        }

        let mut drained = Vec::new();
        let mut offsets = Vec::new();
        while let Some(frame) = s.take_repair_frame(budget).unwrap() {
            assert_eq!(frame.symbols.len(), 1);
            offsets.push(frame.id.source.offset);
            drained.extend(frame.symbols);
        }

        assert_eq!(offsets, vec![0, 1, 2], "each frame continues at the prior drained count");
        assert_eq!(drained, one_symbol_frame.symbols, "drained prefix matches the single whole codeword");
    }
}
