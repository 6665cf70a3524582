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

//! The receiving side: buffers source and repair symbols per block, drives
//! recovery once a block becomes solvable, and reassembles recovered
//! packets.
//!
//! The open-block set is bounded to `N_open` blocks and evicted strictly
//! FIFO by insertion order (not touch order): a block only ever leaves
//! because it completed, became unrecoverable, or aged out as the oldest
//! entry when a new block arrives at capacity. See DESIGN.md for why this
//! crate follows the original FIFO behavior rather than the "bounded LRU"
//! reading of the distilled spec.

use std::collections::HashMap;
use std::collections::VecDeque;

use log::debug;
use log::trace;
use log::warn;

use crate::block::Block;
use crate::block::BlockNumber;
use crate::block::BlockSourceID;
use crate::scheme::Scheme;
use crate::symbol;
use crate::symbol::RecoveredPacket;
use crate::wire::RecoveredFrame;
use crate::wire::RepairFrame;
use crate::Config;
use crate::Result;

/// Receives source and repair symbols, recovers what it can, and hands
/// back full packet payloads.
pub struct Receiver {
    config: Config,
    scheme: Scheme,
    blocks: HashMap<BlockNumber, Block>,
    /// Insertion order of `blocks`, oldest first; the FIFO eviction queue.
    order: VecDeque<BlockNumber>,
    recovered_queue: VecDeque<RecoveredPacket>,
    /// Packet numbers recovered locally but not yet told to the peer via a
    /// `RECOVERED` frame.
    pending_recovered: Vec<u64>,
}

impl Receiver {
    pub fn new(config: Config, scheme: Scheme) -> Receiver {
        Receiver {
            config,
            scheme,
            blocks: HashMap::new(),
            order: VecDeque::new(),
            recovered_queue: VecDeque::new(),
            pending_recovered: Vec::new(),
        }
    }

    fn block_mut(&mut self, number: BlockNumber) -> &mut Block {
        if !self.blocks.contains_key(&number) {
            self.evict_if_full();
            self.blocks.insert(number, Block::new(number));
            self.order.push_back(number);
        }
        self.blocks.get_mut(&number).unwrap()
    }

    /// Drops the oldest open block if the set is at capacity. FIFO by
    /// insertion, never by last-touched: a block that's been quietly
    /// accumulating symbols for a while is exactly as evictable as one
    /// that just arrived.
    fn evict_if_full(&mut self) {
        while self.blocks.len() >= self.config.max_open_blocks {
            match self.order.pop_front() {
                Some(oldest) => {
                    if self.blocks.remove(&oldest).is_some() {
                        warn!("fec receiver evicted block={} (open-block limit)", oldest);
                    }
                },
                None => break,
            }
        }
    }

    /// Places a single source symbol, already cut to size, into its block
    /// at a known offset. The building block `receive_source_payload` and
    /// tests use directly when a symbol arrives pre-split (e.g. recovered
    /// symbols fed back in by a scheme).
    fn place_source_symbol(&mut self, id: BlockSourceID, symbol: symbol::Symbol) {
        trace!("fec receiver got source block={} offset={}", id.block_number, id.offset);
        let block = self.block_mut(id.block_number);
        block.set_source(id.offset, symbol);
        self.try_recover(id.block_number);
        self.drain_complete_blocks();
    }

    /// Splits a `preprocessed` payload (as produced by [`symbol::preprocess`])
    /// into source symbols and places them at `first_id.offset,
    /// first_id.offset + 1, ...` of block `first_id.block_number`.
    ///
    /// `pn` is the packet number the carrier packet was decrypted under;
    /// the FEC subsystem doesn't need it beyond tracing, since the same
    /// number already travels inside the `START_OF_PACKET` symbol's chunk.
    ///
    /// Fails with [`crate::Error::OffsetOverflow`] if walking offsets for
    /// this payload would cross 255; no symbols are placed in that case.
    pub fn receive_source_payload(
        &mut self, pn: u64, preprocessed: &[u8], first_id: BlockSourceID,
    ) -> Result<()> {
        let symbols = symbol::split(preprocessed, self.config.symbol_size)?;

        trace!(
            "fec receiver receiving pn={} block={} offset={} n_symbols={}",
            pn,
            first_id.block_number,
            first_id.offset,
            symbols.len()
        );

        let mut ids = Vec::with_capacity(symbols.len());
        let mut id = first_id;
        for i in 0..symbols.len() {
            if i > 0 {
                id = id.next_offset()?;
            }
            ids.push(id);
        }

        for (id, symbol) in ids.into_iter().zip(symbols) {
            self.place_source_symbol(id, symbol);
        }

        Ok(())
    }

    /// Applies a `REPAIR` frame: records the block's totals and stores its
    /// repair symbols, then attempts recovery.
    pub fn handle_repair_frame(&mut self, frame: RepairFrame) {
        let number = frame.id.source.block_number;
        let block = self.block_mut(number);
        block.set_totals(frame.total_source, frame.total_repair);

        let start_offset = frame.id.source.offset as usize;
        for (i, symbol) in frame.symbols.into_iter().enumerate() {
            block.set_repair((start_offset + i) as u8, symbol.into_boxed_slice());
        }

        self.try_recover(number);
        self.drain_complete_blocks();
    }

    fn try_recover(&mut self, number: BlockNumber) {
        let block = match self.blocks.get_mut(&number) {
            Some(b) => b,
            None => return,
        };

        if !self.scheme.can_recover(block) {
            return;
        }

        match self.scheme.recover(block) {
            Ok(recovered_offsets) => {
                debug!("fec receiver recovered block={} offsets={:?}", number, recovered_offsets);

                let packets = symbol::reassemble(block.source_slice(), &recovered_offsets);
                for p in &packets {
                    self.pending_recovered.push(p.pn);
                }

                self.recovered_queue.extend(packets);
                while self.recovered_queue.len() > self.config.max_recovered_packets {
                    self.recovered_queue.pop_front();
                }
            },
            Err(e) => {
                warn!("fec receiver recovery failed block={} err={:?}", number, e);
            },
        }
    }

    /// Removes and forgets blocks that are fully complete: nothing more
    /// can ever happen to them, so holding them back would just waste
    /// memory inside the open-block set.
    fn drain_complete_blocks(&mut self) {
        let complete: Vec<BlockNumber> =
            self.blocks.iter().filter(|(_, b)| b.is_complete()).map(|(n, _)| *n).collect();

        for number in complete {
            self.blocks.remove(&number);
            self.order.retain(|n| *n != number);
        }
    }

    /// Pops the oldest recovered packet payload not yet handed to the
    /// caller. The queue is a bounded ring buffer: once full, the oldest
    /// unclaimed entry is silently dropped to make room for new arrivals.
    pub fn take_recovered_packet(&mut self) -> Option<RecoveredPacket> {
        self.recovered_queue.pop_front()
    }

    /// Whether `number` is still in the open-block set: neither completed,
    /// recovered, nor FIFO-evicted yet.
    pub fn is_block_open(&self, number: BlockNumber) -> bool {
        self.blocks.contains_key(&number)
    }

    /// Builds a `RECOVERED` frame telling the peer which packet numbers no
    /// longer need retransmission, if any are owed and it fits in
    /// `max_bytes`.
    pub fn take_recovered_frame(&mut self, max_bytes: usize) -> Option<RecoveredFrame> {
        if self.pending_recovered.is_empty() {
            return None;
        }

        let mut n = self.pending_recovered.len();
        loop {
            if n == 0 {
                return None;
            }

            let frame = RecoveredFrame { pns: self.pending_recovered[..n].to_vec() };
            if frame.wire_len() <= max_bytes {
                self.pending_recovered.drain(..n);
                return Some(frame);
            }

            n -= 1;
        }
    }
}
