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

//! Reed-Solomon over `galois_8`: `k` source symbols, `r` repair symbols,
//! tolerates up to `r` losses per block.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::block::Block;
use crate::symbol::Symbol;
use crate::Error;
use crate::Result;

/// Generator-matrix construction is the expensive part of setting up an
/// encoder; `(k, r) -> encoder` is cached globally and shared read-only
/// once built, per the design note on scheme caching.
static ENCODERS: Lazy<RwLock<HashMap<(usize, usize), Arc<ReedSolomon>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn encoder_for(k: usize, r: usize) -> Result<Arc<ReedSolomon>> {
    if k == 0 {
        return Err(Error::InvalidParameters);
    }

    {
        let cache = ENCODERS.read().unwrap_or_else(|e| e.into_inner());
        if let Some(enc) = cache.get(&(k, r)) {
            return Ok(enc.clone());
        }
    }

    let mut cache = ENCODERS.write().unwrap_or_else(|e| e.into_inner());
    if let Some(enc) = cache.get(&(k, r)) {
        return Ok(enc.clone());
    }

    let enc = Arc::new(ReedSolomon::new(k, r)?);
    cache.insert((k, r), enc.clone());
    Ok(enc)
}

pub fn can_recover(block: &Block) -> bool {
    let total_source = match block.total_source() {
        Some(t) => t as usize,
        None => return false,
    };

    total_source > 0
        && block.present_repair() >= 1
        && block.present_source() < total_source
        && block.present_source() + block.present_repair() >= total_source
}

pub fn generate_repair(block: &Block, n: u32, symbol_size: usize) -> Result<Vec<Symbol>> {
    let k = block.source_len();
    if k == 0 {
        return Err(Error::InvalidParameters);
    }

    let r = n as usize;
    let encoder = encoder_for(k, r)?;

    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(k + r);
    for slot in block.source_slice() {
        match slot {
            Some(s) => shards.push(s.to_vec()),
            None => shards.push(vec![0u8; symbol_size]),
        }
    }
    shards.resize(k + r, Vec::new());
    for shard in &mut shards[k..] {
        shard.resize(symbol_size, 0);
    }

    encoder.encode(&mut shards)?;

    Ok(shards.split_off(k).into_iter().map(Vec::into_boxed_slice).collect())
}

pub fn recover(block: &mut Block) -> Result<Vec<u8>> {
    let total_repair = block.total_repair().unwrap_or(0) as usize;
    if total_repair == 0 {
        return Err(Error::NoRepairSymbol);
    }
    let k = block.total_source().ok_or(Error::InvalidParameters)? as usize;
    if k == 0 {
        return Err(Error::InvalidParameters);
    }

    let encoder = encoder_for(k, total_repair)?;

    let mut shards: Vec<Option<Vec<u8>>> = Vec::with_capacity(k + total_repair);
    let mut missing = Vec::new();
    for (offset, slot) in block.source_slice().iter().enumerate() {
        match slot {
            Some(s) => shards.push(Some(s.to_vec())),
            None => {
                missing.push(offset as u8);
                shards.push(None);
            },
        }
    }
    shards.resize(k, None);

    for i in 0..total_repair {
        let slot = block.repair_slice().get(i).and_then(|s| s.as_ref());
        shards.push(slot.map(|s| s.to_vec()));
    }

    encoder.reconstruct_data(&mut shards)?;

    for &offset in &missing {
        if let Some(data) = shards[offset as usize].take() {
            block.set_source(offset, data.into_boxed_slice());
        }
    }

    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(byte: u8, len: usize) -> Symbol {
        vec![byte; len].into_boxed_slice()
    }

    #[test]
    fn recovers_up_to_r_losses_but_not_more() {
        let (k, r) = (5usize, 2usize);
        let mut sender = Block::new(0);
        for i in 0..k {
            sender.add_source(sym(i as u8, 8)).unwrap();
        }
        let repair = generate_repair(&sender, r as u32, 8).unwrap();
        sender.close(r as u32);

        // drop offsets 1 and 3 (m = r): must recover
        let mut recv = Block::new(0);
        for i in 0..k {
            if i != 1 && i != 3 {
                recv.set_source(i as u8, sym(i as u8, 8));
            }
        }
        recv.set_totals(k as u32, r as u32);
        for (i, s) in repair.iter().enumerate() {
            recv.set_repair(i as u8, s.clone());
        }
        assert!(can_recover(&recv));
        let recovered = recover(&mut recv).unwrap();
        assert_eq!(recovered, vec![1, 3]);
        assert_eq!(recv.source_slice()[1].as_deref(), Some(&[1u8; 8][..]));
        assert_eq!(recv.source_slice()[3].as_deref(), Some(&[3u8; 8][..]));
    }

    #[test]
    fn cannot_recover_beyond_repair_budget() {
        let (k, r) = (5usize, 2usize);
        let mut recv = Block::new(0);
        // drop 3 (m = r + 1): only 2 present
        recv.set_source(0, sym(0, 8));
        recv.set_source(2, sym(2, 8));
        recv.set_totals(k as u32, r as u32);
        recv.set_repair(0, sym(9, 8));
        recv.set_repair(1, sym(9, 8));
        assert!(!can_recover(&recv));
    }

    #[test]
    fn rejects_zero_source_symbols() {
        let block = Block::new(0);
        assert_eq!(generate_repair(&block, 1, 8), Err(Error::InvalidParameters));
    }
}
