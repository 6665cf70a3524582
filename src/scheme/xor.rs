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

//! XOR parity: one repair symbol, tolerates a single loss per block.

use crate::block::Block;
use crate::symbol::Symbol;
use crate::Error;
use crate::Result;

pub fn can_recover(block: &Block) -> bool {
    let total_source = match block.total_source() {
        Some(t) => t as usize,
        None => return false,
    };

    total_source > 0
        && block.present_source() == total_source - 1
        && block.present_repair() >= 1
}

pub fn generate_repair(block: &Block, n: u32, symbol_size: usize) -> Result<Vec<Symbol>> {
    if n > 1 {
        return Err(Error::XORTooMany);
    }
    if block.source_len() == 0 {
        return Err(Error::InvalidParameters);
    }

    let mut acc = vec![0u8; symbol_size];
    for symbol in block.source_slice().iter().flatten() {
        xor_into(&mut acc, symbol);
    }

    Ok(vec![acc.into_boxed_slice()])
}

pub fn recover(block: &mut Block) -> Result<Vec<u8>> {
    if !can_recover(block) {
        return Err(Error::NoRepairSymbol);
    }

    let repair = block.repair_slice()[0]
        .as_ref()
        .ok_or(Error::NoRepairSymbol)?
        .clone();

    let mut acc = repair.to_vec();
    let mut missing = None;
    for (offset, symbol) in block.source_slice().iter().enumerate() {
        match symbol {
            Some(s) => xor_into(&mut acc, s),
            None => missing = Some(offset as u8),
        }
    }

    let missing = missing.ok_or(Error::NoRepairSymbol)?;
    block.set_source(missing, acc.into_boxed_slice());
    Ok(vec![missing])
}

/// Byte-exact XOR of equal-length buffers, word-chunked for speed. Correct
/// for any alignment since it never reinterprets the slices themselves as
/// wider integers, only the bytes copied out of them.
fn xor_into(acc: &mut [u8], other: &[u8]) {
    debug_assert_eq!(acc.len(), other.len());

    const W: usize = std::mem::size_of::<usize>();
    let mut i = 0;
    while i + W <= acc.len() {
        let a = usize::from_ne_bytes(acc[i..i + W].try_into().unwrap());
        let b = usize::from_ne_bytes(other[i..i + W].try_into().unwrap());
        acc[i..i + W].copy_from_slice(&(a ^ b).to_ne_bytes());
        i += W;
    }
    while i < acc.len() {
        acc[i] ^= other[i];
        i += 1;
    }
}
