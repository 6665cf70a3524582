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

//! Erasure-coding schemes over a block.
//!
//! A tagged variant plus a dispatch function, rather than a trait object:
//! the set of schemes is closed and known at compile time, so a `match`
//! gets exhaustiveness checking for free and callers never pay for virtual
//! dispatch. Adding a scheme means extending [`Scheme`] and this module's
//! three methods.

mod reed_solomon;
mod xor;

use crate::block::Block;
use crate::symbol::Symbol;
use crate::Result;

/// Which erasure code protects a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Xor,
    ReedSolomon,
}

impl Scheme {
    /// Generates `n` fresh repair symbols for `block`. Missing source
    /// offsets are treated as zero-filled for the duration of the
    /// computation.
    pub fn generate_repair(&self, block: &Block, n: u32, symbol_size: usize) -> Result<Vec<Symbol>> {
        match self {
            Scheme::Xor => xor::generate_repair(block, n, symbol_size),
            Scheme::ReedSolomon => reed_solomon::generate_repair(block, n, symbol_size),
        }
    }

    /// Reconstructs every recoverable missing source symbol in `block`,
    /// placing each one back into the block, and returns the offsets that
    /// were recovered, ascending.
    pub fn recover(&self, block: &mut Block) -> Result<Vec<u8>> {
        match self {
            Scheme::Xor => xor::recover(block),
            Scheme::ReedSolomon => reed_solomon::recover(block),
        }
    }

    pub fn can_recover(&self, block: &Block) -> bool {
        match self {
            Scheme::Xor => xor::can_recover(block),
            Scheme::ReedSolomon => reed_solomon::can_recover(block),
        }
    }
}

impl From<crate::config::SchemeKind> for Option<Scheme> {
    fn from(kind: crate::config::SchemeKind) -> Self {
        match kind {
            crate::config::SchemeKind::Disabled => None,
            crate::config::SchemeKind::Xor => Some(Scheme::Xor),
            crate::config::SchemeKind::ReedSolomon => Some(Scheme::ReedSolomon),
        }
    }
}
