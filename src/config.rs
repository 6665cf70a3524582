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

//! FEC subsystem configuration.

use crate::Error;
use crate::Result;

/// Upper bound on the symbol size `E`, taken as the maximum IPv6 packet
/// size: no single symbol can ever need to be larger than a whole packet.
pub const MAX_FEC_SYMBOL_SIZE: usize = 65535;

/// Default redundancy ratio taken from the constant controller used
/// upstream: one repair symbol for every five source symbols.
pub const DEFAULT_WINDOW_SIZE: u32 = 5;
pub const DEFAULT_REPAIR_COUNT: u32 = 1;

/// Default bound on the receiver's open-block set (`N_open`).
pub const DEFAULT_MAX_OPEN_BLOCKS: usize = 200;

/// Default bound on the receiver's recovered-packet ring buffer.
pub const DEFAULT_MAX_RECOVERED_PACKETS: usize = 100;

/// Which erasure code protects outgoing blocks, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemeKind {
    /// FEC is turned off: no symbols are generated, no frames are emitted.
    Disabled,

    /// XOR parity, one repair symbol, tolerates a single loss per block.
    Xor,

    /// Reed-Solomon over `galois_8`, tolerates up to `repair_count` losses.
    ReedSolomon,
}

/// FEC subsystem configuration, as negotiated or set by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub scheme: SchemeKind,

    /// The constant symbol size `E`, in bytes.
    pub symbol_size: u16,

    /// Source symbols the constant redundancy controller accumulates before
    /// closing a block (`k`).
    pub window_size: u32,

    /// Repair symbols generated per closed block (`r`).
    pub repair_count: u32,

    /// Bound on the receiver's open-block set (`N_open`).
    pub max_open_blocks: usize,

    /// Bound on the receiver's recovered-packet ring buffer.
    pub max_recovered_packets: usize,
}

impl Config {
    /// Creates a configuration with the constant-controller defaults.
    pub fn new(scheme: SchemeKind, symbol_size: u16) -> Result<Config> {
        if symbol_size < 3 || symbol_size as usize >= MAX_FEC_SYMBOL_SIZE {
            return Err(Error::InvalidSymbolSize);
        }

        Ok(Config {
            scheme,
            symbol_size,
            window_size: DEFAULT_WINDOW_SIZE,
            repair_count: DEFAULT_REPAIR_COUNT,
            max_open_blocks: DEFAULT_MAX_OPEN_BLOCKS,
            max_recovered_packets: DEFAULT_MAX_RECOVERED_PACKETS,
        })
    }

    pub fn with_window(mut self, window_size: u32, repair_count: u32) -> Result<Config> {
        if window_size == 0 {
            return Err(Error::InvalidController);
        }

        self.window_size = window_size;
        self.repair_count = repair_count;
        Ok(self)
    }

    pub fn with_max_open_blocks(mut self, max_open_blocks: usize) -> Config {
        self.max_open_blocks = max_open_blocks;
        self
    }

    pub fn with_max_recovered_packets(mut self, max_recovered_packets: usize) -> Config {
        self.max_recovered_packets = max_recovered_packets;
        self
    }

    /// Number of chunk bytes a single symbol carries (`E - 1`).
    pub fn chunk_size(&self) -> usize {
        self.symbol_size as usize - 1
    }
}
