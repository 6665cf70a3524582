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

//! Errors produced by the FEC subsystem.

use std::fmt;

/// An FEC subsystem error.
///
/// Configuration errors are fatal only to the FEC subsystem: a connection
/// that fails to set up FEC simply proceeds without it. Input and wire
/// errors are surfaced to the caller with state left unchanged. Recovery
/// errors are never fatal; the transport always has retransmission to fall
/// back on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// `symbol_size` is zero or at/above `MAX_FEC_SYMBOL_SIZE`.
    InvalidSymbolSize,

    /// The configured scheme name or parameters are not recognized.
    UnknownScheme,

    /// The redundancy controller parameters are incompatible with the
    /// configured scheme (e.g. `k == 0`).
    InvalidController,

    /// `protect_payload` was called with an empty preprocessed payload.
    EmptyPayload,

    /// `protect_payload` was called after the sender left the `Open` state.
    SenderClosed,

    /// Walking source-symbol offsets for a single payload crossed 255.
    OffsetOverflow,

    /// A payload handed to `split` is not a multiple of `E - 1` bytes.
    PayloadNotAligned,

    /// A `REPAIR` frame's symbol bytes don't line up with `n_symbols * E`.
    MalformedRepair,

    /// Not enough bytes remained in a buffer to decode a field.
    BufferTooShort,

    /// A VarInt-encoded field was malformed.
    InvalidVarint,

    /// A `REPAIR` frame declared `n_symbols == 0`.
    ZeroSymbols,

    /// XOR scheme was asked to generate more than one repair symbol.
    XORTooMany,

    /// A scheme's `recover` was invoked on a block with no repair symbol.
    NoRepairSymbol,

    /// A scheme was asked to operate with `k == 0` source symbols.
    InvalidParameters,

    /// The underlying erasure-coding library rejected the operation.
    SchemeFailure,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<octets::BufferTooShortError> for Error {
    fn from(_: octets::BufferTooShortError) -> Self {
        Error::BufferTooShort
    }
}

impl From<reed_solomon_erasure::Error> for Error {
    fn from(_: reed_solomon_erasure::Error) -> Self {
        Error::SchemeFailure
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
