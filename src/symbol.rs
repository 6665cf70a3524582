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

//! The symbol codec: cuts a preprocessed packet payload into fixed-size
//! source symbols and reassembles symbols back into packet payloads.

use crate::Error;
use crate::Result;

/// Sync-byte flag: this symbol carries the first chunk of a packet.
pub const START_OF_PACKET: u8 = 0b0000_0001;

/// Sync-byte flag: this symbol carries the last chunk of a packet.
pub const END_OF_PACKET: u8 = 0b0000_0010;

/// An `E`-byte symbol, either source or repair data.
///
/// Both symbol kinds are the same shape on the wire (a flat byte buffer of
/// the negotiated symbol size); only source symbols give byte 0 meaning.
pub type Symbol = Box<[u8]>;

/// A packet payload recovered by the receiver from source and/or repair
/// symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredPacket {
    pub pn: u64,
    pub payload: Vec<u8>,
}

#[inline]
pub fn is_start(symbol: &[u8]) -> bool {
    symbol[0] & START_OF_PACKET != 0
}

#[inline]
pub fn is_end(symbol: &[u8]) -> bool {
    symbol[0] & END_OF_PACKET != 0
}

#[inline]
fn chunk(symbol: &[u8]) -> &[u8] {
    &symbol[1..]
}

/// Serializes a packet's FEC-protectable frame bytes into a preprocessed
/// payload: `VarInt(pn) || protectable_frames`, right-padded with zero
/// bytes (semantically trailing PADDING frames) to a multiple of `E - 1`.
///
/// Returns `None` if `protectable_frames` is empty — there's nothing to
/// protect.
///
/// The packet number is placed at a fixed offset (immediately after the
/// sync byte of the `START_OF_PACKET` symbol) rather than after any
/// padding, so that `reassemble` can always find it deterministically; see
/// DESIGN.md for why the padding trails the content instead of leading it.
pub fn preprocess(pn: u64, protectable_frames: &[u8], symbol_size: u16) -> Result<Option<Vec<u8>>> {
    if protectable_frames.is_empty() {
        return Ok(None);
    }

    let chunk_size = symbol_size as usize - 1;

    let pn_len = octets::varint_len(pn);
    let mut content = Vec::with_capacity(pn_len + protectable_frames.len());
    content.resize(pn_len, 0);
    {
        let mut w = octets::OctetsMut::with_slice(&mut content);
        w.put_varint(pn)?;
    }
    content.extend_from_slice(protectable_frames);

    let pad_len = (chunk_size - content.len() % chunk_size) % chunk_size;
    content.resize(content.len() + pad_len, 0);

    Ok(Some(content))
}

/// Splits a preprocessed payload into `E`-byte source symbols.
///
/// Fails with [`Error::PayloadNotAligned`] if `payload.len()` is not a
/// multiple of `E - 1`.
pub fn split(payload: &[u8], symbol_size: u16) -> Result<Vec<Symbol>> {
    let chunk_size = symbol_size as usize - 1;
    if chunk_size == 0 || payload.len() % chunk_size != 0 {
        return Err(Error::PayloadNotAligned);
    }

    let n_chunks = payload.len() / chunk_size;
    let mut symbols = Vec::with_capacity(n_chunks);

    for (i, piece) in payload.chunks(chunk_size).enumerate() {
        let mut data = vec![0u8; symbol_size as usize];
        if i == 0 {
            data[0] |= START_OF_PACKET;
        }
        if i == n_chunks - 1 {
            data[0] |= END_OF_PACKET;
        }
        data[1..].copy_from_slice(piece);
        symbols.push(data.into_boxed_slice());
    }

    Ok(symbols)
}

/// Walks a block's (possibly sparse, now dense where recovered) source
/// symbols in offset order and reassembles any packet whose reassembly
/// consumed at least one symbol listed in `recovered_offsets` — packets
/// that arrived intact are not re-emitted.
///
/// `recovered_offsets` must be sorted ascending.
pub fn reassemble(symbols: &[Option<Symbol>], recovered_offsets: &[u8]) -> Vec<RecoveredPacket> {
    let mut out = Vec::new();
    let mut recovered = recovered_offsets.iter().peekable();

    let mut current: Vec<u8> = Vec::new();
    let mut current_pn: Option<u64> = None;
    let mut of_interest = false;

    for (offset, slot) in symbols.iter().enumerate() {
        let offset = offset as u8;

        let sym = match slot {
            None => {
                current.clear();
                current_pn = None;
                of_interest = false;
                continue;
            },
            Some(sym) => sym,
        };

        let start = is_start(sym);
        let end = is_end(sym);

        // mid-packet fragment whose head was never seen
        if current_pn.is_none() && !start {
            continue;
        }

        // a new packet starts before the previous one closed: the
        // previous one is stale (its END_OF_PACKET symbol was lost)
        if start && current_pn.is_some() {
            current.clear();
            current_pn = None;
            of_interest = false;
        }

        if recovered.peek() == Some(&&offset) {
            of_interest = true;
            recovered.next();
        }

        let mut payload_chunk = chunk(sym);
        if start {
            let mut r = octets::Octets::with_slice(payload_chunk);
            match r.get_varint() {
                Ok(pn) => {
                    current_pn = Some(pn);
                    payload_chunk = &payload_chunk[r.off()..];
                },
                Err(_) => {
                    // malformed pn prefix, can't recover this packet
                    current.clear();
                    current_pn = None;
                    of_interest = false;
                    continue;
                },
            }
        }

        current.extend_from_slice(payload_chunk);

        if end {
            if of_interest {
                if let Some(pn) = current_pn {
                    out.push(RecoveredPacket {
                        pn,
                        payload: std::mem::take(&mut current),
                    });
                }
            }
            current.clear();
            current_pn = None;
            of_interest = false;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const E: u16 = 8;

    #[test]
    fn preprocess_empty_is_none() {
        assert_eq!(preprocess(1, &[], E).unwrap(), None);
    }

    #[test]
    fn split_rejects_unaligned_payload() {
        let payload = vec![0u8; 5];
        assert_eq!(split(&payload, E), Err(Error::PayloadNotAligned));
    }

    #[test]
    fn split_marks_start_and_end() {
        let payload = vec![0u8; (E as usize - 1) * 3];
        let symbols = split(&payload, E).unwrap();
        assert_eq!(symbols.len(), 3);
        assert!(is_start(&symbols[0]) && !is_end(&symbols[0]));
        assert!(!is_start(&symbols[1]) && !is_end(&symbols[1]));
        assert!(is_end(&symbols[2]) && !is_start(&symbols[2]));
    }

    #[test]
    fn single_chunk_symbol_is_both_start_and_end() {
        let payload = vec![0u8; E as usize - 1];
        let symbols = split(&payload, E).unwrap();
        assert_eq!(symbols.len(), 1);
        assert!(is_start(&symbols[0]) && is_end(&symbols[0]));
    }

    #[test]
    fn round_trip_recovers_packet_number_and_payload() {
        let pn = 42u64;
        let frames = b"hello fec world!".to_vec();
        let pre = preprocess(pn, &frames, E).unwrap().unwrap();
        let symbols: Vec<Option<Symbol>> = split(&pre, E).unwrap().into_iter().map(Some).collect();
        let recovered_offsets: Vec<u8> = (0..symbols.len() as u8).collect();

        let packets = reassemble(&symbols, &recovered_offsets);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pn, pn);
        // the payload may carry trailing zero padding (indistinguishable
        // from legitimate trailing PADDING frames); it must at least start
        // with the original frame bytes.
        assert!(packets[0].payload.starts_with(&frames));
        assert!(packets[0].payload[frames.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn intact_packets_are_not_reemitted() {
        let pre = preprocess(7, b"data", E).unwrap().unwrap();
        let symbols: Vec<Option<Symbol>> = split(&pre, E).unwrap().into_iter().map(Some).collect();
        // nothing in recovered_offsets: this packet arrived intact
        let packets = reassemble(&symbols, &[]);
        assert!(packets.is_empty());
    }

    #[test]
    fn nil_slot_drops_in_progress_packet() {
        let pre = preprocess(9, b"0123456789abcdef", E).unwrap().unwrap();
        let mut symbols: Vec<Option<Symbol>> = split(&pre, E).unwrap().into_iter().map(Some).collect();
        assert!(symbols.len() > 1);
        symbols[1] = None;
        let recovered_offsets: Vec<u8> = (0..symbols.len() as u8).collect();
        let packets = reassemble(&symbols, &recovered_offsets);
        assert!(packets.is_empty());
    }
}
