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

//! Forward Error Correction for a QUIC connection.
//!
//! This crate protects in-flight QUIC packets against loss by transmitting
//! redundant coded symbols alongside the payloads they protect, so a peer
//! that lost some packets can reconstruct them from received siblings plus
//! redundancy instead of waiting a round trip for retransmission.
//!
//! The pieces, bottom-up:
//!
//! - [`symbol`]: cuts a preprocessed packet payload into fixed-size source
//!   symbols and reassembles symbols back into packet payloads.
//! - [`block`]: the coding block — a group of source and repair symbols
//!   addressed by block number and intra-block offset.
//! - [`scheme`]: the erasure codes that operate over a block, XOR and
//!   Reed-Solomon, behind one dispatching enum.
//! - [`controller`]: the policy deciding when a block closes and how many
//!   repair symbols it gets.
//! - [`sender`] / [`receiver`]: the two halves of the state machine, one per
//!   direction of a connection.
//! - [`wire`]: the three frame encodings (`FEC_SRC_FPI`, `REPAIR`,
//!   `RECOVERED`) that carry this protocol on the QUIC connection itself.
//!
//! Nothing here touches I/O. [`Sender`] and [`Receiver`] are synchronous
//! transformations over in-memory state; the packet builder and packet
//! parser on either side of a connection are expected to drive them, the
//! packet builder deciding for itself when an owed repair frame is worth
//! spending budget on.

pub mod block;
pub mod config;
pub mod controller;
mod error;
pub mod receiver;
pub mod scheme;
pub mod sender;
pub mod symbol;
pub mod wire;

pub use config::Config;
pub use config::SchemeKind;
pub use config::MAX_FEC_SYMBOL_SIZE;
pub use error::Error;
pub use error::Result;
pub use receiver::Receiver;
pub use sender::Sender;
pub use symbol::RecoveredPacket;

#[cfg(test)]
pub(crate) mod testing {
    /// Initializes `env_logger` once per test binary. Tests that don't care
    /// about log output never need to call this; it exists for the handful
    /// that want to eyeball `RUST_LOG=trace` output while debugging a
    /// failure.
    pub fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}

/// Forward error correction for one direction pair of a QUIC connection: a
/// [`Sender`] that protects outgoing packets and a [`Receiver`] that
/// reconstructs losses from whatever source and repair symbols arrived,
/// both driven by the same [`Config`] and erasure-coding scheme.
///
/// Constructed once per connection that negotiated FEC. [`Fec::new`]
/// returns `Ok(None)` for [`SchemeKind::Disabled`] rather than an error, so
/// a caller can write `if let Some(fec) = Fec::new(config)? { ... }` and
/// have "FEC is off" simply mean "nothing to drive", with no wire side
/// effects and no special-casing at every call site.
pub struct Fec {
    sender: Sender,
    receiver: Receiver,
}

impl Fec {
    /// Builds the sender and receiver halves for `config`, or `None` if
    /// `config.scheme` is [`SchemeKind::Disabled`].
    pub fn new(config: Config) -> Result<Option<Fec>> {
        let scheme: Option<scheme::Scheme> = config.scheme.into();
        let scheme = match scheme {
            Some(scheme) => scheme,
            None => return Ok(None),
        };

        let controller = controller::Controller::constant(config.window_size, config.repair_count)?;

        Ok(Some(Fec {
            sender: Sender::new(config, scheme, controller),
            receiver: Receiver::new(config, scheme),
        }))
    }

    pub fn sender(&mut self) -> &mut Sender {
        &mut self.sender
    }

    pub fn receiver(&mut self) -> &mut Receiver {
        &mut self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemeKind;

    #[test]
    fn disabled_scheme_builds_nothing() {
        let config = Config::new(SchemeKind::Disabled, 64).unwrap();
        assert!(Fec::new(config).unwrap().is_none());
    }

    #[test]
    fn enabled_scheme_builds_both_halves() {
        let config = Config::new(SchemeKind::Xor, 64).unwrap();
        let fec = Fec::new(config).unwrap();
        assert!(fec.is_some());
    }
}

/// End-to-end scenarios exercising the sender and receiver together, one
/// per case from the protocol's test plan. These sit above the per-module
/// unit tests: each one drives a whole round trip through preprocessing,
/// splitting, loss, repair generation and recovery.
#[cfg(test)]
mod scenarios {
    use crate::block::BlockSourceID;
    use crate::config::SchemeKind;
    use crate::controller::Controller;
    use crate::receiver::Receiver;
    use crate::scheme::Scheme;
    use crate::sender::Sender;
    use crate::symbol;
    use crate::Config;

    const E: u16 = 8;

    /// Six bytes of protectable frame content: with a single-byte VarInt
    /// packet number this preprocesses to exactly one `E = 8` symbol, so
    /// "one packet" and "one symbol" coincide and the scenarios below can
    /// talk about dropping a packet's carrier without worrying about a
    /// packet spanning more than one symbol.
    fn frames(tag: u8) -> Vec<u8> {
        vec![tag; 6]
    }

    struct Link {
        sender: Sender,
        receiver: Receiver,
    }

    impl Link {
        fn new(k: u32, r: u32, scheme_kind: SchemeKind) -> Link {
            let config = Config::new(scheme_kind, E).unwrap().with_window(k, r).unwrap();
            let controller = Controller::constant(k, r).unwrap();
            let scheme = Option::<Scheme>::from(scheme_kind).unwrap();
            Link {
                sender: Sender::new(config, scheme, controller),
                receiver: Receiver::new(config, scheme),
            }
        }

        /// Protects `pn`'s frames on the sender and returns the ID the
        /// sender assigned plus the preprocessed bytes a downstream parser
        /// would independently recompute from the same carried frames.
        fn protect(&mut self, pn: u64) -> (BlockSourceID, Vec<u8>) {
            let f = frames(pn as u8);
            let pre = symbol::preprocess(pn, &f, E).unwrap().unwrap();
            let id = self.sender.protect_payload(pn, &f).unwrap().unwrap();
            (id, pre)
        }

        fn deliver_source(&mut self, pn: u64, id: BlockSourceID, pre: &[u8]) {
            self.receiver.receive_source_payload(pn, pre, id).unwrap();
        }

        fn deliver_all_repair(&mut self) {
            while let Some(frame) = self.sender.take_repair_frame(1500).unwrap() {
                self.receiver.handle_repair_frame(frame);
            }
        }
    }

    #[test]
    fn xor_single_loss_recovers_the_dropped_packet() {
        crate::testing::init();
        let mut link = Link::new(3, 1, SchemeKind::Xor);

        let (id1, pre1) = link.protect(1);
        let (id2, pre2) = link.protect(2);
        let (id3, pre3) = link.protect(3);

        // the carrier of pn=2 is dropped
        link.deliver_source(1, id1, &pre1);
        link.deliver_source(3, id3, &pre3);
        let _ = (id2, &pre2);
        link.deliver_all_repair();

        let recovered = link.receiver.take_recovered_packet().expect("one packet recovered");
        assert_eq!(recovered.pn, 2);
        // `reassemble` strips the packet-number VarInt it parsed off the
        // front of the payload, so only the frame content remains.
        assert_eq!(recovered.payload, frames(2));
        let _ = &pre2;
        assert!(link.receiver.take_recovered_packet().is_none());

        let frame = link.receiver.take_recovered_frame(1500).expect("a RECOVERED frame is owed");
        assert_eq!(frame.pns, vec![2]);
    }

    #[test]
    fn xor_no_loss_recovers_nothing() {
        crate::testing::init();
        let mut link = Link::new(3, 1, SchemeKind::Xor);

        let (id1, pre1) = link.protect(1);
        let (id2, pre2) = link.protect(2);
        let (id3, pre3) = link.protect(3);

        link.deliver_source(1, id1, &pre1);
        link.deliver_source(2, id2, &pre2);
        link.deliver_source(3, id3, &pre3);
        link.deliver_all_repair();

        assert!(link.receiver.take_recovered_packet().is_none());
        assert!(link.receiver.take_recovered_frame(1500).is_none());
        // the block completed (every source and repair symbol arrived) and
        // was dropped from the open-block set; nothing is left to evict.
        assert!(!link.receiver.is_block_open(0));
    }

    #[test]
    fn xor_double_loss_recovers_nothing_and_keeps_the_block() {
        crate::testing::init();
        let mut link = Link::new(3, 1, SchemeKind::Xor);

        let (id1, pre1) = link.protect(1);
        let (id2, pre2) = link.protect(2);
        let (id3, pre3) = link.protect(3);
        let _ = (&pre2, &pre3);

        // pn=2 and pn=3 both dropped: only one of three source symbols
        // plus the single repair symbol arrive, short of what XOR needs.
        link.deliver_source(1, id1, &pre1);
        link.deliver_all_repair();

        assert!(link.receiver.take_recovered_packet().is_none());
        assert!(link.receiver.take_recovered_frame(1500).is_none());
        assert!(link.receiver.is_block_open(0));
        let _ = id2;
        let _ = id3;
    }

    #[test]
    fn reed_solomon_recovers_up_to_r_losses() {
        crate::testing::init();
        let mut link = Link::new(5, 2, SchemeKind::ReedSolomon);

        let protected: Vec<(u64, BlockSourceID, Vec<u8>)> =
            (1..=5).map(|pn| { let (id, pre) = link.protect(pn); (pn, id, pre) }).collect();

        // drop pn=2 and pn=4 (offsets 1 and 3): exactly r losses
        for (pn, id, pre) in &protected {
            if *pn != 2 && *pn != 4 {
                link.deliver_source(*pn, *id, pre);
            }
        }
        link.deliver_all_repair();

        let mut recovered = Vec::new();
        while let Some(p) = link.receiver.take_recovered_packet() {
            recovered.push(p.pn);
        }
        recovered.sort_unstable();
        assert_eq!(recovered, vec![2, 4]);

        let frame = link.receiver.take_recovered_frame(1500).expect("a RECOVERED frame is owed");
        assert_eq!(frame.pns, vec![2, 4]);
    }

    #[test]
    fn cross_block_recoveries_are_independent() {
        crate::testing::init();
        let mut link = Link::new(3, 1, SchemeKind::Xor);

        // block 0: pn 1..3, drop pn=2 (offset 1)
        let (id1, pre1) = link.protect(1);
        let (id2, pre2) = link.protect(2);
        let (id3, pre3) = link.protect(3);
        // block 1: pn 4..6, drop pn=5 (offset 1)
        let (id4, pre4) = link.protect(4);
        let (id5, pre5) = link.protect(5);
        let (id6, pre6) = link.protect(6);

        // interleave delivery across both blocks, repair frames last
        link.deliver_source(4, id4, &pre4);
        link.deliver_source(1, id1, &pre1);
        link.deliver_source(6, id6, &pre6);
        link.deliver_source(3, id3, &pre3);
        let _ = (&pre2, &pre5);

        link.deliver_all_repair();

        let mut recovered: Vec<u64> = std::iter::from_fn(|| link.receiver.take_recovered_packet())
            .map(|p| p.pn)
            .collect();
        recovered.sort_unstable();
        assert_eq!(recovered, vec![2, 5]);
        let _ = id2;
        let _ = id5;
    }

    #[test]
    fn repair_frame_budget_gates_on_exact_wire_length() {
        crate::testing::init();

        let mut probe = Link::new(2, 1, SchemeKind::Xor);
        let (id1, pre1) = probe.protect(1);
        let (id2, pre2) = probe.protect(2);
        let _ = (id1, &pre1, id2, &pre2);
        let exact = probe.sender.take_repair_frame(usize::MAX).unwrap().unwrap().wire_len();

        let mut link = Link::new(2, 1, SchemeKind::Xor);
        link.protect(1);
        link.protect(2);

        assert_eq!(link.sender.take_repair_frame(exact - 1).unwrap(), None);
        let frame = link.sender.take_repair_frame(exact).unwrap().unwrap();
        assert_eq!(frame.symbols.len(), 1);
    }
}
