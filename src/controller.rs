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

//! Redundancy controller: decides when a block closes and how many repair
//! symbols it gets.
//!
//! Only the constant policy is implemented here — fixed `k` source symbols
//! per block, fixed `r` repair symbols per block, no feedback from
//! acknowledgements or losses. `on_loss`/`on_ack` exist as the seam a
//! future adaptive controller would hook into; the constant controller
//! ignores both.

use crate::Error;
use crate::Result;

/// A policy deciding block closure and repair symbol counts.
///
/// The only implementation today is [`Controller::Constant`]; the enum
/// exists so a caller never has to special-case "no controller" and so
/// that adding an adaptive policy later doesn't change the call sites in
/// [`crate::sender::Sender`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Controller {
    /// Close every block at exactly `k` source symbols and generate
    /// exactly `r` repair symbols, regardless of observed loss.
    Constant { k: u32, r: u32 },
}

impl Controller {
    pub fn constant(k: u32, r: u32) -> Result<Controller> {
        if k == 0 {
            return Err(Error::InvalidController);
        }

        Ok(Controller::Constant { k, r })
    }

    /// Whether a block currently holding `present_source` source symbols
    /// should be closed now.
    pub fn should_close(&self, present_source: u32) -> bool {
        match self {
            Controller::Constant { k, .. } => present_source >= *k,
        }
    }

    /// How many repair symbols a block should receive once closed.
    pub fn repair_count(&self) -> u32 {
        match self {
            Controller::Constant { r, .. } => *r,
        }
    }

    pub fn window_size(&self) -> u32 {
        match self {
            Controller::Constant { k, .. } => *k,
        }
    }

    /// Feedback hook for a lost source or repair symbol. No-op for the
    /// constant policy.
    pub fn on_loss(&mut self, _block_number: crate::block::BlockNumber) {}

    /// Feedback hook for an acknowledged source symbol. No-op for the
    /// constant policy.
    pub fn on_ack(&mut self, _block_number: crate::block::BlockNumber) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_window() {
        assert_eq!(Controller::constant(0, 1), Err(Error::InvalidController));
    }

    #[test]
    fn closes_once_window_reached() {
        let c = Controller::constant(5, 1).unwrap();
        assert!(!c.should_close(4));
        assert!(c.should_close(5));
        assert!(c.should_close(6));
    }

    #[test]
    fn reports_configured_repair_count() {
        let c = Controller::constant(5, 2).unwrap();
        assert_eq!(c.repair_count(), 2);
        assert_eq!(c.window_size(), 5);
    }
}
