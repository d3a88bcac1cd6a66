// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DisplayPort link training over an AUX-channel transport.
//!
//! This crate negotiates the operating parameters of a DisplayPort main
//! link (symbol rate, lane count, per-lane drive levels) with a sink by
//! running the clock-recovery and channel-equalization handshake through
//! the sink's DPCD registers, downgrading the rate until the link trains
//! or the rate table runs out. Sinks that advertise it can instead be
//! retrained from cached levels without the handshake.
//!
//! It relies on two traits the caller must implement: [`AuxRw`], an
//! abstraction over AUX-channel register access, and [`DpPhy`], the hooks
//! that retune the source PHY as link parameters change.
//!
//! Everything here blocks, and nothing is shared: a caller that manages
//! several links serializes training sessions itself.

#![cfg_attr(not(test), no_std)]

pub mod dpcd;
mod link;
mod train;

#[cfg(test)]
mod testutil;

use ringbuf::*;

pub use link::{
    DpLink, LinkCaps, LinkRate, LinkTrain, TrainingPattern, TrainingSet,
};
pub use train::{LinkTrainer, TrainingState};

////////////////////////////////////////////////////////////////////////////////

/// Errors out of the training engine and the transports under it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DpError {
    /// The sink did not answer an AUX transaction in time.
    AuxTimeout,
    /// The sink rejected an AUX transaction.
    AuxNack,
    /// The sink kept deferring an AUX transaction until the transport
    /// gave up retrying.
    AuxDefer,
    /// An AUX reply carried fewer bytes than requested.
    AuxShortTransfer,
    /// The source PHY failed to apply a requested configuration.
    PhyConfigFailed,
    /// MAX_LINK_RATE advertised a bandwidth code this engine doesn't speak.
    UnsupportedLinkRate(u8),
    /// MAX_LANE_COUNT was something other than 1, 2, or 4.
    BadLaneCount(u8),
    /// The sink did not confirm lock after no-handshake training.
    FastTrainingFailed,
    /// Training failed at the bottom of the rate table.
    LinkRateExhausted,
}

////////////////////////////////////////////////////////////////////////////////

/// Trait implementing AUX-channel register access to one sink, plus the
/// blocking delay the training handshake is built around.
pub trait AuxRw {
    /// Reads `buf.len()` bytes of DPCD starting at `addr`. Implementations
    /// must fill the whole buffer or fail.
    fn read_dpcd(&self, addr: u32, buf: &mut [u8]) -> Result<(), DpError>;

    /// Writes `buf` to DPCD starting at `addr`.
    fn write_dpcd(&self, addr: u32, buf: &[u8]) -> Result<(), DpError>;

    /// Blocks for at least `us` microseconds.
    fn sleep_us(&self, us: u64);
}

/// Source-side hooks, invoked as link parameters change: once per link
/// configuration with the negotiated rate and lane count, and before every
/// training-pattern write with the latest drive levels.
pub trait DpPhy {
    fn configure_link(&mut self, link: &DpLink) -> Result<(), DpError>;
    fn apply_training(&mut self, link: &DpLink) -> Result<(), DpError>;
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Probe {
        revision: u8,
        rate: LinkRate,
        lanes: u8,
    },
    PowerUp,
    PowerDown,
    Train {
        revision: u8,
        rate: LinkRate,
        lanes: u8,
    },
    FastTraining {
        rate: LinkRate,
        lanes: u8,
    },
    FastTrainingFailed(DpError),
    FullTraining {
        rate: LinkRate,
        lanes: u8,
    },
    State(TrainingState),
    ClockRecoveryLost,
    Downgrade {
        from: LinkRate,
        to: LinkRate,
    },
}
ringbuf!(Trace, 32, Trace::None);
