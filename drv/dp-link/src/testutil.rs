// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted AUX and PHY fakes for exercising the engine on the host.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use crate::dpcd;
use crate::{AuxRw, DpError, DpLink, DpPhy};

/// A scripted DPCD endpoint: a sparse register file, plus a queue of
/// link-status blocks served in order to successive status reads. The last
/// block keeps being served once the queue is down to one.
#[derive(Default)]
pub struct FakeAux {
    pub regs: RefCell<BTreeMap<u32, u8>>,
    pub status: RefCell<VecDeque<[u8; dpcd::LINK_STATUS_SIZE]>>,
    /// Every write, in order, as (address, bytes).
    pub writes: RefCell<Vec<(u32, Vec<u8>)>>,
    pub status_reads: Cell<usize>,
    pub slept_us: Cell<u64>,
    /// Fail any read touching this address.
    pub fail_read: Cell<Option<u32>>,
    /// Fail any write touching this address.
    pub fail_write: Cell<Option<u32>>,
}

impl FakeAux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reg(&self, addr: u32, value: u8) {
        self.regs.borrow_mut().insert(addr, value);
    }

    pub fn push_status(&self, block: [u8; dpcd::LINK_STATUS_SIZE]) {
        self.status.borrow_mut().push_back(block);
    }

    /// All writes made to `addr`, in order.
    pub fn writes_to(&self, addr: u32) -> Vec<Vec<u8>> {
        self.writes
            .borrow()
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl AuxRw for FakeAux {
    fn read_dpcd(&self, addr: u32, buf: &mut [u8]) -> Result<(), DpError> {
        if self.fail_read.get() == Some(addr) {
            return Err(DpError::AuxTimeout);
        }
        if addr == dpcd::LANE0_1_STATUS && buf.len() == dpcd::LINK_STATUS_SIZE {
            self.status_reads.set(self.status_reads.get() + 1);
            let mut queue = self.status.borrow_mut();
            let block = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                *queue.front().expect("test scripted no status block")
            };
            buf.copy_from_slice(&block);
            return Ok(());
        }
        let regs = self.regs.borrow();
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = regs.get(&(addr + i as u32)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_dpcd(&self, addr: u32, buf: &[u8]) -> Result<(), DpError> {
        if self.fail_write.get() == Some(addr) {
            return Err(DpError::AuxTimeout);
        }
        let mut regs = self.regs.borrow_mut();
        for (i, byte) in buf.iter().enumerate() {
            regs.insert(addr + i as u32, *byte);
        }
        self.writes.borrow_mut().push((addr, buf.to_vec()));
        Ok(())
    }

    fn sleep_us(&self, us: u64) {
        self.slept_us.set(self.slept_us.get() + us);
    }
}

/// Counts hook invocations, optionally failing configuration.
#[derive(Default)]
pub struct FakePhy {
    pub configures: usize,
    pub applies: usize,
    pub fail_configure: bool,
}

impl DpPhy for FakePhy {
    fn configure_link(&mut self, _link: &DpLink) -> Result<(), DpError> {
        self.configures += 1;
        if self.fail_configure {
            return Err(DpError::PhyConfigFailed);
        }
        Ok(())
    }

    fn apply_training(&mut self, _link: &DpLink) -> Result<(), DpError> {
        self.applies += 1;
        Ok(())
    }
}

/// Loads a capability block for a fully-featured DPCD 1.2 sink: HBR2, four
/// lanes, TPS3, enhanced framing, 8B/10B coding, no fast training, no read
/// interval hint.
pub fn script_hbr2_caps(aux: &FakeAux) {
    aux.set_reg(dpcd::DPCD_REV, 0x12);
    aux.set_reg(dpcd::MAX_LINK_RATE, 0x14);
    aux.set_reg(
        dpcd::MAX_LANE_COUNT,
        4 | dpcd::TPS3_SUPPORTED | dpcd::ENHANCED_FRAME_CAP,
    );
    aux.set_reg(dpcd::MAIN_LINK_CHANNEL_CODING, dpcd::CAP_ANSI_8B10B);
}

/// Probes a link out of [`script_hbr2_caps`].
pub fn hbr2_link(aux: &FakeAux) -> DpLink {
    script_hbr2_caps(aux);
    DpLink::probe(aux).unwrap()
}

/// Builds a status block whose active lanes all report `nibble`, with the
/// given alignment flag and per-lane voltage-swing/pre-emphasis request
/// levels.
pub fn status_block(
    lanes: u8,
    nibble: u8,
    aligned: bool,
    vs: u8,
    pe: u8,
) -> [u8; dpcd::LINK_STATUS_SIZE] {
    let mut block = [0u8; dpcd::LINK_STATUS_SIZE];
    for lane in 0..lanes {
        block[usize::from(lane / 2)] |= (nibble & 0xf) << ((lane % 2) * 4);
        let req = (vs & 0x3) | ((pe & 0x3) << 2);
        block[usize::from(4 + lane / 2)] |= req << ((lane % 2) * 4);
    }
    if aligned {
        block[2] |= dpcd::INTERLANE_ALIGN_DONE;
    }
    block
}

/// Four lanes reporting nothing.
pub fn nothing_done() -> [u8; dpcd::LINK_STATUS_SIZE] {
    status_block(4, 0, false, 0, 0)
}

/// Four lanes with clock recovery only.
pub fn cr_done() -> [u8; dpcd::LINK_STATUS_SIZE] {
    status_block(4, dpcd::LANE_CR_DONE, false, 0, 0)
}

/// Four lanes fully trained and aligned.
pub fn all_done() -> [u8; dpcd::LINK_STATUS_SIZE] {
    status_block(
        4,
        dpcd::LANE_CR_DONE
            | dpcd::LANE_CHANNEL_EQ_DONE
            | dpcd::LANE_SYMBOL_LOCKED,
        true,
        0,
        0,
    )
}
