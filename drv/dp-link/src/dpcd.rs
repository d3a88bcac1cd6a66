// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DisplayPort Configuration Data (DPCD) register map, plus helpers for
//! picking apart the link-status block.
//!
//! Addresses and bit positions here are fixed by the DisplayPort standard.
//! Both ends of the AUX channel interpret them identically, so none of this
//! is configurable.

// Receiver capability field, read as one block at probe time.
pub const DPCD_REV: u32 = 0x000;
pub const MAX_LINK_RATE: u32 = 0x001;
pub const MAX_LANE_COUNT: u32 = 0x002;
pub const MAX_LANE_COUNT_MASK: u8 = 0x1f;
pub const TPS3_SUPPORTED: u8 = 1 << 6;
pub const ENHANCED_FRAME_CAP: u8 = 1 << 7;
pub const MAX_DOWNSPREAD: u32 = 0x003;
pub const NO_AUX_HANDSHAKE_LINK_TRAINING: u8 = 1 << 6;
pub const MAIN_LINK_CHANNEL_CODING: u32 = 0x006;
pub const CAP_ANSI_8B10B: u8 = 1 << 0;
pub const TRAINING_AUX_RD_INTERVAL: u32 = 0x00e;
pub const TRAINING_AUX_RD_MASK: u8 = 0x7f;

/// Size of the capability block starting at `DPCD_REV`.
pub const RECEIVER_CAP_SIZE: usize = 0xf;

// Link configuration field.
pub const LINK_BW_SET: u32 = 0x100;
pub const LANE_COUNT_SET: u32 = 0x101;
pub const LANE_COUNT_ENHANCED_FRAME_EN: u8 = 1 << 7;
pub const TRAINING_PATTERN_SET: u32 = 0x102;
pub const LINK_SCRAMBLING_DISABLE: u8 = 1 << 5;
pub const TRAINING_LANE0_SET: u32 = 0x103;
pub const TRAIN_PRE_EMPHASIS_SHIFT: u8 = 3;
pub const TRAIN_MAX_SWING_REACHED: u8 = 1 << 2;
pub const TRAIN_MAX_PRE_EMPHASIS_REACHED: u8 = 1 << 5;
pub const MAIN_LINK_CHANNEL_CODING_SET: u32 = 0x108;
pub const SET_ANSI_8B10B: u8 = 1 << 0;
/// Post-cursor levels, two lanes per byte (low nibble even lane, high
/// nibble odd lane), each nibble holding the level and a max-reached flag.
pub const TRAINING_LANE0_1_SET2: u32 = 0x10f;
pub const TRAIN_MAX_POST_CURSOR2_REACHED: u8 = 1 << 2;

/// Highest drive level for swing, pre-emphasis, and post-cursor alike.
pub const TRAIN_LEVEL_MAX: u8 = 3;

// Link/sink status field. The six bytes starting at `LANE0_1_STATUS` hold
// per-lane status nibbles, alignment status, sink event status, and the
// per-lane voltage-swing/pre-emphasis adjustment requests.
pub const LANE0_1_STATUS: u32 = 0x202;
pub const LINK_STATUS_SIZE: usize = 6;
pub const LANE_CR_DONE: u8 = 1 << 0;
pub const LANE_CHANNEL_EQ_DONE: u8 = 1 << 1;
pub const LANE_SYMBOL_LOCKED: u8 = 1 << 2;
pub const INTERLANE_ALIGN_DONE: u8 = 1 << 0;
/// Post-cursor adjustment requests sit outside the contiguous status
/// block, all four lanes packed two bits each into one byte.
pub const ADJUST_REQUEST_POST_CURSOR2: u32 = 0x20c;

// Sink device power control, present on DPCD 1.1 and later.
pub const SET_POWER: u32 = 0x600;
pub const SET_POWER_MASK: u8 = 0x3;
pub const SET_POWER_D0: u8 = 0x1;
pub const SET_POWER_D3: u8 = 0x2;

/// Returns the 4-bit status nibble for `lane` from a raw status block.
/// Lanes 0 and 1 share the first byte, lanes 2 and 3 the second.
pub fn lane_status(status: &[u8; LINK_STATUS_SIZE], lane: u8) -> u8 {
    let byte = status[usize::from(lane / 2)];
    (byte >> ((lane % 2) * 4)) & 0xf
}

/// True if every active lane reports clock recovery done.
pub fn clock_recovery_ok(status: &[u8; LINK_STATUS_SIZE], lanes: u8) -> bool {
    (0..lanes).all(|lane| lane_status(status, lane) & LANE_CR_DONE != 0)
}

/// True if the sink reports inter-lane alignment and every active lane has
/// clock recovery, symbol lock, and channel equalization.
pub fn channel_eq_ok(status: &[u8; LINK_STATUS_SIZE], lanes: u8) -> bool {
    const LANE_DONE: u8 =
        LANE_CR_DONE | LANE_CHANNEL_EQ_DONE | LANE_SYMBOL_LOCKED;
    if status[2] & INTERLANE_ALIGN_DONE == 0 {
        return false;
    }
    (0..lanes).all(|lane| lane_status(status, lane) & LANE_DONE == LANE_DONE)
}

/// Voltage-swing level the sink is requesting for `lane`, from the
/// adjustment-request bytes at the end of the status block.
pub fn adjust_request_voltage(
    status: &[u8; LINK_STATUS_SIZE],
    lane: u8,
) -> u8 {
    let byte = status[usize::from(4 + lane / 2)];
    (byte >> ((lane % 2) * 4)) & 0x3
}

/// Pre-emphasis level the sink is requesting for `lane`.
pub fn adjust_request_pre_emphasis(
    status: &[u8; LINK_STATUS_SIZE],
    lane: u8,
) -> u8 {
    let byte = status[usize::from(4 + lane / 2)];
    (byte >> ((lane % 2) * 4 + 2)) & 0x3
}

/// Post-cursor level the sink is requesting for `lane`, from the raw
/// `ADJUST_REQUEST_POST_CURSOR2` byte.
pub fn adjust_request_post_cursor(value: u8, lane: u8) -> u8 {
    (value >> (lane * 2)) & 0x3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_status_splits_nibbles() {
        let status = [0x21, 0x43, 0, 0, 0, 0];
        assert_eq!(lane_status(&status, 0), 0x1);
        assert_eq!(lane_status(&status, 1), 0x2);
        assert_eq!(lane_status(&status, 2), 0x3);
        assert_eq!(lane_status(&status, 3), 0x4);
    }

    /// Clock recovery is only done when every active lane says so.
    #[test]
    fn clock_recovery_needs_every_lane() {
        let mut status = [0u8; LINK_STATUS_SIZE];
        status[0] = 0x11; // lanes 0 and 1
        status[1] = 0x01; // lane 2 only
        assert!(clock_recovery_ok(&status, 2));
        assert!(!clock_recovery_ok(&status, 4));
        status[1] = 0x11;
        assert!(clock_recovery_ok(&status, 4));
    }

    /// Per-lane bits are not enough for equalization; the sink must also
    /// report inter-lane alignment.
    #[test]
    fn channel_eq_requires_alignment() {
        let mut status = [0x77, 0x77, 0, 0, 0, 0];
        assert!(!channel_eq_ok(&status, 4));
        status[2] = INTERLANE_ALIGN_DONE;
        assert!(channel_eq_ok(&status, 4));
        // Symbol lock missing on lane 3.
        status[1] = 0x37;
        assert!(!channel_eq_ok(&status, 4));
        assert!(channel_eq_ok(&status, 2));
    }

    #[test]
    fn adjust_requests_split_fields() {
        let mut status = [0u8; LINK_STATUS_SIZE];
        // Lane 0: swing 1, pre-emphasis 2. Lane 1: swing 3, pre-emphasis 0.
        status[4] = 0b0011_1001;
        // Lane 2: swing 0, pre-emphasis 1. Lane 3: swing 2, pre-emphasis 3.
        status[5] = 0b1110_0100;
        assert_eq!(adjust_request_voltage(&status, 0), 1);
        assert_eq!(adjust_request_pre_emphasis(&status, 0), 2);
        assert_eq!(adjust_request_voltage(&status, 1), 3);
        assert_eq!(adjust_request_pre_emphasis(&status, 1), 0);
        assert_eq!(adjust_request_voltage(&status, 2), 0);
        assert_eq!(adjust_request_pre_emphasis(&status, 2), 1);
        assert_eq!(adjust_request_voltage(&status, 3), 2);
        assert_eq!(adjust_request_pre_emphasis(&status, 3), 3);
    }

    #[test]
    fn post_cursor_packs_four_lanes() {
        let value = 0b11_10_01_00;
        assert_eq!(adjust_request_post_cursor(value, 0), 0);
        assert_eq!(adjust_request_post_cursor(value, 1), 1);
        assert_eq!(adjust_request_post_cursor(value, 2), 2);
        assert_eq!(adjust_request_post_cursor(value, 3), 3);
    }
}
