// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ringbuf::ringbuf_entry_root as ringbuf_entry;

use crate::dpcd;
use crate::{AuxRw, DpError, Trace};

/// Main-link symbol rates defined through DisplayPort 1.2. Discriminants
/// are the DPCD bandwidth codes, which express the rate in units of
/// 27 MHz.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum LinkRate {
    /// Reduced bit rate, 1.62 Gbps per lane.
    Rbr = 0x06,
    /// High bit rate, 2.7 Gbps per lane.
    Hbr = 0x0a,
    /// High bit rate 2, 5.4 Gbps per lane.
    Hbr2 = 0x14,
}

impl LinkRate {
    /// Decodes a DPCD bandwidth code.
    pub fn from_bw_code(code: u8) -> Result<Self, DpError> {
        Self::from_u8(code).ok_or(DpError::UnsupportedLinkRate(code))
    }

    /// The DPCD bandwidth code for this rate.
    pub fn bw_code(self) -> u8 {
        self as u8
    }

    /// Symbol rate in kHz.
    pub fn khz(self) -> u32 {
        u32::from(self as u8) * 27_000
    }

    /// The next rate down when training fails at this one.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::Rbr => None,
            Self::Hbr => Some(Self::Rbr),
            Self::Hbr2 => Some(Self::Hbr),
        }
    }
}

/// Sink capabilities from the receiver capability block, fixed once probed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinkCaps {
    pub max_rate: LinkRate,
    pub max_lanes: u8,
    /// Sink supports enhanced framing symbol sequences.
    pub enhanced_framing: bool,
    /// Sink supports training pattern 3 for channel equalization.
    pub tps3_supported: bool,
    /// Sink supports training without the AUX handshake.
    pub fast_training: bool,
    /// Sink supports ANSI 8B/10B channel coding.
    pub channel_coding: bool,
}

/// Per-lane drive levels, one slot per possible lane. Levels run `0..=3`
/// with 3 the hardware maximum.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrainingSet {
    pub voltage_swing: [u8; 4],
    pub pre_emphasis: [u8; 4],
    pub post_cursor: [u8; 4],
}

/// Training patterns the source can drive on the main link.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrainingPattern {
    Disabled = 0,
    Tps1 = 1,
    Tps2 = 2,
    Tps3 = 3,
}

impl Default for TrainingPattern {
    fn default() -> Self {
        Self::Disabled
    }
}

/// Training state for one link: the levels we are driving (`request`), the
/// levels the sink last asked for (`adjust`), the pattern on the wire, and
/// the outcome flags. This survives across training sessions so that a
/// sink which supports it can be retrained without the AUX handshake.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkTrain {
    pub request: TrainingSet,
    pub adjust: TrainingSet,
    pub pattern: TrainingPattern,
    pub clock_recovered: bool,
    pub channel_equalized: bool,
}

impl LinkTrain {
    /// Folds the sink's most recent adjustment requests into the levels we
    /// will drive next, per lane and per parameter.
    pub fn apply_adjustments(&mut self) {
        for i in 0..4 {
            if self.request.voltage_swing[i] != self.adjust.voltage_swing[i] {
                self.request.voltage_swing[i] = self.adjust.voltage_swing[i];
            }
            if self.request.pre_emphasis[i] != self.adjust.pre_emphasis[i] {
                self.request.pre_emphasis[i] = self.adjust.pre_emphasis[i];
            }
            if self.request.post_cursor[i] != self.adjust.post_cursor[i] {
                self.request.post_cursor[i] = self.adjust.post_cursor[i];
            }
        }
    }

    /// True if the levels in `request` come from a training run that
    /// completed successfully.
    pub fn valid(&self) -> bool {
        self.clock_recovered && self.channel_equalized
    }

    /// Returns to the initial state. Every full-training attempt starts
    /// here, including retries after a rate downgrade.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Negotiated state of one DisplayPort main link, built by [`DpLink::probe`]
/// and owned exclusively by whoever drives training.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DpLink {
    /// DPCD revision of the sink, BCD (`0x12` = DPCD 1.2).
    pub revision: u8,
    /// Symbol rate currently configured or being negotiated.
    pub rate: LinkRate,
    /// Active lane count: 1, 2, or 4.
    pub lanes: u8,
    pub caps: LinkCaps,
    pub train: LinkTrain,
    /// Raw TRAINING_AUX_RD_INTERVAL value, in units of 4 ms; 0 means the
    /// per-pattern default applies.
    aux_rd_interval: u8,
}

impl DpLink {
    /// Reads the receiver capability block and builds a link descriptor
    /// from it, starting at the sink's maximum rate and lane count.
    pub fn probe<A: AuxRw>(aux: &A) -> Result<Self, DpError> {
        let mut values = [0u8; dpcd::RECEIVER_CAP_SIZE];
        aux.read_dpcd(dpcd::DPCD_REV, &mut values)?;

        let revision = values[dpcd::DPCD_REV as usize];
        let max_rate =
            LinkRate::from_bw_code(values[dpcd::MAX_LINK_RATE as usize])?;

        let lane_byte = values[dpcd::MAX_LANE_COUNT as usize];
        let max_lanes = lane_byte & dpcd::MAX_LANE_COUNT_MASK;
        if !matches!(max_lanes, 1 | 2 | 4) {
            return Err(DpError::BadLaneCount(max_lanes));
        }

        let link = Self {
            revision,
            rate: max_rate,
            lanes: max_lanes,
            caps: LinkCaps {
                max_rate,
                max_lanes,
                enhanced_framing: lane_byte & dpcd::ENHANCED_FRAME_CAP != 0,
                tps3_supported: lane_byte & dpcd::TPS3_SUPPORTED != 0,
                fast_training: values[dpcd::MAX_DOWNSPREAD as usize]
                    & dpcd::NO_AUX_HANDSHAKE_LINK_TRAINING
                    != 0,
                channel_coding: values[dpcd::MAIN_LINK_CHANNEL_CODING as usize]
                    & dpcd::CAP_ANSI_8B10B
                    != 0,
            },
            train: LinkTrain::default(),
            aux_rd_interval: values[dpcd::TRAINING_AUX_RD_INTERVAL as usize]
                & dpcd::TRAINING_AUX_RD_MASK,
        };

        ringbuf_entry!(Trace::Probe {
            revision,
            rate: link.rate,
            lanes: link.lanes,
        });
        Ok(link)
    }

    /// Puts the sink's main-link circuitry into the D0 power state. DPCD
    /// 1.0 sinks have no power-state register, so this is a no-op there.
    pub fn power_up<A: AuxRw>(&self, aux: &A) -> Result<(), DpError> {
        if self.revision < 0x11 {
            return Ok(());
        }
        self.set_power(aux, dpcd::SET_POWER_D0)?;
        // The sink can take a millisecond to come back from D3.
        aux.sleep_us(1_000);
        ringbuf_entry!(Trace::PowerUp);
        Ok(())
    }

    /// Puts the sink's main-link circuitry into the D3 power state.
    pub fn power_down<A: AuxRw>(&self, aux: &A) -> Result<(), DpError> {
        if self.revision < 0x11 {
            return Ok(());
        }
        self.set_power(aux, dpcd::SET_POWER_D3)?;
        ringbuf_entry!(Trace::PowerDown);
        Ok(())
    }

    fn set_power<A: AuxRw>(&self, aux: &A, state: u8) -> Result<(), DpError> {
        let mut value = [0u8; 1];
        aux.read_dpcd(dpcd::SET_POWER, &mut value)?;
        value[0] = (value[0] & !dpcd::SET_POWER_MASK) | state;
        aux.write_dpcd(dpcd::SET_POWER, &value)
    }

    /// Drops to the next lower symbol rate after a failed training attempt.
    /// Lane count is never traded against rate.
    pub fn downgrade(&mut self) -> Result<(), DpError> {
        match self.rate.fallback() {
            Some(rate) => {
                self.rate = rate;
                Ok(())
            }
            None => Err(DpError::LinkRateExhausted),
        }
    }

    /// Delay between driving a training pattern and trusting the sink's
    /// status, in microseconds: the larger of the pattern's fixed minimum
    /// and the interval the sink advertised at probe.
    pub fn training_wait_us(&self) -> u64 {
        let min = match self.train.pattern {
            TrainingPattern::Disabled => 0,
            TrainingPattern::Tps1 => 100,
            TrainingPattern::Tps2 | TrainingPattern::Tps3 => 400,
        };
        min.max(u64::from(self.aux_rd_interval) * 4_000)
    }

    /// True when the post-cursor drive parameter is in play. It exists
    /// only on DPCD 1.2+ sinks and only applies at HBR2.
    pub fn post_cursor_active(&self) -> bool {
        self.revision >= 0x12 && self.rate == LinkRate::Hbr2
    }
}
