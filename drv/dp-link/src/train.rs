// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ringbuf::ringbuf_entry_root as ringbuf_entry;

use crate::dpcd;
use crate::link::{DpLink, TrainingPattern};
use crate::{AuxRw, DpError, DpPhy, Trace};

/// Rounds of apply/check each training phase gets before giving up.
const TRAINING_ATTEMPTS: usize = 4;

/// Settle time after each pattern during no-handshake training, in
/// microseconds.
const FAST_TRAINING_WAIT_US: u64 = 500;

/// Progress of a training session, recorded to the trace buffer at each
/// transition. The quiescent no-session state has no variant; a
/// [`LinkTrainer`] only exists for the duration of one session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrainingState {
    Configuring,
    ClockRecovery,
    ChannelEqualization,
    Downgrading,
    Success,
    Exhausted,
}

/// Drives link training over an AUX transport and a source PHY. The
/// trainer holds exclusive borrows of all three parties for a session, so
/// nothing else can touch the link state mid-train.
pub struct LinkTrainer<'a, A, P> {
    pub aux: &'a mut A,
    pub phy: &'a mut P,
    pub link: &'a mut DpLink,
}

impl<'a, A: AuxRw, P: DpPhy> LinkTrainer<'a, A, P> {
    pub fn new(aux: &'a mut A, phy: &'a mut P, link: &'a mut DpLink) -> Self {
        Self { aux, phy, link }
    }

    /// Trains the link at its current rate and lane count, downgrading the
    /// rate as attempts fail. A sink that supports training without the
    /// AUX handshake, and whose cached drive levels are known good, gets
    /// the short path first; any failure there falls back to the full
    /// handshake. The last AUX write of every session, whatever the
    /// outcome, disables the training pattern.
    pub fn train(&mut self) -> Result<(), DpError> {
        ringbuf_entry!(Trace::Train {
            revision: self.link.revision,
            rate: self.link.rate,
            lanes: self.link.lanes,
        });

        let result = self.train_attempts();
        // The sink must come out of training mode however the session
        // ended. The session's error takes precedence over the disable
        // write's.
        let disable = self.disable_pattern();
        result.and(disable)
    }

    fn train_attempts(&mut self) -> Result<(), DpError> {
        if self.link.caps.fast_training && self.link.train.valid() {
            ringbuf_entry!(Trace::FastTraining {
                rate: self.link.rate,
                lanes: self.link.lanes,
            });
            match self.fast_patterns() {
                Ok(()) => return Ok(()),
                Err(e) => ringbuf_entry!(Trace::FastTrainingFailed(e)),
            }
        }

        self.full_attempts()
    }

    /// The no-handshake sequence: both patterns are driven back to back on
    /// fixed delays, then a single status read decides.
    fn fast_patterns(&mut self) -> Result<(), DpError> {
        self.configure()?;

        self.link.train.pattern = TrainingPattern::Tps1;
        self.apply_training()?;
        self.aux.sleep_us(FAST_TRAINING_WAIT_US);

        self.link.train.pattern = self.eq_pattern();
        self.apply_training()?;
        self.aux.sleep_us(FAST_TRAINING_WAIT_US);

        let status = self.read_link_status()?;
        if !dpcd::clock_recovery_ok(&status, self.link.lanes)
            || !dpcd::channel_eq_ok(&status, self.link.lanes)
        {
            return Err(DpError::FastTrainingFailed);
        }
        Ok(())
    }

    fn full_attempts(&mut self) -> Result<(), DpError> {
        loop {
            self.link.train.reset();
            ringbuf_entry!(Trace::FullTraining {
                rate: self.link.rate,
                lanes: self.link.lanes,
            });

            ringbuf_entry!(Trace::State(TrainingState::Configuring));
            self.configure()?;

            ringbuf_entry!(Trace::State(TrainingState::ClockRecovery));
            self.clock_recovery()?;
            if !self.link.train.clock_recovered {
                self.downgrade()?;
                continue;
            }

            ringbuf_entry!(Trace::State(TrainingState::ChannelEqualization));
            self.channel_equalization()?;
            if !self.link.train.channel_equalized {
                self.downgrade()?;
                continue;
            }

            ringbuf_entry!(Trace::State(TrainingState::Success));
            return Ok(());
        }
    }

    fn downgrade(&mut self) -> Result<(), DpError> {
        ringbuf_entry!(Trace::State(TrainingState::Downgrading));
        let from = self.link.rate;
        match self.link.downgrade() {
            Ok(()) => {
                ringbuf_entry!(Trace::Downgrade {
                    from,
                    to: self.link.rate,
                });
                Ok(())
            }
            Err(e) => {
                ringbuf_entry!(Trace::State(TrainingState::Exhausted));
                Err(e)
            }
        }
    }

    /// Writes the link configuration: the PHY hook first, then the sink's
    /// bandwidth, lane count, and channel-coding registers.
    fn configure(&mut self) -> Result<(), DpError> {
        self.phy.configure_link(self.link)?;

        let mut values = [self.link.rate.bw_code(), self.link.lanes];
        if self.link.caps.enhanced_framing {
            values[1] |= dpcd::LANE_COUNT_ENHANCED_FRAME_EN;
        }
        self.aux.write_dpcd(dpcd::LINK_BW_SET, &values)?;

        let coding = if self.link.caps.channel_coding {
            dpcd::SET_ANSI_8B10B
        } else {
            0
        };
        self.aux.write_dpcd(dpcd::MAIN_LINK_CHANNEL_CODING_SET, &[coding])
    }

    /// One adjustment step: let the PHY retune, then hand the sink the
    /// drive levels and the pattern to train against.
    fn apply_training(&mut self) -> Result<(), DpError> {
        self.phy.apply_training(self.link)?;

        let request = &self.link.train.request;
        let lanes = usize::from(self.link.lanes);

        let mut values = [0u8; 4];
        for (i, value) in values.iter_mut().enumerate().take(lanes) {
            *value = request.voltage_swing[i]
                | (request.pre_emphasis[i] << dpcd::TRAIN_PRE_EMPHASIS_SHIFT);
            if request.voltage_swing[i] == dpcd::TRAIN_LEVEL_MAX {
                *value |= dpcd::TRAIN_MAX_SWING_REACHED;
            }
            if request.pre_emphasis[i] == dpcd::TRAIN_LEVEL_MAX {
                *value |= dpcd::TRAIN_MAX_PRE_EMPHASIS_REACHED;
            }
        }
        self.aux.write_dpcd(dpcd::TRAINING_LANE0_SET, &values[..lanes])?;

        if self.link.post_cursor_active() {
            let mut values = [0u8; 2];
            for i in 0..lanes {
                let mut nibble = self.link.train.request.post_cursor[i] & 0x3;
                if nibble == dpcd::TRAIN_LEVEL_MAX {
                    nibble |= dpcd::TRAIN_MAX_POST_CURSOR2_REACHED;
                }
                values[i / 2] |= nibble << ((i % 2) * 4);
            }
            self.aux.write_dpcd(
                dpcd::TRAINING_LANE0_1_SET2,
                &values[..(lanes + 1) / 2],
            )?;
        }

        self.set_pattern(self.link.train.pattern)
    }

    /// Writes the training-pattern register. Patterns 1-3 carry the
    /// scrambling-disable bit, which training symbols require; the disable
    /// write clears it again.
    fn set_pattern(&mut self, pattern: TrainingPattern) -> Result<(), DpError> {
        let mut value = pattern as u8;
        if pattern != TrainingPattern::Disabled {
            value |= dpcd::LINK_SCRAMBLING_DISABLE;
        }
        self.aux.write_dpcd(dpcd::TRAINING_PATTERN_SET, &[value])
    }

    fn disable_pattern(&mut self) -> Result<(), DpError> {
        self.link.train.pattern = TrainingPattern::Disabled;
        self.set_pattern(TrainingPattern::Disabled)
    }

    fn read_link_status(
        &mut self,
    ) -> Result<[u8; dpcd::LINK_STATUS_SIZE], DpError> {
        let mut status = [0u8; dpcd::LINK_STATUS_SIZE];
        self.aux.read_dpcd(dpcd::LANE0_1_STATUS, &mut status)?;
        Ok(status)
    }

    /// Copies the sink's requested drive levels for the active lanes out
    /// of a status block. Post-cursor requests live in their own register
    /// outside the block, and only exist where post-cursor itself does.
    fn get_adjustments(
        &mut self,
        status: &[u8; dpcd::LINK_STATUS_SIZE],
    ) -> Result<(), DpError> {
        let post_cursor = if self.link.post_cursor_active() {
            let mut value = [0u8; 1];
            self.aux.read_dpcd(dpcd::ADJUST_REQUEST_POST_CURSOR2, &mut value)?;
            Some(value[0])
        } else {
            None
        };

        let lanes = self.link.lanes;
        let adjust = &mut self.link.train.adjust;
        for lane in 0..lanes {
            let i = usize::from(lane);
            adjust.voltage_swing[i] =
                dpcd::adjust_request_voltage(status, lane);
            adjust.pre_emphasis[i] =
                dpcd::adjust_request_pre_emphasis(status, lane);
            if let Some(value) = post_cursor {
                adjust.post_cursor[i] =
                    dpcd::adjust_request_post_cursor(value, lane);
            }
        }
        Ok(())
    }

    fn training_wait(&self) {
        self.aux.sleep_us(self.link.training_wait_us());
    }

    /// Clock-recovery phase: drive pattern 1, then up to four rounds of
    /// apply, wait, check, adjust. Leaves `clock_recovered` set on success
    /// and clear if the rounds run out.
    fn clock_recovery(&mut self) -> Result<(), DpError> {
        self.link.train.pattern = TrainingPattern::Tps1;

        for _ in 0..TRAINING_ATTEMPTS {
            self.apply_training()?;
            self.training_wait();

            let status = self.read_link_status()?;
            if dpcd::clock_recovery_ok(&status, self.link.lanes) {
                self.link.train.clock_recovered = true;
                break;
            }

            self.get_adjustments(&status)?;
            self.link.train.apply_adjustments();
        }

        Ok(())
    }

    fn eq_pattern(&self) -> TrainingPattern {
        if self.link.caps.tps3_supported {
            TrainingPattern::Tps3
        } else {
            TrainingPattern::Tps2
        }
    }

    /// Channel-equalization phase: same loop shape as clock recovery, with
    /// pattern 2 or 3. Each round first confirms clock recovery still
    /// holds; losing it ends the phase with `clock_recovered` cleared.
    fn channel_equalization(&mut self) -> Result<(), DpError> {
        self.link.train.pattern = self.eq_pattern();

        for _ in 0..TRAINING_ATTEMPTS {
            self.apply_training()?;
            self.training_wait();

            let status = self.read_link_status()?;
            if !dpcd::clock_recovery_ok(&status, self.link.lanes) {
                ringbuf_entry!(Trace::ClockRecoveryLost);
                self.link.train.clock_recovered = false;
                break;
            }
            if dpcd::channel_eq_ok(&status, self.link.lanes) {
                self.link.train.channel_equalized = true;
                break;
            }

            self.get_adjustments(&status)?;
            self.link.train.apply_adjustments();
        }

        Ok(())
    }
}
