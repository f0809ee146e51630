// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameter Block State: turns a `ParameterBlock`'s raw subblocks into the
//! values the rest of the pipeline consumes — a linear mix gain at an
//! arbitrary tick, a resolved `DownMixingParams` per subblock, and per
//! channel recon gain fractions.

use iamf_core::error::{invalid_argument, unknown, Result};
use iamf_core::units::q0_8;
use iamf_core::units::q7_8;
use iamf_obu::parameter::{ParameterBlock, ParameterSubblock};

use crate::demix::{clamp_w_idx, coefficients_for_mode, w_from_idx, DownMixingParams};

/// Locates the subblock covering `tick_offset` (relative to the block's own
/// start, i.e. in `[0, duration)`), returning `(index, subblock_start,
/// subblock_duration)`.
pub fn subblock_bounds(block: &ParameterBlock, tick_offset: u32) -> Result<(usize, u32, u32)> {
    if tick_offset >= block.duration {
        return invalid_argument(format!(
            "tick offset {tick_offset} is outside the parameter block's duration {}",
            block.duration
        ));
    }
    if block.constant_subblock_duration != 0 {
        let idx = (tick_offset / block.constant_subblock_duration) as usize;
        let start = idx as u32 * block.constant_subblock_duration;
        return Ok((idx, start, block.constant_subblock_duration));
    }
    let mut acc = 0u32;
    for (idx, &duration) in block.subblock_durations.iter().enumerate() {
        if tick_offset < acc + duration {
            return Ok((idx, acc, duration));
        }
        acc += duration;
    }
    unknown("tick offset not covered by any subblock despite passing the duration check")
}

/// The mix gain in linear amplitude (not dB) at `tick_offset`, linearly
/// interpolating between a subblock's `start_point_value` and
/// `end_point_value`. A Step subblock has equal start/end values, so this
/// formula covers both animation kinds without branching on which one it is.
pub fn mix_gain_linear_at_tick(block: &ParameterBlock, tick_offset: u32) -> Result<f64> {
    let (idx, sub_start, sub_duration) = subblock_bounds(block, tick_offset)?;
    match &block.subblocks[idx] {
        ParameterSubblock::MixGain { start_point_value, end_point_value, .. } => {
            let start_db = q7_8::to_f64(*start_point_value);
            let end_db = q7_8::to_f64(*end_point_value);
            let frac = if sub_duration > 1 {
                f64::from(tick_offset - sub_start) / f64::from(sub_duration - 1)
            } else {
                0.0
            };
            let db = start_db + (end_db - start_db) * frac;
            Ok(10f64.powf(db / 20.0))
        }
        _ => invalid_argument("parameter block subblock is not a mix gain subblock"),
    }
}

/// Carries the demixing mode's running `w_idx` across subblocks and parameter
/// blocks, since `w_idx_offset` is relative to the previous subblock's value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DemixingState {
    w_idx: u8,
}

impl DemixingState {
    pub fn new(default_w: u8) -> Self {
        DemixingState { w_idx: default_w.min(10) }
    }

    pub fn w_idx(&self) -> u8 {
        self.w_idx
    }

    /// Applies one subblock's `w_idx_offset`, returning the resolved
    /// down-mixing coefficients for that subblock. Must be called exactly
    /// once per subblock, in order — calling it twice for the same subblock
    /// double-applies the offset.
    pub fn apply_subblock(&mut self, subblock: &ParameterSubblock) -> Result<DownMixingParams> {
        match subblock {
            ParameterSubblock::Demixing { dmixp_mode, w_idx_offset } => {
                self.w_idx = clamp_w_idx(i32::from(self.w_idx), i32::from(*w_idx_offset));
                let (alpha, beta, gamma, delta) = coefficients_for_mode(*dmixp_mode);
                Ok(DownMixingParams { alpha, beta, gamma, delta, w: w_from_idx(self.w_idx) })
            }
            _ => invalid_argument("parameter block subblock is not a demixing subblock"),
        }
    }
}

/// Per-channel recon gain fractions (`0.0..=1.0`) carried by one subblock, in
/// the channel order the caller's `recon_gain_channels` enumeration used.
pub fn recon_gain_fractions(subblock: &ParameterSubblock) -> Result<Vec<f64>> {
    match subblock {
        ParameterSubblock::ReconGain { channel_gains, .. } => {
            Ok(channel_gains.iter().map(|&raw| q0_8::to_f64(raw)).collect())
        }
        _ => invalid_argument("parameter block subblock is not a recon gain subblock"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_obu::parameter::{DmixPMode, MixGainAnimation};

    fn block_with_subblocks(subblocks: Vec<ParameterSubblock>, subblock_duration: u32) -> ParameterBlock {
        ParameterBlock {
            parameter_id: 1,
            duration: subblock_duration * subblocks.len() as u32,
            constant_subblock_duration: subblock_duration,
            subblock_durations: Vec::new(),
            subblocks,
        }
    }

    #[test]
    fn mix_gain_interpolates_linearly_across_a_subblock() {
        let block = block_with_subblocks(
            vec![ParameterSubblock::MixGain {
                animation: MixGainAnimation::Linear,
                start_point_value: 0,
                end_point_value: q7_8::from_f64(6.0),
            }],
            9,
        );
        let at_start = mix_gain_linear_at_tick(&block, 0).unwrap();
        let at_end = mix_gain_linear_at_tick(&block, 8).unwrap();
        assert!((at_start - 1.0).abs() < 1e-9);
        assert!(at_end > at_start);
    }

    #[test]
    fn step_animation_is_constant_across_the_subblock() {
        let block = block_with_subblocks(
            vec![ParameterSubblock::MixGain {
                animation: MixGainAnimation::Step,
                start_point_value: q7_8::from_f64(-3.0),
                end_point_value: q7_8::from_f64(-3.0),
            }],
            4,
        );
        let a = mix_gain_linear_at_tick(&block, 0).unwrap();
        let b = mix_gain_linear_at_tick(&block, 3).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn demixing_state_accumulates_offsets_across_subblocks() {
        let mut state = DemixingState::new(5);
        let params_a = state
            .apply_subblock(&ParameterSubblock::Demixing { dmixp_mode: DmixPMode::Mode1, w_idx_offset: 2 })
            .unwrap();
        assert_eq!(params_a.w, w_from_idx(7));

        let params_b = state
            .apply_subblock(&ParameterSubblock::Demixing { dmixp_mode: DmixPMode::Mode1, w_idx_offset: 5 })
            .unwrap();
        assert_eq!(params_b.w, w_from_idx(10));
        assert_eq!(state.w_idx(), 10);
    }

    #[test]
    fn recon_gain_fractions_convert_to_unit_interval() {
        let fractions = recon_gain_fractions(&ParameterSubblock::ReconGain {
            recon_gain_flag: 0b1,
            channel_gains: vec![255, 0],
        })
        .unwrap();
        assert!((fractions[0] - 1.0).abs() < 1e-9);
        assert_eq!(fractions[1], 0.0);
    }

    #[test]
    fn tick_outside_duration_is_rejected() {
        let block = block_with_subblocks(
            vec![ParameterSubblock::MixGain {
                animation: MixGainAnimation::Step,
                start_point_value: 0,
                end_point_value: 0,
            }],
            4,
        );
        assert!(mix_gain_linear_at_tick(&block, 10).is_err());
    }
}
