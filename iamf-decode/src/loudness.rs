// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loudness measurement for a rendered layout, used by the Rendering Mix
//! Presentation Finalizer to compare computed loudness against the values
//! carried in a Mix Presentation's `LoudnessInfo`.

use iamf_core::error::{invalid_argument, Result};
use iamf_core::units::q7_8;
use iamf_obu::mix_presentation::LoudnessInfo;

/// Accumulates rendered PCM frame by frame and reports integrated loudness,
/// digital peak, and true peak once the mix presentation is finalized.
pub trait LoudnessCalculator {
    /// `pcm` is `[tick][channel]`, at the bit depth this calculator was built
    /// for.
    fn accumulate_loudness_for_samples(&mut self, pcm: &[Vec<i32>]) -> Result<()>;

    /// Finishes measurement and reports it in the same encoding
    /// `LoudnessInfo` uses on the wire.
    fn query_loudness(&self) -> Result<LoudnessInfo>;
}

/// `ebur128`-backed [`LoudnessCalculator`]: EBU R128 integrated loudness plus
/// sample and true peak, matching the measurements `LoudnessInfo` carries.
pub struct EbuR128LoudnessCalculator {
    state: ebur128::EbuR128,
    channel_count: u32,
    bit_depth: u8,
    digital_peak: i32,
    measure_true_peak: bool,
}

impl EbuR128LoudnessCalculator {
    pub fn new(channel_count: u32, sample_rate: u32, bit_depth: u8, measure_true_peak: bool) -> Result<Self> {
        let mode = if measure_true_peak { ebur128::Mode::all() } else { ebur128::Mode::I };
        let state = ebur128::EbuR128::new(channel_count, sample_rate, mode)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("failed to initialize loudness measurement: {e:?}")))?;
        Ok(EbuR128LoudnessCalculator { state, channel_count, bit_depth, digital_peak: 0, measure_true_peak })
    }

    fn full_scale(&self) -> f64 {
        (1i64 << (self.bit_depth - 1)) as f64
    }
}

impl LoudnessCalculator for EbuR128LoudnessCalculator {
    fn accumulate_loudness_for_samples(&mut self, pcm: &[Vec<i32>]) -> Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        let channel_count = pcm[0].len();
        let mut interleaved = Vec::with_capacity(pcm.len() * channel_count);
        for tick in pcm {
            if tick.len() != channel_count {
                return invalid_argument("every tick in a rendered frame must carry the same channel count");
            }
            for &sample in tick {
                self.digital_peak = self.digital_peak.max(sample.abs());
                interleaved.push(sample);
            }
        }
        self.state
            .add_frames_i32(&interleaved)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("loudness accumulation failed: {e:?}")))?;
        Ok(())
    }

    fn query_loudness(&self) -> Result<LoudnessInfo> {
        let integrated = self
            .state
            .loudness_global()
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("integrated loudness query failed: {e:?}")))?;

        let digital_peak_dbfs = if self.digital_peak == 0 {
            f64::NEG_INFINITY
        } else {
            20.0 * (f64::from(self.digital_peak) / self.full_scale()).log10()
        };

        let true_peak = if self.measure_true_peak {
            let mut max_linear = 0.0f64;
            for channel in 0..self.channel_count {
                let peak = self
                    .state
                    .true_peak(channel)
                    .map_err(|e| iamf_core::Error::InvalidArgument(format!("true peak query failed: {e:?}")))?;
                max_linear = max_linear.max(peak);
            }
            let true_peak_dbfs = if max_linear <= 0.0 { f64::NEG_INFINITY } else { 20.0 * max_linear.log10() };
            Some(q7_8::from_f64(true_peak_dbfs))
        } else {
            None
        };

        Ok(LoudnessInfo {
            integrated_loudness: q7_8::from_f64(integrated),
            digital_peak: q7_8::from_f64(digital_peak_dbfs),
            true_peak,
            anchored_loudness: Vec::new(),
            extension_bytes: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reports_negative_infinity_peak_as_a_saturated_minimum() {
        let mut calc = EbuR128LoudnessCalculator::new(2, 48_000, 16, false).unwrap();
        calc.accumulate_loudness_for_samples(&vec![vec![0i32, 0i32]; 4800]).unwrap();
        let info = calc.query_loudness().unwrap();
        assert_eq!(info.digital_peak, i16::MIN);
        assert!(info.true_peak.is_none());
    }

    #[test]
    fn mismatched_channel_counts_within_one_frame_are_rejected() {
        let mut calc = EbuR128LoudnessCalculator::new(2, 48_000, 16, false).unwrap();
        let bad = vec![vec![0i32, 0i32], vec![0i32]];
        assert!(calc.accumulate_loudness_for_samples(&bad).is_err());
    }
}
