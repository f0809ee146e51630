// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Global Timing Module: per-substream and per-parameter-id monotonic
//! tick counters that keep every coded stream in an IA Sequence on a shared
//! timeline.

use std::collections::HashMap;

use iamf_core::error::{invalid_argument, Error, Result};
use iamf_core::units::Tick;

pub struct GlobalTimingModule {
    substream_cursors: HashMap<u32, Tick>,
    parameter_cursors: HashMap<u32, Tick>,
}

impl GlobalTimingModule {
    /// `substream_rates`/`parameter_rates` name every substream/parameter id
    /// that will ever be queried. Duplicate ids or a zero rate are rejected.
    pub fn new(substream_rates: &[(u32, u32)], parameter_rates: &[(u32, u32)]) -> Result<Self> {
        let mut substream_cursors = HashMap::with_capacity(substream_rates.len());
        for &(id, rate) in substream_rates {
            if rate == 0 {
                return invalid_argument(format!("substream {id} has a zero sample rate"));
            }
            if substream_cursors.insert(id, 0).is_some() {
                return invalid_argument(format!("duplicate substream id {id}"));
            }
        }

        let mut parameter_cursors = HashMap::with_capacity(parameter_rates.len());
        for &(id, rate) in parameter_rates {
            if rate == 0 {
                return invalid_argument(format!("parameter id {id} has a zero parameter_rate"));
            }
            if parameter_cursors.insert(id, 0).is_some() {
                return invalid_argument(format!("duplicate parameter id {id}"));
            }
        }

        Ok(GlobalTimingModule { substream_cursors, parameter_cursors })
    }

    /// Returns the current `[start, end)` span for `substream_id` and
    /// advances its cursor by `duration`. On an unknown substream id, the
    /// cursor is left untouched and `(0, duration)` is returned alongside
    /// the error so negative tests can inspect both.
    pub fn next_audio_frame_timestamps(&mut self, substream_id: u32, duration: Tick) -> (Result<()>, (Tick, Tick)) {
        match self.substream_cursors.get_mut(&substream_id) {
            Some(cursor) => {
                let start = *cursor;
                let end = start + duration;
                *cursor = end;
                (Ok(()), (start, end))
            }
            None => (
                Err(Error::InvalidArgument(format!("unknown substream id {substream_id}"))),
                (0, duration),
            ),
        }
    }

    /// Like [`Self::next_audio_frame_timestamps`], but for a parameter id,
    /// and additionally checks `input_start` against the stored cursor
    /// (gap detection): a mismatch fails without advancing the cursor.
    pub fn next_parameter_block_timestamps(
        &mut self,
        parameter_id: u32,
        input_start: Tick,
        duration: Tick,
    ) -> (Result<()>, (Tick, Tick)) {
        match self.parameter_cursors.get_mut(&parameter_id) {
            Some(cursor) => {
                let start = *cursor;
                if input_start != start {
                    return (
                        Err(Error::InvalidArgument(format!(
                            "parameter {parameter_id} gap: expected start {start}, got {input_start}"
                        ))),
                        (start, start + duration),
                    );
                }
                let end = start + duration;
                *cursor = end;
                (Ok(()), (start, end))
            }
            None => (
                Err(Error::InvalidArgument(format!("unknown parameter id {parameter_id}"))),
                (0, duration),
            ),
        }
    }

    /// The timestamp every substream cursor agrees on, or `None` mid-temporal-unit
    /// (or when there are no substreams to agree on anything).
    pub fn global_audio_frame_timestamp(&self) -> Option<Tick> {
        let mut cursors = self.substream_cursors.values();
        let first = *cursors.next()?;
        if cursors.all(|&c| c == first) {
            Some(first)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_advance_monotonically() {
        let mut timing = GlobalTimingModule::new(&[(0, 48_000)], &[]).unwrap();
        for k in 0..3u64 {
            let (status, (start, end)) = timing.next_audio_frame_timestamps(0, 8);
            status.unwrap();
            assert_eq!((start, end), (k * 8, (k + 1) * 8));
        }
    }

    #[test]
    fn unknown_substream_returns_default_tuple_with_error() {
        let mut timing = GlobalTimingModule::new(&[], &[]).unwrap();
        let (status, (start, end)) = timing.next_audio_frame_timestamps(99, 8);
        assert!(status.is_err());
        assert_eq!((start, end), (0, 8));
    }

    #[test]
    fn global_timestamp_requires_agreement() {
        let mut timing = GlobalTimingModule::new(&[(0, 48_000), (1, 48_000)], &[]).unwrap();
        assert_eq!(timing.global_audio_frame_timestamp(), Some(0));
        timing.next_audio_frame_timestamps(0, 8).0.unwrap();
        assert_eq!(timing.global_audio_frame_timestamp(), None);
        timing.next_audio_frame_timestamps(1, 8).0.unwrap();
        assert_eq!(timing.global_audio_frame_timestamp(), Some(8));
    }

    #[test]
    fn parameter_gap_detection_rejects_mismatched_start() {
        let mut timing = GlobalTimingModule::new(&[], &[(5, 48_000)]).unwrap();
        timing.next_parameter_block_timestamps(5, 0, 16).0.unwrap();
        let (status, _) = timing.next_parameter_block_timestamps(5, 20, 16);
        assert!(status.is_err());
    }

    #[test]
    fn rejects_duplicate_and_zero_rate_ids() {
        assert!(GlobalTimingModule::new(&[(0, 48_000), (0, 48_000)], &[]).is_err());
        assert!(GlobalTimingModule::new(&[(0, 0)], &[]).is_err());
    }
}
