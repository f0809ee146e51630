// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Audio Frame OBU: a substream id plus an opaque, codec-specific
//! payload (one Opus packet, one AAC `raw_data_block`, one FLAC FRAME, or
//! interlaced LPCM samples).

use iamf_core::bitstream::BitReader;
use iamf_core::error::{invalid_argument, Result};

use crate::header::ObuType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    pub substream_id: u32,
    pub payload: Vec<u8>,
}

impl AudioFrame {
    /// Parses an Audio Frame payload. `obu_type` must be `AudioFrame` or
    /// `AudioFrameId`; for the former, the substream id is the payload's
    /// leading ULEB128 field, for the latter it is implicit in the type.
    pub fn parse(rb: &mut BitReader<'_>, obu_type: ObuType, payload_size: usize) -> Result<Self> {
        let start_bytes = rb.bytes_remaining();
        let substream_id = match obu_type {
            ObuType::AudioFrameId(id) => u32::from(id),
            ObuType::AudioFrame => rb.read_uleb128()?,
            _ => return invalid_argument("AudioFrame::parse called with a non-Audio-Frame obu_type"),
        };
        let consumed = start_bytes - rb.bytes_remaining();
        let remaining = payload_size
            .checked_sub(consumed)
            .ok_or(())
            .or_else(|_| invalid_argument("audio frame payload shorter than its substream id field"))?;
        let payload = rb.read_bytes(remaining)?.to_vec();
        Ok(AudioFrame { substream_id, payload })
    }

    /// Picks the most compact `obu_type` for this frame's substream id: the
    /// implicit `AudioFrameId` range for ids 0..=17, the generic type
    /// otherwise.
    pub fn preferred_obu_type(&self) -> ObuType {
        if self.substream_id <= 17 {
            ObuType::AudioFrameId(self.substream_id as u8)
        } else {
            ObuType::AudioFrame
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_core::bitstream::{BitWriter};

    #[test]
    fn implicit_substream_id_round_trips() {
        let frame = AudioFrame { substream_id: 3, payload: vec![1, 2, 3, 4] };
        let obu_type = frame.preferred_obu_type();
        assert_eq!(obu_type, ObuType::AudioFrameId(3));

        let mut w = BitWriter::new();
        w.write_bytes(&frame.payload).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let parsed = AudioFrame::parse(&mut r, obu_type, bytes.len()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn explicit_substream_id_round_trips_for_ids_above_17() {
        let frame = AudioFrame { substream_id: 42, payload: vec![9, 9] };
        assert_eq!(frame.preferred_obu_type(), ObuType::AudioFrame);

        let mut w = BitWriter::new();
        w.write_uleb128(frame.substream_id).unwrap();
        w.write_bytes(&frame.payload).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let parsed = AudioFrame::parse(&mut r, ObuType::AudioFrame, bytes.len()).unwrap();
        assert_eq!(parsed, frame);
    }
}
