// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LPCM encode/decode: interlaced signed integer samples at a codec-config
//! supplied bit depth and endianness. Always has zero codec delay and
//! supports partial frames.

use iamf_core::error::{invalid_argument, Result};
use iamf_obu::audio_frame::AudioFrame;
use iamf_obu::codec_config::LpcmDecoderConfig;

use crate::{Decoder, EncodedAudioFrame, Encoder, PartialAudioFrameMeta, SampleGrid};

fn bytes_per_sample(sample_size: u8) -> Result<usize> {
    match sample_size {
        16 | 24 | 32 => Ok(sample_size as usize / 8),
        _ => invalid_argument(format!("lpcm sample_size {sample_size} is not 16, 24, or 32")),
    }
}

/// Sign-extends a little-endian (or big-endian, pre-byte-swapped) unsigned
/// integer of `width` bytes read as a u32 into the full i32 range.
fn sign_extend_from_width(raw: u32, width: usize) -> i32 {
    let shift = 32 - width as u32 * 8;
    ((raw << shift) as i32) >> shift
}

fn read_sample(bytes: &[u8], big_endian: bool) -> u32 {
    let mut raw = [0u8; 4];
    if big_endian {
        raw[4 - bytes.len()..].copy_from_slice(bytes);
        u32::from_be_bytes(raw)
    } else {
        raw[..bytes.len()].copy_from_slice(bytes);
        u32::from_le_bytes(raw)
    }
}

fn write_sample(value: i32, width: usize, big_endian: bool, out: &mut Vec<u8>) {
    let bytes = value.to_le_bytes();
    if big_endian {
        out.extend(bytes[..width].iter().rev());
    } else {
        out.extend(&bytes[..width]);
    }
}

pub struct LpcmDecoder {
    config: LpcmDecoderConfig,
    channel_count: usize,
}

impl LpcmDecoder {
    pub fn new(config: LpcmDecoderConfig, channel_count: usize) -> Self {
        LpcmDecoder { config, channel_count }
    }
}

impl Decoder for LpcmDecoder {
    fn decode(&mut self, audio_frame: &AudioFrame) -> Result<SampleGrid> {
        let width = bytes_per_sample(self.config.sample_size)?;
        let frame_bytes = width * self.channel_count;
        if audio_frame.payload.len() % frame_bytes != 0 {
            return invalid_argument("lpcm payload length is not a multiple of the frame size");
        }

        let big_endian = self.config.is_big_endian();
        let num_ticks = audio_frame.payload.len() / frame_bytes;
        let mut grid = Vec::with_capacity(num_ticks);
        for tick in 0..num_ticks {
            let mut channels = Vec::with_capacity(self.channel_count);
            for ch in 0..self.channel_count {
                let offset = tick * frame_bytes + ch * width;
                let raw = read_sample(&audio_frame.payload[offset..offset + width], big_endian);
                channels.push(sign_extend_from_width(raw, width));
            }
            grid.push(channels);
        }
        Ok(grid)
    }

    fn supports_partial_frames(&self) -> bool {
        true
    }
}

pub struct LpcmEncoder {
    sample_size: u8,
    big_endian: bool,
    ready: Vec<EncodedAudioFrame>,
    finalized: bool,
}

impl LpcmEncoder {
    pub fn new(sample_size: u8, big_endian: bool) -> Self {
        LpcmEncoder { sample_size, big_endian, ready: Vec::new(), finalized: false }
    }
}

impl Encoder for LpcmEncoder {
    fn initialize(&mut self, _validate_codec_delay: bool) -> Result<u32> {
        Ok(0)
    }

    fn encode_audio_frame(&mut self, _input_bit_depth: u8, samples: &SampleGrid, meta: PartialAudioFrameMeta) -> Result<()> {
        let width = bytes_per_sample(self.sample_size)?;
        let mut payload = Vec::with_capacity(samples.len() * samples.first().map_or(0, |c| c.len()) * width);
        for tick in samples {
            for &sample in tick {
                write_sample(sample, width, self.big_endian, &mut payload);
            }
        }
        self.ready.push(EncodedAudioFrame { meta, payload });
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }

    fn frames_available(&self) -> bool {
        !self.ready.is_empty()
    }

    fn pop(&mut self, frames: &mut Vec<EncodedAudioFrame>) -> Result<()> {
        frames.append(&mut self.ready);
        Ok(())
    }

    fn finished(&self) -> bool {
        self.finalized && self.ready.is_empty()
    }

    fn number_of_samples_to_delay_at_start(&self) -> u32 {
        0
    }

    fn supports_partial_frames(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sample_size: u8, big_endian: bool) -> LpcmDecoderConfig {
        LpcmDecoderConfig {
            sample_format_flags: if big_endian { 1 } else { 0 },
            sample_size,
            sample_rate: 48_000,
        }
    }

    #[test]
    fn round_trips_16_bit_little_endian_stereo() {
        let samples: SampleGrid = vec![vec![1000, -1000], vec![32767, -32768]];
        let mut encoder = LpcmEncoder::new(16, false);
        encoder.initialize(true).unwrap();
        let meta = PartialAudioFrameMeta { substream_id: 0, start: 0, end: 2, trim_at_start: 0, trim_at_end: 0 };
        encoder.encode_audio_frame(16, &samples, meta).unwrap();

        let mut frames = Vec::new();
        encoder.pop(&mut frames).unwrap();
        assert_eq!(frames.len(), 1);

        let mut decoder = LpcmDecoder::new(config(16, false), 2);
        let audio_frame = AudioFrame { substream_id: 0, payload: frames.remove(0).payload };
        let decoded = decoder.decode(&audio_frame).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn round_trips_24_bit_big_endian_mono() {
        let samples: SampleGrid = vec![vec![8_388_607], vec![-8_388_608]];
        let mut encoder = LpcmEncoder::new(24, true);
        let meta = PartialAudioFrameMeta { substream_id: 0, start: 0, end: 2, trim_at_start: 0, trim_at_end: 0 };
        encoder.encode_audio_frame(24, &samples, meta).unwrap();
        let mut frames = Vec::new();
        encoder.pop(&mut frames).unwrap();

        let mut decoder = LpcmDecoder::new(config(24, true), 1);
        let audio_frame = AudioFrame { substream_id: 0, payload: frames.remove(0).payload };
        let decoded = decoder.decode(&audio_frame).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn misaligned_payload_is_rejected() {
        let mut decoder = LpcmDecoder::new(config(16, false), 2);
        let audio_frame = AudioFrame { substream_id: 0, payload: vec![0, 0, 0] };
        assert!(decoder.decode(&audio_frame).is_err());
    }
}
