// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Opus encode/decode via `audiopus`. Opus only decodes mono or stereo
//! natively, matching IAMF's per-substream layout of one or two channels;
//! frames must be encoded whole, so `supports_partial_frames` is `false`.

use audiopus::coder::{Decoder as OpusDecoderState, Encoder as OpusEncoderState};
use audiopus::{Application, Channels, SampleRate};

use iamf_core::error::{invalid_argument, unimplemented, Result};
use iamf_obu::audio_frame::AudioFrame;
use iamf_obu::codec_config::OpusDecoderConfig;

use crate::{Decoder, EncodedAudioFrame, Encoder, PartialAudioFrameMeta, SampleGrid};

fn channels_for(channel_count: usize) -> Result<Channels> {
    match channel_count {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        _ => unimplemented("opus substreams beyond mono/stereo coupling are not supported"),
    }
}

fn sample_rate_for(rate: u32) -> Result<SampleRate> {
    match rate {
        8_000 => Ok(SampleRate::Hz8000),
        12_000 => Ok(SampleRate::Hz12000),
        16_000 => Ok(SampleRate::Hz16000),
        24_000 => Ok(SampleRate::Hz24000),
        48_000 => Ok(SampleRate::Hz48000),
        _ => unimplemented("opus only supports its five native sample rates"),
    }
}

pub struct OpusAdapterDecoder {
    decoder: OpusDecoderState,
    channel_count: usize,
    pre_skip: u16,
}

impl OpusAdapterDecoder {
    pub fn new(config: OpusDecoderConfig, channel_count: usize) -> Result<Self> {
        let channels = channels_for(channel_count)?;
        let sample_rate = sample_rate_for(config.input_sample_rate)?;
        let decoder = OpusDecoderState::new(sample_rate, channels)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("opus decoder init failed: {e}")))?;
        Ok(OpusAdapterDecoder { decoder, channel_count, pre_skip: config.pre_skip })
    }
}

impl Decoder for OpusAdapterDecoder {
    fn decode(&mut self, audio_frame: &AudioFrame) -> Result<SampleGrid> {
        // 120ms is the largest Opus frame at any supported rate; oversize the
        // scratch buffer and trim to what the decoder actually produced.
        let mut scratch = vec![0i16; 48 * 120 * self.channel_count.max(1)];
        let samples_per_channel = self
            .decoder
            .decode(Some(&audio_frame.payload), &mut scratch, false)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("opus decode failed: {e}")))?;

        let mut grid = Vec::with_capacity(samples_per_channel);
        for tick in 0..samples_per_channel {
            let mut channels = Vec::with_capacity(self.channel_count);
            for ch in 0..self.channel_count {
                channels.push(i32::from(scratch[tick * self.channel_count + ch]));
            }
            grid.push(channels);
        }
        let _ = self.pre_skip; // accounted for by the caller's OBU trim fields, not here.
        Ok(grid)
    }

    fn supports_partial_frames(&self) -> bool {
        false
    }
}

pub struct OpusAdapterEncoder {
    encoder: OpusEncoderState,
    channel_count: usize,
    ready: Vec<EncodedAudioFrame>,
    finalized: bool,
}

impl OpusAdapterEncoder {
    pub fn new(sample_rate: u32, channel_count: usize) -> Result<Self> {
        let channels = channels_for(channel_count)?;
        let rate = sample_rate_for(sample_rate)?;
        let encoder = OpusEncoderState::new(rate, channels, Application::Audio)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("opus encoder init failed: {e}")))?;
        Ok(OpusAdapterEncoder { encoder, channel_count, ready: Vec::new(), finalized: false })
    }
}

impl Encoder for OpusAdapterEncoder {
    fn initialize(&mut self, _validate_codec_delay: bool) -> Result<u32> {
        // libopus's fixed algorithmic delay at any rate/application is 6.5ms,
        // reported here as 312 samples at 48kHz per the Opus RFC.
        Ok(312)
    }

    fn encode_audio_frame(&mut self, _input_bit_depth: u8, samples: &SampleGrid, meta: PartialAudioFrameMeta) -> Result<()> {
        if samples.iter().any(|tick| tick.len() != self.channel_count) {
            return invalid_argument("opus encode_audio_frame received a tick with the wrong channel count");
        }
        let mut interleaved = Vec::with_capacity(samples.len() * self.channel_count);
        for tick in samples {
            for &sample in tick {
                interleaved.push(sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);
            }
        }
        let mut payload = vec![0u8; 4000];
        let written = self
            .encoder
            .encode(&interleaved, &mut payload)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("opus encode failed: {e}")))?;
        payload.truncate(written);
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
        312
    }

    fn supports_partial_frames(&self) -> bool {
        false
    }
}
