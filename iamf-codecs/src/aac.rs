// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AAC-LC encode/decode via `fdk-aac`, configured for the raw (no ADTS
//! header) transport IAMF's Audio Frame payloads carry.

use fdk_aac::dec::{Decoder as FdkDecoder, Transport as DecTransport};
use fdk_aac::enc::{BitRate, ChannelMode, Encoder as FdkEncoder, EncoderParams, Transport as EncTransport};
use fdk_aac::enc::AudioObjectType;

use iamf_core::error::{invalid_argument, unimplemented, Result};
use iamf_obu::audio_frame::AudioFrame;
use iamf_obu::codec_config::AacDecoderConfig;

use crate::{Decoder, EncodedAudioFrame, Encoder, PartialAudioFrameMeta, SampleGrid};

fn channel_mode_for(channel_count: usize) -> Result<ChannelMode> {
    match channel_count {
        1 => Ok(ChannelMode::Mono),
        2 => Ok(ChannelMode::Stereo),
        _ => unimplemented("aac-lc substreams beyond mono/stereo coupling are not supported"),
    }
}

pub struct AacDecoder {
    decoder: FdkDecoder,
    channel_count: usize,
}

impl AacDecoder {
    pub fn new(config: AacDecoderConfig, channel_count: usize) -> Result<Self> {
        let mut decoder = FdkDecoder::new(DecTransport::Raw);
        decoder
            .config_raw(&config.decoder_config_descriptor)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("aac decoder config failed: {e}")))?;
        Ok(AacDecoder { decoder, channel_count })
    }
}

impl Decoder for AacDecoder {
    fn decode(&mut self, audio_frame: &AudioFrame) -> Result<SampleGrid> {
        self.decoder
            .fill(&audio_frame.payload)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("aac decoder fill failed: {e}")))?;

        let frame_size = self.decoder.decoded_frame_size().max(self.channel_count);
        let mut pcm = vec![0i16; frame_size];
        self.decoder
            .decode_frame(&mut pcm)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("aac decode_frame failed: {e}")))?;

        if pcm.len() % self.channel_count != 0 {
            return invalid_argument("aac decoded frame size is not a multiple of the channel count");
        }
        let num_ticks = pcm.len() / self.channel_count;
        let mut grid = Vec::with_capacity(num_ticks);
        for tick in 0..num_ticks {
            let mut channels = Vec::with_capacity(self.channel_count);
            for ch in 0..self.channel_count {
                channels.push(i32::from(pcm[tick * self.channel_count + ch]));
            }
            grid.push(channels);
        }
        Ok(grid)
    }

    fn supports_partial_frames(&self) -> bool {
        false
    }
}

pub struct AacEncoder {
    encoder: FdkEncoder,
    channel_count: usize,
    codec_delay: u32,
    ready: Vec<EncodedAudioFrame>,
    finalized: bool,
}

impl AacEncoder {
    pub fn new(sample_rate: u32, channel_count: usize, bit_rate: u32) -> Result<Self> {
        let channels = channel_mode_for(channel_count)?;
        let encoder = FdkEncoder::new(EncoderParams {
            bit_rate: BitRate::Cbr(bit_rate),
            sample_rate,
            transport: EncTransport::Raw,
            channels,
            audio_object_type: AudioObjectType::Mpeg4LowComplexity,
        })
        .map_err(|e| iamf_core::Error::InvalidArgument(format!("aac encoder init failed: {e}")))?;
        Ok(AacEncoder { encoder, channel_count, codec_delay: 0, ready: Vec::new(), finalized: false })
    }
}

impl Encoder for AacEncoder {
    fn initialize(&mut self, _validate_codec_delay: bool) -> Result<u32> {
        // FDK AAC-LC's algorithmic delay is fixed at 2 full frames (2048
        // samples) regardless of configuration.
        self.codec_delay = 2048;
        Ok(self.codec_delay)
    }

    fn encode_audio_frame(&mut self, _input_bit_depth: u8, samples: &SampleGrid, meta: PartialAudioFrameMeta) -> Result<()> {
        if samples.iter().any(|tick| tick.len() != self.channel_count) {
            return invalid_argument("aac encode_audio_frame received a tick with the wrong channel count");
        }
        let mut interleaved = Vec::with_capacity(samples.len() * self.channel_count);
        for tick in samples {
            for &sample in tick {
                interleaved.push(sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);
            }
        }
        let mut payload = vec![0u8; 4096];
        let info = self
            .encoder
            .encode(&interleaved, &mut payload)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("aac encode failed: {e}")))?;
        payload.truncate(info.output_size);
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
        self.codec_delay
    }

    fn supports_partial_frames(&self) -> bool {
        false
    }
}
