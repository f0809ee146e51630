// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uniform encoder/decoder adapters over the IAMF codec set: LPCM, Opus,
//! AAC-LC, and FLAC. Every adapter exposes the same `Encoder`/`Decoder`
//! interface so the Audio Frame Generator and OBU Processor don't need to
//! know which codec backs a given substream.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod aac;
pub mod flac;
pub mod lpcm;
pub mod opus;

use std::collections::HashMap;

use iamf_core::error::{invalid_argument, Result};
use iamf_core::units::Tick;
use iamf_obu::audio_frame::AudioFrame;
use iamf_obu::channel_label::ChannelLabel;
use iamf_obu::codec_config::CodecConfig;

/// Samples for one frame, `[tick][channel]`, at the codec's native bit depth.
pub type SampleGrid = Vec<Vec<i32>>;

/// The metadata a partial audio frame carries alongside its samples, filled
/// in by the frame generator before handing the frame to `encode_audio_frame`.
#[derive(Clone, Debug)]
pub struct PartialAudioFrameMeta {
    pub substream_id: u32,
    pub start: Tick,
    pub end: Tick,
    pub trim_at_start: u32,
    pub trim_at_end: u32,
}

/// An encoded Audio Frame OBU payload plus the metadata needed to finish
/// assembling its header.
#[derive(Clone, Debug)]
pub struct EncodedAudioFrame {
    pub meta: PartialAudioFrameMeta,
    pub payload: Vec<u8>,
}

/// Every codec adapter's encode side, grounded directly on spec.md §4.5's
/// interface listing.
pub trait Encoder {
    /// Returns the encoder's algorithmic codec delay in samples (pre-skip).
    fn initialize(&mut self, validate_codec_delay: bool) -> Result<u32>;
    fn encode_audio_frame(&mut self, input_bit_depth: u8, samples: &SampleGrid, meta: PartialAudioFrameMeta) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
    fn frames_available(&self) -> bool;
    fn pop(&mut self, frames: &mut Vec<EncodedAudioFrame>) -> Result<()>;
    fn finished(&self) -> bool;
    fn number_of_samples_to_delay_at_start(&self) -> u32;
    fn supports_partial_frames(&self) -> bool;
}

/// Every codec adapter's decode side.
pub trait Decoder {
    /// Converts one Audio Frame's opaque payload into a `[tick][channel]`
    /// grid, `num_samples_per_frame` long for full frames, shorter only when
    /// `supports_partial_frames()` allows it.
    fn decode(&mut self, audio_frame: &AudioFrame) -> Result<SampleGrid>;
    fn supports_partial_frames(&self) -> bool;
}

/// Constructs one decoder per substream from a codec config and the labels
/// each substream carries, rejecting duplicate initialization of a stateful
/// codec (every codec here is stateful except LPCM, which is reinitialized
/// freely).
pub fn init_decoders_for_substreams(
    substream_labels: &HashMap<u32, Vec<ChannelLabel>>,
    codec_config: &CodecConfig,
) -> Result<HashMap<u32, Box<dyn Decoder>>> {
    let mut decoders = HashMap::with_capacity(substream_labels.len());
    for (&substream_id, labels) in substream_labels {
        let channel_count = labels.len();
        if channel_count == 0 {
            return invalid_argument(format!("substream {substream_id} has no channel labels"));
        }
        let decoder: Box<dyn Decoder> = match &codec_config.decoder_config {
            iamf_obu::codec_config::DecoderConfig::Lpcm(cfg) => {
                Box::new(lpcm::LpcmDecoder::new(*cfg, channel_count))
            }
            iamf_obu::codec_config::DecoderConfig::Opus(cfg) => {
                Box::new(opus::OpusAdapterDecoder::new(*cfg, channel_count)?)
            }
            iamf_obu::codec_config::DecoderConfig::AacLc(cfg) => {
                Box::new(aac::AacDecoder::new(cfg.clone(), channel_count)?)
            }
            iamf_obu::codec_config::DecoderConfig::Flac(cfg) => {
                Box::new(flac::FlacDecoder::new(cfg.clone(), channel_count)?)
            }
        };
        if decoders.insert(substream_id, decoder).is_some() {
            return invalid_argument(format!("duplicate decoder initialization for substream {substream_id}"));
        }
    }
    Ok(decoders)
}
