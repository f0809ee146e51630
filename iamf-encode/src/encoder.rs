// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `IamfEncoder`: the top-level orchestrator that wires audio element
//! metadata to codec adapters, the Global Timing Module, the Parameters
//! Manager, and the Audio Frame Generator (spec.md §6.2's encoder
//! interface).

use std::collections::HashMap;

use iamf_codecs::{aac, flac, lpcm, opus, EncodedAudioFrame, Encoder as CodecEncoder};
use iamf_core::error::{invalid_argument, Result};
use iamf_demux::{GlobalTimingModule, ParametersManager};
use iamf_obu::audio_element::{AudioElement, ElementConfig};
use iamf_obu::channel_label::{base_channel_group_labels, ChannelLabel};
use iamf_obu::codec_config::{CodecConfig, DecoderConfig};
use iamf_obu::element::derive_audio_element_with_data;

use crate::frame_generator::{AudioFrameGenerator, ElementInit, TrimSpec};

/// Everything one audio element's submission needs: the OBU metadata plus
/// the caller's ingest parameters (bit depth, rate, trim, target bit rate
/// for lossy codecs).
pub struct AudioElementSpec {
    pub audio_element: AudioElement,
    pub codec_config: CodecConfig,
    pub input_bit_depth: u8,
    pub input_sample_rate: u32,
    pub bit_rate: u32,
    pub trim: TrimSpec,
}

fn declared_labels_for(audio_element: &AudioElement) -> Result<Vec<ChannelLabel>> {
    match &audio_element.config {
        ElementConfig::Scalable(cfg) => {
            let top_layer = cfg
                .layers
                .last()
                .ok_or_else(|| iamf_core::Error::InvalidArgument("scalable audio element has no layers".into()))?;
            Ok(base_channel_group_labels(top_layer.loudspeaker_layout))
        }
        ElementConfig::Ambisonics(cfg) => {
            let output_channel_count = match cfg {
                iamf_obu::audio_element::AmbisonicsConfig::Mono { output_channel_count, .. } => *output_channel_count,
                iamf_obu::audio_element::AmbisonicsConfig::Projection { output_channel_count, .. } => {
                    *output_channel_count
                }
            };
            Ok((0..output_channel_count).map(|i| ChannelLabel::Ambisonics(i as u8)).collect())
        }
    }
}

fn build_encoder(
    codec_config: &CodecConfig,
    channel_count: usize,
    sample_rate: u32,
    bit_rate: u32,
) -> Result<Box<dyn CodecEncoder>> {
    let encoder: Box<dyn CodecEncoder> = match &codec_config.decoder_config {
        DecoderConfig::Lpcm(cfg) => Box::new(lpcm::LpcmEncoder::new(cfg.sample_size, cfg.is_big_endian())),
        DecoderConfig::Opus(_) => Box::new(opus::OpusAdapterEncoder::new(sample_rate, channel_count)?),
        DecoderConfig::AacLc(_) => Box::new(aac::AacEncoder::new(sample_rate, channel_count, bit_rate)?),
        DecoderConfig::Flac(_) => Box::new(flac::FlacEncoder::new(sample_rate, channel_count, 16)),
    };
    Ok(encoder)
}

/// The `IamfEncoder` orchestrator (spec.md §6.2).
pub struct IamfEncoder {
    specs: Vec<AudioElementSpec>,
    validate_codec_delay: bool,
    generator: Option<AudioFrameGenerator>,
}

impl IamfEncoder {
    /// Builds the orchestrator from one submission's audio elements. Does
    /// not touch any codec or allocate encoder state; call `initialize` to
    /// do that.
    pub fn new_audio_frame_generator(specs: Vec<AudioElementSpec>, validate_codec_delay: bool) -> Self {
        IamfEncoder { specs, validate_codec_delay, generator: None }
    }

    pub fn initialize(&mut self) -> Result<()> {
        if self.specs.is_empty() {
            return invalid_argument("no audio elements were submitted to the encoder");
        }

        let mut parameters = ParametersManager::new();
        let mut substream_rates = Vec::new();
        let mut parameter_rates = Vec::new();
        let mut element_inits = Vec::new();

        for spec in &self.specs {
            parameters.register_audio_element(&spec.audio_element)?;
            for definition in &spec.audio_element.parameter_definitions {
                let common = definition.common();
                parameter_rates.push((common.parameter_id, common.parameter_rate));
            }

            let with_data = derive_audio_element_with_data(&spec.audio_element)?;
            let declared_labels = declared_labels_for(&spec.audio_element)?;

            let output_sample_rate = if spec.codec_config.output_sample_rate() != 0 {
                spec.codec_config.output_sample_rate()
            } else {
                spec.input_sample_rate
            };

            let mut encoders = HashMap::with_capacity(with_data.substream_labels.len());
            for (&substream_id, labels) in &with_data.substream_labels {
                for &other_substream_id in spec.audio_element.audio_substream_ids.iter() {
                    substream_rates_push_once(&mut substream_rates, other_substream_id, output_sample_rate);
                }
                let encoder = build_encoder(&spec.codec_config, labels.len(), output_sample_rate, spec.bit_rate)?;
                encoders.insert(substream_id, encoder);
            }

            element_inits.push(ElementInit {
                audio_element_id: spec.audio_element.audio_element_id,
                with_data,
                num_samples_per_frame: spec.codec_config.num_samples_per_frame,
                input_bit_depth: spec.input_bit_depth,
                input_sample_rate: spec.input_sample_rate,
                output_sample_rate,
                declared_labels,
                encoders,
                trim: spec.trim,
                validate_codec_delay: self.validate_codec_delay,
            });
        }

        let timing = GlobalTimingModule::new(&substream_rates, &parameter_rates)?;
        let generator = AudioFrameGenerator::new(timing, parameters);
        generator.initialize(element_inits)?;
        self.generator = Some(generator);
        Ok(())
    }

    fn generator(&self) -> &AudioFrameGenerator {
        self.generator.as_ref().expect("initialize() must be called before use")
    }

    pub fn taking_samples(&self) -> bool {
        self.generator().taking_samples()
    }

    pub fn add_samples(&self, audio_element_id: u32, label: ChannelLabel, samples: Vec<i32>) -> Result<()> {
        self.generator().add_samples(audio_element_id, label, samples)
    }

    pub fn finalize(&self) -> Result<()> {
        self.generator().finalize()
    }

    pub fn generating_frames(&self) -> bool {
        self.generator().generating_frames()
    }

    pub fn output_frames(&self, out: &mut Vec<EncodedAudioFrame>) -> Result<()> {
        self.generator().output_frames(out)
    }

    /// Constructs a throwaway encoder for this codec config just to read its
    /// algorithmic delay, without touching any `IamfEncoder` state.
    pub fn get_number_of_samples_to_delay_at_start(codec_config: &CodecConfig, channel_count: usize) -> Result<u32> {
        let sample_rate = if codec_config.output_sample_rate() != 0 { codec_config.output_sample_rate() } else { 48_000 };
        let mut encoder = build_encoder(codec_config, channel_count.max(1), sample_rate, 96_000)?;
        encoder.initialize(false)
    }
}

fn substream_rates_push_once(rates: &mut Vec<(u32, u32)>, id: u32, rate: u32) {
    if !rates.iter().any(|&(existing_id, _)| existing_id == id) {
        rates.push((id, rate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substream_rates_push_once_deduplicates() {
        let mut rates = Vec::new();
        substream_rates_push_once(&mut rates, 1, 48_000);
        substream_rates_push_once(&mut rates, 1, 48_000);
        substream_rates_push_once(&mut rates, 2, 48_000);
        assert_eq!(rates, vec![(1, 48_000), (2, 48_000)]);
    }
}
