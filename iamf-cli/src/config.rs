// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ProgramDescription`: the JSON program description `iamf-cli` loads,
//! standing in for the original's protobuf `UserMetadata` textproto. Maps
//! onto the OBU payload types in `iamf_obu` by hand, since those types carry
//! no `serde` derives of their own.

use serde::{Deserialize, Serialize};

use iamf_core::error::{invalid_argument, Result};
use iamf_obu::audio_element::{
    AudioElement, AudioElementType, ChannelAudioLayerConfig, ElementConfig, LoudspeakerLayout, ScalableChannelLayoutConfig,
};
use iamf_obu::codec_config::{
    AacDecoderConfig, CodecConfig, DecoderConfig, FlacDecoderConfig, LpcmDecoderConfig, OpusDecoderConfig,
};
use iamf_obu::mix_presentation::{Layout, LayoutType, LoudnessInfo, MixPresentation, RenderingConfig, SubMix, SubMixAudioElement};
use iamf_obu::parameter::{ParamDefinitionCommon, ParameterDefinition};

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    Lpcm,
    Opus,
    AacLc,
    Flac,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AudioElementSpec {
    pub audio_element_id: u32,
    pub codec_config_id: u32,
    pub codec: CodecKind,
    /// Only "mono" and "stereo" are accepted here: every other layout needs a
    /// multi-layer Scalable Channel Layout Config this CLI doesn't build.
    pub layout: String,
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub num_samples_per_frame: u32,
    #[serde(default = "default_bit_rate")]
    pub bit_rate: u32,
    pub input_wav_path: String,
}

fn default_bit_rate() -> u32 {
    128_000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MixPresentationSpec {
    pub mix_presentation_id: u32,
    #[serde(default)]
    pub annotations: Vec<String>,
    pub audio_element_ids: Vec<u32>,
    /// Loudspeaker/binaural layouts to render this mix presentation to; see
    /// [`target_layout_for`] for the accepted names.
    pub layouts: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProgramDescription {
    #[serde(default)]
    pub primary_profile: u8,
    #[serde(default)]
    pub additional_profile: u8,
    pub audio_elements: Vec<AudioElementSpec>,
    pub mix_presentations: Vec<MixPresentationSpec>,
}

fn mono_stereo_layout(name: &str) -> Result<(LoudspeakerLayout, u32, u32)> {
    match name {
        "mono" => Ok((LoudspeakerLayout::Mono, 1, 0)),
        "stereo" => Ok((LoudspeakerLayout::Stereo, 1, 1)),
        other => invalid_argument(format!(
            "iamf-cli only builds single-layer mono or stereo audio elements directly; got layout {other:?}"
        )),
    }
}

/// Channel count a source audio element built by this CLI carries, given its
/// `layout` field.
pub fn source_channel_count(layout: &str) -> Result<usize> {
    let (loudspeaker_layout, _, _) = mono_stereo_layout(layout)?;
    Ok(loudspeaker_layout.channel_count() as usize)
}

/// Builds the `AudioElement`/`CodecConfig` pair for one source element.
/// `substream_id` must be unique across the whole program description; this
/// CLI only ever emits one substream per audio element (mono or stereo).
pub fn build_audio_element(spec: &AudioElementSpec, substream_id: u32) -> Result<(AudioElement, CodecConfig)> {
    let (loudspeaker_layout, substream_count, coupled_substream_count) = mono_stereo_layout(&spec.layout)?;
    let channel_count = loudspeaker_layout.channel_count() as u8;

    let decoder_config = match spec.codec {
        CodecKind::Lpcm => DecoderConfig::Lpcm(LpcmDecoderConfig {
            sample_format_flags: 0,
            sample_size: spec.bit_depth,
            sample_rate: spec.sample_rate,
        }),
        CodecKind::Opus => DecoderConfig::Opus(OpusDecoderConfig {
            version: 1,
            output_channel_count: channel_count,
            pre_skip: 0,
            input_sample_rate: spec.sample_rate,
        }),
        CodecKind::AacLc => DecoderConfig::AacLc(AacDecoderConfig { decoder_config_descriptor: Vec::new() }),
        CodecKind::Flac => DecoderConfig::Flac(FlacDecoderConfig { metadata_blocks: Vec::new() }),
    };

    let codec_config = CodecConfig {
        codec_config_id: spec.codec_config_id,
        num_samples_per_frame: spec.num_samples_per_frame,
        audio_roll_distance: 0,
        decoder_config,
    };

    let audio_element = AudioElement {
        audio_element_id: spec.audio_element_id,
        audio_element_type: AudioElementType::ChannelBased,
        codec_config_id: spec.codec_config_id,
        audio_substream_ids: vec![substream_id],
        parameter_definitions: Vec::new(),
        config: ElementConfig::Scalable(ScalableChannelLayoutConfig {
            layers: vec![ChannelAudioLayerConfig {
                loudspeaker_layout,
                output_gain_is_present_flag: false,
                recon_gain_is_present_flag: false,
                substream_count,
                coupled_substream_count,
                output_gain_flag: 0,
                output_gain: 0,
            }],
        }),
    };

    Ok((audio_element, codec_config))
}

fn mix_gain_definition(parameter_id: u32, parameter_rate: u32) -> ParameterDefinition {
    ParameterDefinition::MixGain {
        common: ParamDefinitionCommon {
            parameter_id,
            parameter_rate: parameter_rate.max(1),
            param_definition_mode: true,
            duration: 0,
            constant_subblock_duration: 0,
            subblock_durations: Vec::new(),
        },
        default_mix_gain: 0,
    }
}

/// The tag `Layout::ss_layout_tag` carries for a named conventional
/// loudspeaker layout. Mirrors `LoudspeakerLayout`'s own tag assignment
/// (private to that type), duplicated here since a Mix Presentation layout
/// is only ever a tag, never a full `LoudspeakerLayout` value.
fn conventional_layout_tag(name: &str) -> Result<u8> {
    match name {
        "mono" => Ok(0),
        "stereo" => Ok(1),
        "5.1" => Ok(2),
        "5.1.2" => Ok(3),
        "5.1.4" => Ok(4),
        "7.1" => Ok(5),
        "7.1.2" => Ok(6),
        "7.1.4" => Ok(7),
        "3.1.2" => Ok(8),
        other => invalid_argument(format!("unknown target loudspeaker layout {other:?}")),
    }
}

/// Resolves a target layout name to the `Layout` a Mix Presentation carries.
/// Accepts every conventional loudspeaker layout tag plus `"binaural"`.
pub fn target_layout_for(name: &str) -> Result<Layout> {
    let (layout_type, ss_layout_tag) = if name == "binaural" {
        (LayoutType::Binaural, None)
    } else {
        (LayoutType::LoudspeakersSsConventional, Some(conventional_layout_tag(name)?))
    };
    Ok(Layout { layout_type, ss_layout_tag, loudness: LoudnessInfo::default() })
}

/// Builds the `MixPresentation` OBU payload for one spec. Parameter ids for
/// the element and output mix gains are derived from `mix_presentation_id`
/// so they stay unique across a program description with multiple mix
/// presentations.
pub fn build_mix_presentation(spec: &MixPresentationSpec, parameter_rate: u32) -> Result<MixPresentation> {
    let mut next_parameter_id = spec.mix_presentation_id * 100;
    let mut audio_elements = Vec::with_capacity(spec.audio_element_ids.len());
    for &audio_element_id in &spec.audio_element_ids {
        next_parameter_id += 1;
        audio_elements.push(SubMixAudioElement {
            audio_element_id,
            rendering_config: RenderingConfig { headphones_rendering_mode: 0, extension_bytes: Vec::new() },
            element_mix_gain: mix_gain_definition(next_parameter_id, parameter_rate),
        });
    }
    next_parameter_id += 1;
    let output_mix_gain = mix_gain_definition(next_parameter_id, parameter_rate);

    let mut layouts = Vec::with_capacity(spec.layouts.len());
    for name in &spec.layouts {
        layouts.push(target_layout_for(name)?);
    }

    Ok(MixPresentation {
        mix_presentation_id: spec.mix_presentation_id,
        annotations: spec.annotations.clone(),
        sub_mixes: vec![SubMix { audio_elements, output_mix_gain, layouts }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_and_stereo_layouts_are_accepted_for_source_elements() {
        let mono = AudioElementSpec {
            audio_element_id: 1,
            codec_config_id: 1,
            codec: CodecKind::Lpcm,
            layout: "mono".into(),
            sample_rate: 48_000,
            bit_depth: 16,
            num_samples_per_frame: 960,
            bit_rate: 128_000,
            input_wav_path: "in.wav".into(),
        };
        let (element, codec_config) = build_audio_element(&mono, 0).unwrap();
        assert_eq!(element.audio_substream_ids, vec![0]);
        assert_eq!(codec_config.codec_config_id, 1);
        assert_eq!(source_channel_count("mono").unwrap(), 1);
        assert_eq!(source_channel_count("stereo").unwrap(), 2);
    }

    #[test]
    fn unsupported_source_layouts_are_rejected() {
        assert!(source_channel_count("5.1").is_err());
    }

    #[test]
    fn target_layout_resolves_tag_and_binaural() {
        let stereo = target_layout_for("stereo").unwrap();
        assert_eq!(stereo.ss_layout_tag, Some(1));
        let binaural = target_layout_for("binaural").unwrap();
        assert_eq!(binaural.layout_type, LayoutType::Binaural);
        assert!(binaural.ss_layout_tag.is_none());
    }
}
