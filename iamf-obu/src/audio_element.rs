// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Audio Element OBU: a group of substreams forming one scalable channel
//! layout or one ambisonics field.

use iamf_core::bitstream::{BitReader, BitWriter};
use iamf_core::error::{invalid_argument, Result};

use crate::parameter::ParameterDefinition;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AudioElementType {
    ChannelBased,
    SceneBased,
}

/// A loudspeaker layout for one layer of a Scalable Channel Layout Config.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoudspeakerLayout {
    Mono,
    Stereo,
    Surround5_1,
    Surround5_1_2,
    Surround5_1_4,
    Surround7_1,
    Surround7_1_2,
    Surround7_1_4,
    Surround3_1_2,
    Binaural,
    Expanded(ExpandedLoudspeakerLayout),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExpandedLoudspeakerLayout {
    Lfe,
    StereoS,
    StereoSs,
    StereoTf,
    StereoTb,
    Top4Ch,
    Layout3_0Ch,
    Layout9_1_6Ch,
    StereoTpSi,
    Top6Ch,
}

impl LoudspeakerLayout {
    fn tag(self) -> u8 {
        match self {
            LoudspeakerLayout::Mono => 0,
            LoudspeakerLayout::Stereo => 1,
            LoudspeakerLayout::Surround5_1 => 2,
            LoudspeakerLayout::Surround5_1_2 => 3,
            LoudspeakerLayout::Surround5_1_4 => 4,
            LoudspeakerLayout::Surround7_1 => 5,
            LoudspeakerLayout::Surround7_1_2 => 6,
            LoudspeakerLayout::Surround7_1_4 => 7,
            LoudspeakerLayout::Surround3_1_2 => 8,
            LoudspeakerLayout::Binaural => 9,
            LoudspeakerLayout::Expanded(_) => 15,
        }
    }

    /// Resolves a `loudspeaker_layout`/`ss_layout_tag` value to the layout it
    /// names. Shared with `Layout::ss_layout_tag` (Mix Presentation OBU),
    /// which reuses this same tag space.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => LoudspeakerLayout::Mono,
            1 => LoudspeakerLayout::Stereo,
            2 => LoudspeakerLayout::Surround5_1,
            3 => LoudspeakerLayout::Surround5_1_2,
            4 => LoudspeakerLayout::Surround5_1_4,
            5 => LoudspeakerLayout::Surround7_1,
            6 => LoudspeakerLayout::Surround7_1_2,
            7 => LoudspeakerLayout::Surround7_1_4,
            8 => LoudspeakerLayout::Surround3_1_2,
            9 => LoudspeakerLayout::Binaural,
            _ => return invalid_argument(format!("unknown loudspeaker_layout tag {tag}")),
        })
    }

    /// Total channel count carried by this layout (used to enforce the
    /// monotonically-non-decreasing-channel-count invariant across layers).
    pub fn channel_count(self) -> u32 {
        match self {
            LoudspeakerLayout::Mono => 1,
            LoudspeakerLayout::Stereo => 2,
            LoudspeakerLayout::Surround5_1 => 6,
            LoudspeakerLayout::Surround5_1_2 => 8,
            LoudspeakerLayout::Surround5_1_4 => 10,
            LoudspeakerLayout::Surround7_1 => 8,
            LoudspeakerLayout::Surround7_1_2 => 10,
            LoudspeakerLayout::Surround7_1_4 => 12,
            LoudspeakerLayout::Surround3_1_2 => 6,
            LoudspeakerLayout::Binaural => 2,
            LoudspeakerLayout::Expanded(e) => e.channel_count(),
        }
    }
}

impl ExpandedLoudspeakerLayout {
    fn tag(self) -> u8 {
        match self {
            ExpandedLoudspeakerLayout::Lfe => 0,
            ExpandedLoudspeakerLayout::StereoS => 1,
            ExpandedLoudspeakerLayout::StereoSs => 2,
            ExpandedLoudspeakerLayout::StereoTf => 3,
            ExpandedLoudspeakerLayout::StereoTb => 4,
            ExpandedLoudspeakerLayout::Top4Ch => 5,
            ExpandedLoudspeakerLayout::Layout3_0Ch => 6,
            ExpandedLoudspeakerLayout::Layout9_1_6Ch => 7,
            ExpandedLoudspeakerLayout::StereoTpSi => 8,
            ExpandedLoudspeakerLayout::Top6Ch => 9,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => ExpandedLoudspeakerLayout::Lfe,
            1 => ExpandedLoudspeakerLayout::StereoS,
            2 => ExpandedLoudspeakerLayout::StereoSs,
            3 => ExpandedLoudspeakerLayout::StereoTf,
            4 => ExpandedLoudspeakerLayout::StereoTb,
            5 => ExpandedLoudspeakerLayout::Top4Ch,
            6 => ExpandedLoudspeakerLayout::Layout3_0Ch,
            7 => ExpandedLoudspeakerLayout::Layout9_1_6Ch,
            8 => ExpandedLoudspeakerLayout::StereoTpSi,
            9 => ExpandedLoudspeakerLayout::Top6Ch,
            _ => return invalid_argument(format!("unknown expanded_loudspeaker_layout tag {tag}")),
        })
    }

    pub fn channel_count(self) -> u32 {
        match self {
            ExpandedLoudspeakerLayout::Lfe => 1,
            ExpandedLoudspeakerLayout::StereoS => 2,
            ExpandedLoudspeakerLayout::StereoSs => 2,
            ExpandedLoudspeakerLayout::StereoTf => 2,
            ExpandedLoudspeakerLayout::StereoTb => 2,
            ExpandedLoudspeakerLayout::Top4Ch => 4,
            ExpandedLoudspeakerLayout::Layout3_0Ch => 3,
            ExpandedLoudspeakerLayout::Layout9_1_6Ch => 16,
            ExpandedLoudspeakerLayout::StereoTpSi => 2,
            ExpandedLoudspeakerLayout::Top6Ch => 6,
        }
    }
}

/// Per-channel counts of a layer's contribution, used by the label-order
/// derivation in [`crate::element`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelNumbers {
    pub surround: u32,
    pub lfe: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelAudioLayerConfig {
    pub loudspeaker_layout: LoudspeakerLayout,
    pub output_gain_is_present_flag: bool,
    pub recon_gain_is_present_flag: bool,
    pub substream_count: u32,
    pub coupled_substream_count: u32,
    pub output_gain_flag: u8,
    pub output_gain: i16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalableChannelLayoutConfig {
    pub layers: Vec<ChannelAudioLayerConfig>,
}

impl ScalableChannelLayoutConfig {
    fn parse(rb: &mut BitReader<'_>, num_substreams: u32) -> Result<Self> {
        let num_layers = rb.read_un(3)? as usize;
        if !(1..=6).contains(&num_layers) {
            return invalid_argument(format!("num_layers {num_layers} out of range 1..=6"));
        }
        rb.read_un(5)?; // reserved

        let mut layers = Vec::with_capacity(num_layers);
        let mut accounted_substreams = 0u32;
        let mut prev_channel_count = 0u32;

        for _ in 0..num_layers {
            let layout_tag = rb.read_un(4)? as u8;
            let loudspeaker_layout = if layout_tag == 15 {
                LoudspeakerLayout::Expanded(ExpandedLoudspeakerLayout::Lfe)
            } else {
                LoudspeakerLayout::from_tag(layout_tag)?
            };

            let output_gain_is_present_flag = rb.read_bit()?;
            let recon_gain_is_present_flag = rb.read_bit()?;
            rb.read_un(2)?; // reserved
            let substream_count = rb.read_un(8)? as u32;
            let coupled_substream_count = rb.read_un(8)? as u32;

            let (output_gain_flag, output_gain) = if output_gain_is_present_flag {
                let flag = rb.read_un(6)? as u8;
                rb.read_un(2)?; // reserved
                let gain = rb.read_in(16)? as i16;
                (flag, gain)
            } else {
                (0, 0)
            };

            let loudspeaker_layout = if layout_tag == 15 {
                let expanded_tag = rb.read_un(8)? as u8;
                LoudspeakerLayout::Expanded(ExpandedLoudspeakerLayout::from_tag(expanded_tag)?)
            } else {
                loudspeaker_layout
            };

            if let LoudspeakerLayout::Expanded(_) = loudspeaker_layout {
                if num_layers != 1 {
                    return invalid_argument("Expanded layout may only appear as a sole layer");
                }
            }

            let channel_count = loudspeaker_layout.channel_count();
            if channel_count < prev_channel_count {
                return invalid_argument("layer channel counts must be non-decreasing");
            }
            prev_channel_count = channel_count;

            if substream_count != coupled_substream_count + non_coupled_count(substream_count, coupled_substream_count)? {
                return invalid_argument("substream_count must equal coupled + non-coupled substreams");
            }

            accounted_substreams += substream_count;
            layers.push(ChannelAudioLayerConfig {
                loudspeaker_layout,
                output_gain_is_present_flag,
                recon_gain_is_present_flag,
                substream_count,
                coupled_substream_count,
                output_gain_flag,
                output_gain,
            });
        }

        if accounted_substreams != num_substreams {
            return invalid_argument(format!(
                "sum of layer substream_count ({accounted_substreams}) does not equal num_substreams ({num_substreams})"
            ));
        }

        Ok(ScalableChannelLayoutConfig { layers })
    }

    fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        w.write_un(self.layers.len() as u64, 3)?;
        w.write_un(0, 5)?;

        for layer in &self.layers {
            let (tag, expanded_tag) = match layer.loudspeaker_layout {
                LoudspeakerLayout::Expanded(e) => (15, Some(e.tag())),
                other => (other.tag(), None),
            };
            w.write_un(u64::from(tag), 4)?;
            w.write_bit(layer.output_gain_is_present_flag);
            w.write_bit(layer.recon_gain_is_present_flag);
            w.write_un(0, 2)?;
            w.write_un(u64::from(layer.substream_count), 8)?;
            w.write_un(u64::from(layer.coupled_substream_count), 8)?;

            if layer.output_gain_is_present_flag {
                w.write_un(u64::from(layer.output_gain_flag), 6)?;
                w.write_un(0, 2)?;
                w.write_in(i64::from(layer.output_gain), 16)?;
            }

            if let Some(expanded_tag) = expanded_tag {
                w.write_un(u64::from(expanded_tag), 8)?;
            }
        }
        Ok(())
    }
}

fn non_coupled_count(substream_count: u32, coupled_substream_count: u32) -> Result<u32> {
    substream_count
        .checked_sub(coupled_substream_count)
        .ok_or(())
        .or_else(|_| invalid_argument("coupled_substream_count exceeds substream_count"))
}

/// Sentinel value in an Ambisonics Mono channel-mapping table meaning "this
/// ACN component is not carried by any substream".
pub const AMBISONICS_MONO_INACTIVE: u8 = 0xff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmbisonicsConfig {
    Mono { output_channel_count: u32, substream_count: u32, channel_mapping: Vec<u8> },
    Projection { output_channel_count: u32, substream_count: u32, coupled_substream_count: u32, demixing_matrix: Vec<i16> },
}

impl AmbisonicsConfig {
    fn parse(rb: &mut BitReader<'_>) -> Result<Self> {
        let mode = rb.read_un(2)?;
        rb.read_un(6)?; // reserved
        match mode {
            0 => {
                let output_channel_count = rb.read_un(8)? as u32;
                let substream_count = rb.read_un(8)? as u32;
                let mut channel_mapping = Vec::with_capacity(output_channel_count as usize);
                for _ in 0..output_channel_count {
                    channel_mapping.push(rb.read_un(8)? as u8);
                }
                Ok(AmbisonicsConfig::Mono { output_channel_count, substream_count, channel_mapping })
            }
            1 => {
                let output_channel_count = rb.read_un(8)? as u32;
                let substream_count = rb.read_un(8)? as u32;
                let coupled_substream_count = rb.read_un(8)? as u32;
                let entries = (substream_count + coupled_substream_count) as usize * output_channel_count as usize;
                let mut demixing_matrix = Vec::with_capacity(entries);
                for _ in 0..entries {
                    demixing_matrix.push(rb.read_in(16)? as i16);
                }
                Ok(AmbisonicsConfig::Projection { output_channel_count, substream_count, coupled_substream_count, demixing_matrix })
            }
            _ => invalid_argument("unknown ambisonics_mode"),
        }
    }

    fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        match self {
            AmbisonicsConfig::Mono { output_channel_count, substream_count, channel_mapping } => {
                w.write_un(0, 2)?;
                w.write_un(0, 6)?;
                w.write_un(u64::from(*output_channel_count), 8)?;
                w.write_un(u64::from(*substream_count), 8)?;
                for &m in channel_mapping {
                    w.write_un(u64::from(m), 8)?;
                }
            }
            AmbisonicsConfig::Projection { output_channel_count, substream_count, coupled_substream_count, demixing_matrix } => {
                w.write_un(1, 2)?;
                w.write_un(0, 6)?;
                w.write_un(u64::from(*output_channel_count), 8)?;
                w.write_un(u64::from(*substream_count), 8)?;
                w.write_un(u64::from(*coupled_substream_count), 8)?;
                for &entry in demixing_matrix {
                    w.write_in(i64::from(entry), 16)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementConfig {
    Scalable(ScalableChannelLayoutConfig),
    Ambisonics(AmbisonicsConfig),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioElement {
    pub audio_element_id: u32,
    pub audio_element_type: AudioElementType,
    pub codec_config_id: u32,
    pub audio_substream_ids: Vec<u32>,
    pub parameter_definitions: Vec<ParameterDefinition>,
    pub config: ElementConfig,
}

impl AudioElement {
    pub fn parse(rb: &mut BitReader<'_>) -> Result<Self> {
        let audio_element_id = rb.read_uleb128()?;
        let type_tag = rb.read_un(3)? as u8;
        rb.read_un(5)?; // reserved
        let audio_element_type = match type_tag {
            0 => AudioElementType::ChannelBased,
            1 => AudioElementType::SceneBased,
            _ => return invalid_argument(format!("unknown audio_element_type tag {type_tag}")),
        };
        let codec_config_id = rb.read_uleb128()?;

        let num_substreams = rb.read_uleb128()?;
        let mut audio_substream_ids = Vec::with_capacity(num_substreams as usize);
        for _ in 0..num_substreams {
            audio_substream_ids.push(rb.read_uleb128()?);
        }

        let num_parameters = rb.read_uleb128()?;
        let mut parameter_definitions = Vec::with_capacity(num_parameters as usize);
        for _ in 0..num_parameters {
            let def = ParameterDefinition::parse_element_scoped(rb)?;
            if matches!(def, ParameterDefinition::MixGain { .. }) {
                return invalid_argument("mix gain parameter definitions are forbidden on an Audio Element");
            }
            parameter_definitions.push(def);
        }

        let config = match audio_element_type {
            AudioElementType::ChannelBased => {
                ElementConfig::Scalable(ScalableChannelLayoutConfig::parse(rb, num_substreams)?)
            }
            AudioElementType::SceneBased => ElementConfig::Ambisonics(AmbisonicsConfig::parse(rb)?),
        };

        Ok(AudioElement {
            audio_element_id,
            audio_element_type,
            codec_config_id,
            audio_substream_ids,
            parameter_definitions,
            config,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        w.write_uleb128(self.audio_element_id)?;
        let type_tag = match self.audio_element_type {
            AudioElementType::ChannelBased => 0,
            AudioElementType::SceneBased => 1,
        };
        w.write_un(type_tag, 3)?;
        w.write_un(0, 5)?;
        w.write_uleb128(self.codec_config_id)?;

        w.write_uleb128(self.audio_substream_ids.len() as u32)?;
        for &id in &self.audio_substream_ids {
            w.write_uleb128(id)?;
        }

        w.write_uleb128(self.parameter_definitions.len() as u32)?;
        for def in &self.parameter_definitions {
            def.serialize(w)?;
        }

        match &self.config {
            ElementConfig::Scalable(cfg) => cfg.serialize(w)?,
            ElementConfig::Ambisonics(cfg) => cfg.serialize(w)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalable_stereo_layer_round_trips() {
        let cfg = ScalableChannelLayoutConfig {
            layers: vec![ChannelAudioLayerConfig {
                loudspeaker_layout: LoudspeakerLayout::Stereo,
                output_gain_is_present_flag: false,
                recon_gain_is_present_flag: false,
                substream_count: 1,
                coupled_substream_count: 1,
                output_gain_flag: 0,
                output_gain: 0,
            }],
        };
        let mut w = BitWriter::new();
        cfg.serialize(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let parsed = ScalableChannelLayoutConfig::parse(&mut r, 1).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn expanded_layout_rejected_when_not_sole_layer() {
        let cfg = ScalableChannelLayoutConfig {
            layers: vec![
                ChannelAudioLayerConfig {
                    loudspeaker_layout: LoudspeakerLayout::Expanded(ExpandedLoudspeakerLayout::Lfe),
                    output_gain_is_present_flag: false,
                    recon_gain_is_present_flag: false,
                    substream_count: 1,
                    coupled_substream_count: 0,
                    output_gain_flag: 0,
                    output_gain: 0,
                },
                ChannelAudioLayerConfig {
                    loudspeaker_layout: LoudspeakerLayout::Stereo,
                    output_gain_is_present_flag: false,
                    recon_gain_is_present_flag: false,
                    substream_count: 1,
                    coupled_substream_count: 1,
                    output_gain_flag: 0,
                    output_gain: 0,
                },
            ],
        };
        let mut w = BitWriter::new();
        cfg.serialize(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert!(ScalableChannelLayoutConfig::parse(&mut r, 2).is_err());
    }

    #[test]
    fn ambisonics_mono_round_trips() {
        let cfg = AmbisonicsConfig::Mono {
            output_channel_count: 4,
            substream_count: 4,
            channel_mapping: vec![0, 1, 2, 3],
        };
        let mut w = BitWriter::new();
        cfg.serialize(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(AmbisonicsConfig::parse(&mut r).unwrap(), cfg);
    }
}
