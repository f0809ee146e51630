// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameter Definitions (carried on an Audio Element or Mix Presentation)
//! and Parameter Block OBUs, covering the three closed kinds: mix gain,
//! demixing, and recon gain.

use iamf_core::bitstream::{BitReader, BitWriter};
use iamf_core::error::{invalid_argument, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmixPMode {
    Mode1,
    Mode2,
    Mode3,
    Mode1n,
    Mode2n,
    Mode3n,
}

impl DmixPMode {
    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => DmixPMode::Mode1,
            2 => DmixPMode::Mode2,
            3 => DmixPMode::Mode3,
            4 => DmixPMode::Mode1n,
            5 => DmixPMode::Mode2n,
            6 => DmixPMode::Mode3n,
            _ => return invalid_argument(format!("unknown dmixp_mode tag {tag}")),
        })
    }

    fn tag(self) -> u8 {
        match self {
            DmixPMode::Mode1 => 1,
            DmixPMode::Mode2 => 2,
            DmixPMode::Mode3 => 3,
            DmixPMode::Mode1n => 4,
            DmixPMode::Mode2n => 5,
            DmixPMode::Mode3n => 6,
        }
    }
}

/// Fields shared by every parameter definition kind, regardless of whether it
/// is attached to an Audio Element or a Mix Presentation sub-mix element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDefinitionCommon {
    pub parameter_id: u32,
    pub parameter_rate: u32,
    pub param_definition_mode: bool,
    pub duration: u32,
    pub constant_subblock_duration: u32,
    pub subblock_durations: Vec<u32>,
}

impl ParamDefinitionCommon {
    fn parse(rb: &mut BitReader<'_>) -> Result<Self> {
        let parameter_id = rb.read_uleb128()?;
        let parameter_rate = rb.read_uleb128()?;
        if parameter_rate == 0 {
            return invalid_argument("parameter_rate must be greater than zero");
        }
        let param_definition_mode = rb.read_bit()?;
        rb.read_un(7)?; // reserved

        let mut duration = 0;
        let mut constant_subblock_duration = 0;
        let mut subblock_durations = Vec::new();

        if !param_definition_mode {
            duration = rb.read_uleb128()?;
            let num_subblocks = rb.read_uleb128()?;
            constant_subblock_duration = rb.read_uleb128()?;
            if constant_subblock_duration == 0 {
                let mut total = 0u32;
                for _ in 0..num_subblocks {
                    let d = rb.read_uleb128()?;
                    total += d;
                    subblock_durations.push(d);
                }
                if total != duration {
                    return invalid_argument("subblock durations must sum to duration");
                }
            }
        }

        Ok(ParamDefinitionCommon {
            parameter_id,
            parameter_rate,
            param_definition_mode,
            duration,
            constant_subblock_duration,
            subblock_durations,
        })
    }

    fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        w.write_uleb128(self.parameter_id)?;
        w.write_uleb128(self.parameter_rate)?;
        w.write_bit(self.param_definition_mode);
        w.write_un(0, 7)?;

        if !self.param_definition_mode {
            w.write_uleb128(self.duration)?;
            w.write_uleb128(self.num_subblocks())?;
            w.write_uleb128(self.constant_subblock_duration)?;
            if self.constant_subblock_duration == 0 {
                for &d in &self.subblock_durations {
                    w.write_uleb128(d)?;
                }
            }
        }
        Ok(())
    }

    /// Number of subblocks implied by this definition, per §4.6: if
    /// `constant_subblock_duration != 0`, the count is implied by
    /// `duration / constant_subblock_duration`.
    pub fn num_subblocks(&self) -> u32 {
        if self.constant_subblock_duration != 0 {
            self.duration.div_ceil(self.constant_subblock_duration)
        } else {
            self.subblock_durations.len() as u32
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterDefinition {
    MixGain { common: ParamDefinitionCommon, default_mix_gain: i16 },
    Demixing { common: ParamDefinitionCommon, default_dmixp_mode: DmixPMode, default_w: u8 },
    ReconGain { common: ParamDefinitionCommon, audio_element_id: u32 },
}

impl ParameterDefinition {
    pub fn common(&self) -> &ParamDefinitionCommon {
        match self {
            ParameterDefinition::MixGain { common, .. }
            | ParameterDefinition::Demixing { common, .. }
            | ParameterDefinition::ReconGain { common, .. } => common,
        }
    }

    /// Parses a parameter definition attached to an Audio Element (mix gain
    /// is forbidden there; the caller enforces that after parsing the tag).
    pub fn parse_element_scoped(rb: &mut BitReader<'_>) -> Result<Self> {
        Self::parse(rb)
    }

    pub fn parse(rb: &mut BitReader<'_>) -> Result<Self> {
        let kind = rb.read_uleb128()?;
        let common = ParamDefinitionCommon::parse(rb)?;
        Ok(match kind {
            0 => {
                let default_mix_gain = rb.read_in(16)? as i16;
                ParameterDefinition::MixGain { common, default_mix_gain }
            }
            1 => {
                let dmixp_tag = rb.read_un(3)? as u8;
                let default_w = rb.read_un(4)? as u8;
                rb.read_un(1)?; // reserved
                ParameterDefinition::Demixing {
                    common,
                    default_dmixp_mode: DmixPMode::from_tag(dmixp_tag)?,
                    default_w,
                }
            }
            2 => {
                let audio_element_id = rb.read_uleb128()?;
                ParameterDefinition::ReconGain { common, audio_element_id }
            }
            _ => return invalid_argument(format!("unknown parameter_definition_type {kind}")),
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        match self {
            ParameterDefinition::MixGain { common, default_mix_gain } => {
                w.write_uleb128(0)?;
                common.serialize(w)?;
                w.write_in(i64::from(*default_mix_gain), 16)?;
            }
            ParameterDefinition::Demixing { common, default_dmixp_mode, default_w } => {
                w.write_uleb128(1)?;
                common.serialize(w)?;
                w.write_un(u64::from(default_dmixp_mode.tag()), 3)?;
                w.write_un(u64::from(*default_w), 4)?;
                w.write_un(0, 1)?;
            }
            ParameterDefinition::ReconGain { common, audio_element_id } => {
                w.write_uleb128(2)?;
                common.serialize(w)?;
                w.write_uleb128(*audio_element_id)?;
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MixGainAnimation {
    Step,
    Linear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterSubblock {
    MixGain { animation: MixGainAnimation, start_point_value: i16, end_point_value: i16 },
    Demixing { dmixp_mode: DmixPMode, w_idx_offset: i8 },
    ReconGain { recon_gain_flag: u32, channel_gains: Vec<u8> },
}

impl ParameterSubblock {
    fn parse_mix_gain(rb: &mut BitReader<'_>) -> Result<Self> {
        let animation_tag = rb.read_un(2)?;
        let animation = match animation_tag {
            0 => MixGainAnimation::Step,
            1 => MixGainAnimation::Linear,
            _ => return invalid_argument(format!("unsupported mix gain animation type {animation_tag}")),
        };
        let start_point_value = rb.read_in(16)? as i16;
        let end_point_value = if animation == MixGainAnimation::Linear {
            rb.read_in(16)? as i16
        } else {
            start_point_value
        };
        Ok(ParameterSubblock::MixGain { animation, start_point_value, end_point_value })
    }

    fn parse_demixing(rb: &mut BitReader<'_>) -> Result<Self> {
        let dmixp_tag = rb.read_un(3)? as u8;
        let w_idx_offset = rb.read_in(5)? as i8;
        Ok(ParameterSubblock::Demixing { dmixp_mode: DmixPMode::from_tag(dmixp_tag)?, w_idx_offset })
    }

    fn parse_recon_gain(rb: &mut BitReader<'_>, num_channels: usize) -> Result<Self> {
        let recon_gain_flag = rb.read_uleb128()?;
        let mut channel_gains = Vec::with_capacity(num_channels);
        for i in 0..num_channels {
            if recon_gain_flag & (1 << i) != 0 {
                channel_gains.push(rb.read_u8()?);
            } else {
                channel_gains.push(iamf_core::units::q0_8::UNIT_GAIN);
            }
        }
        Ok(ParameterSubblock::ReconGain { recon_gain_flag, channel_gains })
    }

    pub fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        match self {
            ParameterSubblock::MixGain { animation, start_point_value, end_point_value } => {
                w.write_un(if *animation == MixGainAnimation::Linear { 1 } else { 0 }, 2)?;
                w.write_in(i64::from(*start_point_value), 16)?;
                if *animation == MixGainAnimation::Linear {
                    w.write_in(i64::from(*end_point_value), 16)?;
                }
            }
            ParameterSubblock::Demixing { dmixp_mode, w_idx_offset } => {
                w.write_un(u64::from(dmixp_mode.tag()), 3)?;
                w.write_in(i64::from(*w_idx_offset), 5)?;
            }
            ParameterSubblock::ReconGain { recon_gain_flag, channel_gains } => {
                w.write_uleb128(*recon_gain_flag)?;
                for (i, &gain) in channel_gains.iter().enumerate() {
                    if recon_gain_flag & (1 << i) != 0 {
                        w.write_u8(gain);
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterBlock {
    pub parameter_id: u32,
    pub duration: u32,
    pub constant_subblock_duration: u32,
    pub subblock_durations: Vec<u32>,
    pub subblocks: Vec<ParameterSubblock>,
}

impl ParameterBlock {
    /// Parses a Parameter Block whose payload shape depends on the matching
    /// definition's `param_definition_mode`: mode 1 carries its own
    /// duration/subblock layout, mode 0 reuses the definition's.
    pub fn parse(rb: &mut BitReader<'_>, definition: &ParameterDefinition, recon_gain_channels: usize) -> Result<Self> {
        let parameter_id = rb.read_uleb128()?;
        let common = definition.common();

        let (duration, constant_subblock_duration, subblock_durations) = if common.param_definition_mode {
            let duration = rb.read_uleb128()?;
            let constant_subblock_duration = rb.read_uleb128()?;
            let mut subblock_durations = Vec::new();
            if constant_subblock_duration == 0 {
                let num_subblocks = rb.read_uleb128()?;
                let mut total = 0u32;
                for _ in 0..num_subblocks {
                    let d = rb.read_uleb128()?;
                    total += d;
                    subblock_durations.push(d);
                }
                if total != duration {
                    return invalid_argument("parameter block subblock durations must sum to duration");
                }
            }
            (duration, constant_subblock_duration, subblock_durations)
        } else {
            (common.duration, common.constant_subblock_duration, common.subblock_durations.clone())
        };

        let num_subblocks = if constant_subblock_duration != 0 {
            duration.div_ceil(constant_subblock_duration)
        } else {
            subblock_durations.len() as u32
        };

        let mut subblocks = Vec::with_capacity(num_subblocks as usize);
        for _ in 0..num_subblocks {
            let subblock = match definition {
                ParameterDefinition::MixGain { .. } => ParameterSubblock::parse_mix_gain(rb)?,
                ParameterDefinition::Demixing { .. } => ParameterSubblock::parse_demixing(rb)?,
                ParameterDefinition::ReconGain { .. } => {
                    ParameterSubblock::parse_recon_gain(rb, recon_gain_channels)?
                }
            };
            subblocks.push(subblock);
        }

        Ok(ParameterBlock { parameter_id, duration, constant_subblock_duration, subblock_durations, subblocks })
    }

    pub fn serialize(&self, w: &mut BitWriter, definition: &ParameterDefinition) -> Result<()> {
        w.write_uleb128(self.parameter_id)?;
        if definition.common().param_definition_mode {
            w.write_uleb128(self.duration)?;
            w.write_uleb128(self.constant_subblock_duration)?;
            if self.constant_subblock_duration == 0 {
                w.write_uleb128(self.subblock_durations.len() as u32)?;
                for &d in &self.subblock_durations {
                    w.write_uleb128(d)?;
                }
            }
        }
        for subblock in &self.subblocks {
            subblock.serialize(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mix_gain_definition() -> ParameterDefinition {
        ParameterDefinition::MixGain {
            common: ParamDefinitionCommon {
                parameter_id: 1,
                parameter_rate: 48_000,
                param_definition_mode: true,
                duration: 0,
                constant_subblock_duration: 0,
                subblock_durations: Vec::new(),
            },
            default_mix_gain: 0,
        }
    }

    #[test]
    fn mix_gain_parameter_block_round_trips() {
        let def = mix_gain_definition();
        let block = ParameterBlock {
            parameter_id: 1,
            duration: 16,
            constant_subblock_duration: 16,
            subblock_durations: Vec::new(),
            subblocks: vec![ParameterSubblock::MixGain {
                animation: MixGainAnimation::Linear,
                start_point_value: 0,
                end_point_value: 256,
            }],
        };

        let mut w = BitWriter::new();
        block.serialize(&mut w, &def).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let parsed = ParameterBlock::parse(&mut r, &def, 0).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn recon_gain_round_trips_sparse_channels() {
        let def = ParameterDefinition::ReconGain {
            common: ParamDefinitionCommon {
                parameter_id: 2,
                parameter_rate: 48_000,
                param_definition_mode: true,
                duration: 0,
                constant_subblock_duration: 0,
                subblock_durations: Vec::new(),
            },
            audio_element_id: 7,
        };
        let block = ParameterBlock {
            parameter_id: 2,
            duration: 16,
            constant_subblock_duration: 16,
            subblock_durations: Vec::new(),
            subblocks: vec![ParameterSubblock::ReconGain {
                recon_gain_flag: 0b101,
                channel_gains: vec![200, 255, 100],
            }],
        };

        let mut w = BitWriter::new();
        block.serialize(&mut w, &def).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let parsed = ParameterBlock::parse(&mut r, &def, 3).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn duplicate_parameter_id_definitions_must_be_bit_equal() {
        let a = mix_gain_definition();
        let b = mix_gain_definition();
        assert_eq!(a, b);
    }
}
