// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Parameters Manager: aggregates parameter blocks by audio element and
//! by kind, hands out the value active for the current frame, and advances
//! its per-element state machines on notification from the frame generator.

use std::collections::HashMap;

use iamf_core::error::{failed_precondition, invalid_argument, Result};
use iamf_core::units::Tick;
use iamf_obu::audio_element::AudioElement;
use iamf_obu::parameter::{ParameterBlock, ParameterDefinition};

use crate::demix::{clamp_w_idx, coefficients_for_mode, w_from_idx, DownMixingParams};
use crate::param_state::recon_gain_fractions;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateRule {
    FirstFrame,
    SubsequentFrame,
    Default,
}

#[derive(Clone, Debug)]
struct DemixingElementState {
    parameter_id: u32,
    previous_w_idx: u8,
    w_idx: u8,
    next_timestamp: Tick,
    update_rule: UpdateRule,
}

#[derive(Clone, Debug)]
struct ReconGainElementState {
    /// One parameter id per non-base layer, in layer order.
    parameter_ids: Vec<u32>,
    next_timestamp: Tick,
}

/// The resolved recon gain for every non-base layer of an audio element at
/// the current frame; `None` for a layer with no active recon gain block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconGainInfoParameterData {
    pub per_layer: Vec<Option<Vec<f64>>>,
}

#[derive(Default)]
pub struct ParametersManager {
    demixing_definitions: HashMap<u32, ParameterDefinition>,
    recon_gain_definitions: HashMap<u32, ParameterDefinition>,
    demixing_blocks: HashMap<u32, ParameterBlock>,
    recon_gain_blocks: HashMap<u32, ParameterBlock>,
    demixing_state: HashMap<u32, DemixingElementState>,
    recon_gain_state: HashMap<u32, ReconGainElementState>,
}

impl ParametersManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans an audio element's parameter definitions, registering its
    /// demixing and recon gain tables and priming per element state.
    pub fn register_audio_element(&mut self, audio_element: &AudioElement) -> Result<()> {
        let mut recon_gain_parameter_ids = Vec::new();

        for definition in &audio_element.parameter_definitions {
            match definition {
                ParameterDefinition::Demixing { common, default_w, .. } => {
                    self.demixing_state.insert(
                        audio_element.audio_element_id,
                        DemixingElementState {
                            parameter_id: common.parameter_id,
                            previous_w_idx: *default_w,
                            w_idx: *default_w,
                            next_timestamp: 0,
                            update_rule: UpdateRule::FirstFrame,
                        },
                    );
                    self.demixing_definitions.insert(common.parameter_id, definition.clone());
                }
                ParameterDefinition::ReconGain { common, .. } => {
                    recon_gain_parameter_ids.push(common.parameter_id);
                    self.recon_gain_definitions.insert(common.parameter_id, definition.clone());
                }
                ParameterDefinition::MixGain { .. } => {
                    return invalid_argument("mix gain parameter definitions are not valid on an audio element");
                }
            }
        }

        if !recon_gain_parameter_ids.is_empty() {
            self.recon_gain_state.insert(
                audio_element.audio_element_id,
                ReconGainElementState { parameter_ids: recon_gain_parameter_ids, next_timestamp: 0 },
            );
        }

        Ok(())
    }

    /// Records a freshly parsed Parameter Block as the active block for its
    /// `parameter_id`. The caller has already validated its timestamps
    /// against the Global Timing Module.
    pub fn ingest_demixing_block(&mut self, block: ParameterBlock) {
        self.demixing_blocks.insert(block.parameter_id, block);
    }

    pub fn ingest_recon_gain_block(&mut self, block: ParameterBlock) {
        self.recon_gain_blocks.insert(block.parameter_id, block);
    }

    pub fn demixing_param_definition_available(&self, audio_element_id: u32) -> bool {
        self.demixing_state.contains_key(&audio_element_id)
    }

    /// Resolves this frame's down-mixing parameters without committing any
    /// state change: if a block is active at `next_timestamp`, it previews
    /// the `w_idx` that a subsequent `update_demixing_state` call would
    /// commit; otherwise it falls back to the parameter definition's
    /// defaults.
    pub fn get_down_mixing_parameters(&mut self, audio_element_id: u32) -> Result<DownMixingParams> {
        let state = self
            .demixing_state
            .get_mut(&audio_element_id)
            .ok_or_else(|| iamf_core::Error::InvalidArgument(format!("no demixing parameter for audio element {audio_element_id}")))?;

        let definition = self.demixing_definitions.get(&state.parameter_id);
        let active_block = self.demixing_blocks.get(&state.parameter_id);

        if let Some(block) = active_block {
            if let Some(subblock) = block.subblocks.first() {
                if let iamf_obu::parameter::ParameterSubblock::Demixing { dmixp_mode, w_idx_offset } = subblock {
                    state.w_idx = clamp_w_idx(i32::from(state.previous_w_idx), i32::from(*w_idx_offset));
                    state.update_rule = UpdateRule::SubsequentFrame;
                    let (alpha, beta, gamma, delta) = coefficients_for_mode(*dmixp_mode);
                    return Ok(DownMixingParams { alpha, beta, gamma, delta, w: w_from_idx(state.w_idx) });
                }
            }
        }

        match definition {
            Some(ParameterDefinition::Demixing { default_dmixp_mode, default_w, .. }) => {
                state.w_idx = *default_w;
                state.update_rule = UpdateRule::Default;
                let (alpha, beta, gamma, delta) = coefficients_for_mode(*default_dmixp_mode);
                Ok(DownMixingParams { alpha, beta, gamma, delta, w: w_from_idx(*default_w) })
            }
            _ => invalid_argument(format!("missing demixing parameter definition for audio element {audio_element_id}")),
        }
    }

    pub fn get_recon_gain_info_parameter_data(
        &self,
        audio_element_id: u32,
        num_layers: usize,
    ) -> Result<ReconGainInfoParameterData> {
        let state = match self.recon_gain_state.get(&audio_element_id) {
            Some(state) => state,
            None => return Ok(ReconGainInfoParameterData { per_layer: vec![None; num_layers] }),
        };

        let mut per_layer = vec![None; num_layers];
        // Layer 0 is the base layer and never carries recon gain.
        for (layer_index, &parameter_id) in state.parameter_ids.iter().enumerate() {
            let target = layer_index + 1;
            if target >= num_layers {
                break;
            }
            if let Some(block) = self.recon_gain_blocks.get(&parameter_id) {
                if let Some(subblock) = block.subblocks.first() {
                    per_layer[target] = Some(recon_gain_fractions(subblock)?);
                }
            }
        }
        Ok(ReconGainInfoParameterData { per_layer })
    }

    /// Commits the `w_idx` previewed by the last `get_down_mixing_parameters`
    /// call and advances this element's timestamp by `frame_duration`.
    pub fn update_demixing_state(
        &mut self,
        audio_element_id: u32,
        expected_next_timestamp: Tick,
        frame_duration: Tick,
    ) -> Result<()> {
        let state = self
            .demixing_state
            .get_mut(&audio_element_id)
            .ok_or_else(|| iamf_core::Error::InvalidArgument(format!("no demixing parameter for audio element {audio_element_id}")))?;
        if state.next_timestamp != expected_next_timestamp {
            return failed_precondition("demixing state updated out of sequence with the global timeline");
        }
        state.previous_w_idx = state.w_idx;
        state.next_timestamp += frame_duration;
        Ok(())
    }

    pub fn update_recon_gain_state(
        &mut self,
        audio_element_id: u32,
        expected_next_timestamp: Tick,
        frame_duration: Tick,
    ) -> Result<()> {
        let state = self
            .recon_gain_state
            .get_mut(&audio_element_id)
            .ok_or_else(|| iamf_core::Error::InvalidArgument(format!("no recon gain parameter for audio element {audio_element_id}")))?;
        if state.next_timestamp != expected_next_timestamp {
            return failed_precondition("recon gain state updated out of sequence with the global timeline");
        }
        state.next_timestamp += frame_duration;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_obu::audio_element::{AudioElementType, ChannelAudioLayerConfig, ElementConfig, LoudspeakerLayout, ScalableChannelLayoutConfig};
    use iamf_obu::parameter::{DmixPMode, ParamDefinitionCommon, ParameterSubblock};

    fn demixing_definition(parameter_id: u32) -> ParameterDefinition {
        ParameterDefinition::Demixing {
            common: ParamDefinitionCommon {
                parameter_id,
                parameter_rate: 48_000,
                param_definition_mode: true,
                duration: 0,
                constant_subblock_duration: 0,
                subblock_durations: Vec::new(),
            },
            default_dmixp_mode: DmixPMode::Mode1,
            default_w: 0,
        }
    }

    fn element_with(definitions: Vec<ParameterDefinition>) -> AudioElement {
        AudioElement {
            audio_element_id: 1,
            audio_element_type: AudioElementType::ChannelBased,
            codec_config_id: 1,
            audio_substream_ids: vec![100],
            parameter_definitions: definitions,
            config: ElementConfig::Scalable(ScalableChannelLayoutConfig {
                layers: vec![ChannelAudioLayerConfig {
                    loudspeaker_layout: LoudspeakerLayout::Stereo,
                    output_gain_is_present_flag: false,
                    recon_gain_is_present_flag: false,
                    substream_count: 1,
                    coupled_substream_count: 1,
                    output_gain_flag: 0,
                    output_gain: 0,
                }],
            }),
        }
    }

    #[test]
    fn falls_back_to_defaults_with_no_active_block() {
        let mut manager = ParametersManager::new();
        manager.register_audio_element(&element_with(vec![demixing_definition(9)])).unwrap();
        assert!(manager.demixing_param_definition_available(1));
        let params = manager.get_down_mixing_parameters(1).unwrap();
        assert_eq!(params.w, w_from_idx(0));
    }

    #[test]
    fn active_block_previews_then_commits_on_update() {
        let mut manager = ParametersManager::new();
        manager.register_audio_element(&element_with(vec![demixing_definition(9)])).unwrap();
        manager.ingest_demixing_block(ParameterBlock {
            parameter_id: 9,
            duration: 8,
            constant_subblock_duration: 8,
            subblock_durations: Vec::new(),
            subblocks: vec![ParameterSubblock::Demixing { dmixp_mode: DmixPMode::Mode2, w_idx_offset: 3 }],
        });

        let params = manager.get_down_mixing_parameters(1).unwrap();
        assert_eq!(params.w, w_from_idx(3));

        manager.update_demixing_state(1, 0, 8).unwrap();
        let err = manager.update_demixing_state(1, 0, 8);
        assert!(err.is_err());
    }

    #[test]
    fn unregistered_element_is_rejected() {
        let manager = ParametersManager::new();
        assert!(!manager.demixing_param_definition_available(42));
    }
}
