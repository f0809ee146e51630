// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `AudioElementWithData`: the derivation that separates "what the bitstream
//! said" (the raw `AudioElement` OBU) from "what it implies" — the per
//! substream label assignment, the per-label output gain, and (for scalable
//! layouts) the per-layer channel counts.

use std::collections::HashMap;

use iamf_core::error::{invalid_argument, not_found, Result};

use crate::audio_element::{
    AmbisonicsConfig, AudioElement, ChannelNumbers, ElementConfig, AMBISONICS_MONO_INACTIVE,
};
use crate::channel_label::{base_channel_group_labels, labels_to_reconstruct, ChannelLabel};

/// `output_gain_flag` bit → the labels that bit's gain applies to, per §4.11.
fn output_gain_bit_labels(bit: u8) -> &'static [ChannelLabel] {
    match bit {
        5 => &[ChannelLabel::Mono, ChannelLabel::L2, ChannelLabel::L3],
        4 => &[ChannelLabel::R2, ChannelLabel::R3],
        3 => &[ChannelLabel::Ls5],
        2 => &[ChannelLabel::Rs5],
        1 => &[ChannelLabel::Ltf2, ChannelLabel::Ltf3],
        0 => &[ChannelLabel::Rtf2, ChannelLabel::Rtf3],
        _ => &[],
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioElementWithData {
    pub substream_labels: HashMap<u32, Vec<ChannelLabel>>,
    pub label_to_output_gain_db: HashMap<ChannelLabel, f64>,
    pub layer_channel_numbers: Vec<ChannelNumbers>,
}

/// Splits a layer's label set into `{surround, lfe, height}` counts, the
/// shape the Demixing Module consumes.
fn channel_numbers_for(labels: &[ChannelLabel]) -> ChannelNumbers {
    let mut numbers = ChannelNumbers::default();
    for label in labels {
        match label.base() {
            ChannelLabel::Lfe => numbers.lfe += 1,
            ChannelLabel::Ltf2
            | ChannelLabel::Rtf2
            | ChannelLabel::Ltf3
            | ChannelLabel::Rtf3
            | ChannelLabel::Ltf4
            | ChannelLabel::Rtf4
            | ChannelLabel::Ltb4
            | ChannelLabel::Rtb4 => numbers.height += 1,
            _ => numbers.surround += 1,
        }
    }
    numbers
}

pub fn derive_audio_element_with_data(audio_element: &AudioElement) -> Result<AudioElementWithData> {
    match &audio_element.config {
        ElementConfig::Scalable(cfg) => derive_scalable(audio_element, cfg),
        ElementConfig::Ambisonics(cfg) => derive_ambisonics(audio_element, cfg),
    }
}

fn derive_scalable(
    audio_element: &AudioElement,
    cfg: &crate::audio_element::ScalableChannelLayoutConfig,
) -> Result<AudioElementWithData> {
    let mut substream_labels = HashMap::new();
    let mut label_to_output_gain_db = HashMap::new();
    let mut layer_channel_numbers = Vec::with_capacity(cfg.layers.len());

    let mut accumulated_labels: Vec<ChannelLabel> = Vec::new();
    let mut substream_cursor = 0usize;

    for layer in &cfg.layers {
        let layer_labels = if accumulated_labels.is_empty() {
            base_channel_group_labels(layer.loudspeaker_layout)
        } else {
            labels_to_reconstruct(layer.loudspeaker_layout, &accumulated_labels)
        };

        // Only the live (non-demixed) labels carry a substream of their own;
        // a Demixed label is reconstructed by the Demixing Module from a
        // live sibling plus the lower layer, never transmitted.
        let live_labels: Vec<ChannelLabel> = layer_labels.iter().filter(|l| !l.is_demixed()).cloned().collect();

        let expected = (layer.substream_count + layer.coupled_substream_count) as usize;
        if live_labels.len() != expected {
            return invalid_argument(format!(
                "layer emits {} live labels but substream_count + coupled_substream_count is {expected}",
                live_labels.len()
            ));
        }

        layer_channel_numbers.push(channel_numbers_for(&layer_labels));

        if layer.output_gain_is_present_flag {
            for bit in 0..6u8 {
                if layer.output_gain_flag & (1 << bit) != 0 {
                    let gain_db = iamf_core::units::q7_8::to_f64(layer.output_gain);
                    for label in output_gain_bit_labels(bit) {
                        label_to_output_gain_db.insert(label.clone(), gain_db);
                    }
                }
            }
        }

        // Assign labels to substreams: coupled substreams (two labels each)
        // first, then the remaining non-coupled substreams (one label each).
        let mut label_iter = live_labels.iter();
        for _ in 0..layer.coupled_substream_count {
            let first = label_iter.next().cloned();
            let second = label_iter.next().cloned();
            let substream_id = *audio_element
                .audio_substream_ids
                .get(substream_cursor)
                .ok_or(())
                .or_else(|_| not_found("audio_substream_ids exhausted while assigning a coupled substream"))?;
            let mut labels = Vec::new();
            if let Some(l) = first {
                labels.push(l);
            }
            if let Some(l) = second {
                labels.push(l);
            }
            substream_labels.insert(substream_id, labels);
            substream_cursor += 1;
        }
        let non_coupled = layer.substream_count - layer.coupled_substream_count;
        for _ in 0..non_coupled {
            let label = label_iter.next().cloned();
            let substream_id = *audio_element
                .audio_substream_ids
                .get(substream_cursor)
                .ok_or(())
                .or_else(|_| not_found("audio_substream_ids exhausted while assigning a non-coupled substream"))?;
            substream_labels.insert(substream_id, label.into_iter().collect());
            substream_cursor += 1;
        }

        accumulated_labels.extend(layer_labels.into_iter().map(|l| l.base().clone()));
    }

    Ok(AudioElementWithData { substream_labels, label_to_output_gain_db, layer_channel_numbers })
}

fn derive_ambisonics(audio_element: &AudioElement, cfg: &AmbisonicsConfig) -> Result<AudioElementWithData> {
    let mut substream_labels: HashMap<u32, Vec<ChannelLabel>> = HashMap::new();

    match cfg {
        AmbisonicsConfig::Mono { channel_mapping, .. } => {
            for (acn_index, &mapped_substream) in channel_mapping.iter().enumerate() {
                if mapped_substream == AMBISONICS_MONO_INACTIVE {
                    continue;
                }
                let substream_id = *audio_element
                    .audio_substream_ids
                    .get(mapped_substream as usize)
                    .ok_or(())
                    .or_else(|_| invalid_argument("ambisonics channel_mapping references an out-of-range substream"))?;
                substream_labels
                    .entry(substream_id)
                    .or_default()
                    .push(ChannelLabel::Ambisonics(acn_index as u8));
            }
        }
        AmbisonicsConfig::Projection { coupled_substream_count, substream_count, .. } => {
            let mut acn = 0u8;
            for i in 0..*substream_count {
                let substream_id = *audio_element
                    .audio_substream_ids
                    .get(i as usize)
                    .ok_or(())
                    .or_else(|_| invalid_argument("projection config has more substreams than the audio element declares"))?;
                let count = if i < *coupled_substream_count { 2 } else { 1 };
                let mut labels = Vec::with_capacity(count);
                for _ in 0..count {
                    labels.push(ChannelLabel::Ambisonics(acn));
                    acn += 1;
                }
                substream_labels.insert(substream_id, labels);
            }
        }
    }

    Ok(AudioElementWithData {
        substream_labels,
        label_to_output_gain_db: HashMap::new(),
        layer_channel_numbers: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_element::{
        AudioElementType, ChannelAudioLayerConfig, LoudspeakerLayout, ScalableChannelLayoutConfig,
    };

    #[test]
    fn single_layer_stereo_assigns_one_coupled_substream() {
        let audio_element = AudioElement {
            audio_element_id: 1,
            audio_element_type: AudioElementType::ChannelBased,
            codec_config_id: 1,
            audio_substream_ids: vec![100],
            parameter_definitions: Vec::new(),
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
        };

        let derived = derive_audio_element_with_data(&audio_element).unwrap();
        assert_eq!(derived.substream_labels[&100], vec![ChannelLabel::L2, ChannelLabel::R2]);
    }

    #[test]
    fn mono_to_stereo_layer_upgrade_has_one_new_substream() {
        // The canonical scalable-layout upgrade: a mono base layer plus a
        // stereo layer that adds exactly one new, non-coupled substream
        // (L2); R2 is reconstructed by the demixer, not transmitted.
        let audio_element = AudioElement {
            audio_element_id: 1,
            audio_element_type: AudioElementType::ChannelBased,
            codec_config_id: 1,
            audio_substream_ids: vec![100, 101],
            parameter_definitions: Vec::new(),
            config: ElementConfig::Scalable(ScalableChannelLayoutConfig {
                layers: vec![
                    ChannelAudioLayerConfig {
                        loudspeaker_layout: LoudspeakerLayout::Mono,
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
                        recon_gain_is_present_flag: true,
                        substream_count: 1,
                        coupled_substream_count: 0,
                        output_gain_flag: 0,
                        output_gain: 0,
                    },
                ],
            }),
        };

        let derived = derive_audio_element_with_data(&audio_element).unwrap();
        assert_eq!(derived.substream_labels[&100], vec![ChannelLabel::Mono]);
        assert_eq!(derived.substream_labels[&101], vec![ChannelLabel::L2]);
    }

    #[test]
    fn stereo_to_5_1_layer_upgrade_counts_only_live_labels() {
        let audio_element = AudioElement {
            audio_element_id: 1,
            audio_element_type: AudioElementType::ChannelBased,
            codec_config_id: 1,
            audio_substream_ids: vec![100, 101, 102, 103],
            parameter_definitions: Vec::new(),
            config: ElementConfig::Scalable(ScalableChannelLayoutConfig {
                layers: vec![
                    ChannelAudioLayerConfig {
                        loudspeaker_layout: LoudspeakerLayout::Stereo,
                        output_gain_is_present_flag: false,
                        recon_gain_is_present_flag: false,
                        substream_count: 1,
                        coupled_substream_count: 1,
                        output_gain_flag: 0,
                        output_gain: 0,
                    },
                    ChannelAudioLayerConfig {
                        loudspeaker_layout: LoudspeakerLayout::Surround5_1,
                        output_gain_is_present_flag: false,
                        recon_gain_is_present_flag: true,
                        substream_count: 3,
                        coupled_substream_count: 1,
                        output_gain_flag: 0,
                        output_gain: 0,
                    },
                ],
            }),
        };

        let derived = derive_audio_element_with_data(&audio_element).unwrap();
        assert_eq!(derived.substream_labels[&100], vec![ChannelLabel::L2, ChannelLabel::R2]);
        // L5/R5 are demixed (reconstructed from L2/R2), so they consume no
        // substream of their own; only Ls5/Rs5 (coupled) and Centre/Lfe
        // (non-coupled) get assigned across the three new substreams.
        assert_eq!(derived.substream_labels[&101], vec![ChannelLabel::Ls5, ChannelLabel::Rs5]);
        assert_eq!(derived.substream_labels[&102], vec![ChannelLabel::Centre]);
        assert_eq!(derived.substream_labels[&103], vec![ChannelLabel::Lfe]);
    }

    #[test]
    fn ambisonics_mono_skips_inactive_sentinel() {
        let audio_element = AudioElement {
            audio_element_id: 2,
            audio_element_type: AudioElementType::SceneBased,
            codec_config_id: 1,
            audio_substream_ids: vec![200, 201],
            parameter_definitions: Vec::new(),
            config: ElementConfig::Ambisonics(AmbisonicsConfig::Mono {
                output_channel_count: 3,
                substream_count: 2,
                channel_mapping: vec![0, AMBISONICS_MONO_INACTIVE, 1],
            }),
        };

        let derived = derive_audio_element_with_data(&audio_element).unwrap();
        assert_eq!(derived.substream_labels[&200], vec![ChannelLabel::Ambisonics(0)]);
        assert_eq!(derived.substream_labels[&201], vec![ChannelLabel::Ambisonics(2)]);
    }
}
