// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Rendering Mix Presentation Finalizer (spec.md §4.13). Grounded on
//! `iamf/cli/rendering_mix_presentation_finalizer.cc`: per (sub mix, layout)
//! target, reconstructs every referenced audio element's channels, renders
//! them through an injected [`AudioElementRenderer`], applies element and
//! output mix gain, sums, clips to PCM, and feeds an optional
//! [`LoudnessCalculator`]/[`SampleProcessor`]. The actual channel-layout
//! panning math is deliberately not implemented here — it lives behind the
//! renderer factory the caller supplies, mirroring how the original keeps
//! `RendererFactoryBase`/`AudioElementRendererBase` separate from this file.

use std::collections::{HashMap, HashSet};

use iamf_core::error::{invalid_argument, Result};
use iamf_core::units::q7_8;
use iamf_obu::audio_element::{AudioElement, ElementConfig, LoudspeakerLayout, ScalableChannelLayoutConfig};
use iamf_obu::channel_label::{base_channel_group_labels, labels_to_reconstruct, ChannelLabel};
use iamf_obu::codec_config::CodecConfig;
use iamf_obu::element::AudioElementWithData;
use iamf_obu::mix_presentation::{Layout, LayoutType, MixPresentation};
use iamf_obu::parameter::ParameterDefinition;

use iamf_demux::demix::{run_demix_chain, LabelSamples};
use iamf_demux::manager::{ParametersManager, ReconGainInfoParameterData};
use iamf_demux::param_state::mix_gain_linear_at_tick;

use crate::descriptor_parser::ParsedDescriptors;
use crate::loudness::LoudnessCalculator;
use crate::processor::{OutputTemporalUnit, SampleProcessor};

/// Renders one audio element's reconstructed channel samples to a target
/// layout. Built fresh per (audio element, sub mix, layout) the first time
/// that combination is seen, via [`RendererFactory`]; the finalizer never
/// implements panning itself.
pub trait AudioElementRenderer {
    /// `samples` carries every channel label this element currently has
    /// reconstructed (post demixing/recon gain); `num_ticks` is the frame's
    /// length. Implementations accumulate internally.
    fn render_labeled_frame(&mut self, samples: &LabelSamples, num_ticks: usize) -> Result<()>;

    /// Drains the accumulated render as `[tick][channel]`, sized to the
    /// target layout's channel count.
    fn flush(&mut self) -> Result<Vec<Vec<f64>>>;
}

pub type RendererFactory = dyn Fn(&AudioElementWithData, &Layout) -> Result<Box<dyn AudioElementRenderer>>;
pub type LoudnessFactory = dyn Fn(u32, u32) -> Result<Box<dyn LoudnessCalculator>>;

#[derive(Clone, Debug)]
pub struct RenderedOutput {
    pub sub_mix_index: usize,
    pub layout_index: usize,
    pub pcm: Vec<Vec<i32>>,
}

#[derive(Clone, Debug)]
pub struct MeasuredLoudness {
    pub sub_mix_index: usize,
    pub layout_index: usize,
    pub integrated_loudness: i16,
    pub digital_peak: i16,
    pub true_peak: Option<i16>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ParamKind {
    Demixing,
    ReconGain,
}

struct FinalizerTarget {
    sub_mix_index: usize,
    layout_index: usize,
    channel_count: u32,
    renderers: HashMap<u32, Box<dyn AudioElementRenderer>>,
    loudness: Option<Box<dyn LoudnessCalculator>>,
    post_processor: Option<Box<dyn SampleProcessor>>,
}

fn layout_channel_count(layout: &Layout) -> Result<u32> {
    match layout.layout_type {
        LayoutType::Binaural => Ok(2),
        LayoutType::LoudspeakersSsConventional => {
            let tag = layout
                .ss_layout_tag
                .ok_or(())
                .or_else(|_| invalid_argument("a conventional loudspeaker layout is missing its layout tag"))?;
            Ok(LoudspeakerLayout::from_tag(tag)?.channel_count())
        }
        LayoutType::Reserved(tag) => invalid_argument(format!("cannot size a reserved layout (tag {tag})")),
    }
}

fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Replays the label derivation `derive_audio_element_with_data` used for a
/// scalable layout, so recon gain fractions (ordered the same way) can be
/// matched back to the channel labels they apply to.
fn scalable_layer_labels(cfg: &ScalableChannelLayoutConfig) -> Vec<Vec<ChannelLabel>> {
    let mut accumulated: Vec<ChannelLabel> = Vec::new();
    let mut result = Vec::with_capacity(cfg.layers.len());
    for layer in &cfg.layers {
        let layer_labels = if accumulated.is_empty() {
            base_channel_group_labels(layer.loudspeaker_layout)
        } else {
            labels_to_reconstruct(layer.loudspeaker_layout, &accumulated)
        };
        accumulated.extend(layer_labels.iter().map(|l| l.base().clone()));
        result.push(layer_labels);
    }
    result
}

fn apply_output_gain(label_samples: &mut LabelSamples, gains: &HashMap<ChannelLabel, f64>) {
    for (label, samples) in label_samples.iter_mut() {
        if let Some(&gain_db) = gains.get(label.base()) {
            let linear = db_to_linear(gain_db);
            for s in samples.iter_mut() {
                *s *= linear;
            }
        }
    }
}

fn apply_recon_gain(
    label_samples: &mut LabelSamples,
    cfg: &ScalableChannelLayoutConfig,
    recon: &ReconGainInfoParameterData,
) -> Result<()> {
    let layer_labels = scalable_layer_labels(cfg);
    for (layer_index, fractions) in recon.per_layer.iter().enumerate() {
        let Some(fractions) = fractions else { continue };
        let labels = layer_labels.get(layer_index).ok_or(()).or_else(|_| invalid_argument("recon gain layer index out of range"))?;
        if labels.len() != fractions.len() {
            return invalid_argument("recon gain fraction count doesn't match this layer's channel count");
        }
        for (label, &fraction) in labels.iter().zip(fractions.iter()) {
            if let Some(samples) = label_samples.get_mut(label) {
                for s in samples.iter_mut() {
                    *s *= fraction;
                }
            }
        }
    }
    Ok(())
}

/// Resolves one mix gain parameter's linear amplitude for every tick of a
/// temporal unit; an active block's subblocks take priority over the
/// definition's constant default, and ticks past the block's own duration
/// fall back to the default too.
fn mix_gain_curve(
    definition: &ParameterDefinition,
    block: Option<&iamf_obu::parameter::ParameterBlock>,
    num_ticks: usize,
) -> Result<Vec<f64>> {
    let default_mix_gain = match definition {
        ParameterDefinition::MixGain { default_mix_gain, .. } => *default_mix_gain,
        _ => return invalid_argument("expected a mix gain parameter definition"),
    };
    let default_linear = db_to_linear(q7_8::to_f64(default_mix_gain));

    let block = match block {
        Some(b) => b,
        None => return Ok(vec![default_linear; num_ticks]),
    };

    let mut out = Vec::with_capacity(num_ticks);
    for tick in 0..num_ticks as u32 {
        if tick >= block.duration {
            out.push(default_linear);
        } else {
            out.push(mix_gain_linear_at_tick(block, tick)?);
        }
    }
    Ok(out)
}

fn clip_to_pcm(samples: &[Vec<f64>], bit_depth: u8) -> Vec<Vec<i32>> {
    let full_scale = (1i64 << (bit_depth - 1)) as f64;
    samples
        .iter()
        .map(|row| {
            row.iter()
                .map(|&s| ((s * full_scale).round()).clamp(-full_scale, full_scale - 1.0) as i32)
                .collect()
        })
        .collect()
}

/// Declared-vs-measured loudness tolerance: the original encoder and this
/// decoder round through the same q7.8 format but not necessarily the same
/// floating point path, so exact equality is too strict.
const LOUDNESS_TOLERANCE_DB: f64 = 0.1;

fn loudness_close(measured: i16, declared: i16) -> bool {
    (q7_8::to_f64(measured) - q7_8::to_f64(declared)).abs() <= LOUDNESS_TOLERANCE_DB
}

pub struct RenderingMixPresentationFinalizer {
    mix_presentation: MixPresentation,
    audio_elements: HashMap<u32, AudioElement>,
    audio_elements_with_data: HashMap<u32, AudioElementWithData>,
    codec_configs: HashMap<u32, CodecConfig>,
    parameters: ParametersManager,
    parameter_kinds: HashMap<u32, ParamKind>,
    recon_gain_registered: HashSet<u32>,
    bit_depth: u8,
    renderer_factory: Box<RendererFactory>,
    targets: Vec<FinalizerTarget>,
}

impl RenderingMixPresentationFinalizer {
    /// Builds a finalizer for one mix presentation's every sub mix and
    /// layout. `loudness_factory`, when given, is called once per (sub mix,
    /// layout) target with that target's channel count and `sample_rate`;
    /// `sample_processor_factory` likewise builds one post-processor per
    /// target.
    pub fn create(
        descriptors: &ParsedDescriptors,
        mix_presentation_id: u32,
        sample_rate: u32,
        bit_depth: u8,
        renderer_factory: Box<RendererFactory>,
        loudness_factory: Option<Box<LoudnessFactory>>,
        sample_processor_factory: Option<Box<dyn Fn() -> Box<dyn SampleProcessor>>>,
    ) -> Result<Self> {
        let mix_presentation = descriptors
            .mix_presentations
            .get(&mix_presentation_id)
            .cloned()
            .ok_or(())
            .or_else(|_| invalid_argument(format!("unknown mix presentation id {mix_presentation_id}")))?;

        let referenced_ids: HashSet<u32> = mix_presentation
            .sub_mixes
            .iter()
            .flat_map(|sub_mix| sub_mix.audio_elements.iter().map(|element| element.audio_element_id))
            .collect();

        let mut parameters = ParametersManager::new();
        let mut parameter_kinds = HashMap::new();
        let mut recon_gain_registered = HashSet::new();
        let mut audio_elements = HashMap::new();
        let mut audio_elements_with_data = HashMap::new();

        for &audio_element_id in &referenced_ids {
            let element = descriptors
                .audio_elements
                .get(&audio_element_id)
                .ok_or(())
                .or_else(|_| invalid_argument(format!("mix presentation references unknown audio element {audio_element_id}")))?;
            let with_data = descriptors
                .audio_elements_with_data
                .get(&audio_element_id)
                .ok_or(())
                .or_else(|_| invalid_argument(format!("audio element {audio_element_id} has no derived data")))?;

            parameters.register_audio_element(element)?;
            for definition in &element.parameter_definitions {
                match definition {
                    ParameterDefinition::Demixing { common, .. } => {
                        parameter_kinds.insert(common.parameter_id, ParamKind::Demixing);
                    }
                    ParameterDefinition::ReconGain { common, .. } => {
                        parameter_kinds.insert(common.parameter_id, ParamKind::ReconGain);
                        recon_gain_registered.insert(audio_element_id);
                    }
                    ParameterDefinition::MixGain { .. } => {}
                }
            }

            audio_elements.insert(audio_element_id, element.clone());
            audio_elements_with_data.insert(audio_element_id, with_data.clone());
        }

        let mut targets = Vec::new();
        for (sub_mix_index, sub_mix) in mix_presentation.sub_mixes.iter().enumerate() {
            for (layout_index, layout) in sub_mix.layouts.iter().enumerate() {
                let channel_count = layout_channel_count(layout)?;
                let loudness = match &loudness_factory {
                    Some(factory) => Some(factory(channel_count, sample_rate)?),
                    None => None,
                };
                let post_processor = sample_processor_factory.as_ref().map(|factory| factory());
                targets.push(FinalizerTarget {
                    sub_mix_index,
                    layout_index,
                    channel_count,
                    renderers: HashMap::new(),
                    loudness,
                    post_processor,
                });
            }
        }

        Ok(RenderingMixPresentationFinalizer {
            mix_presentation,
            audio_elements,
            audio_elements_with_data,
            codec_configs: descriptors.codec_configs.clone(),
            parameters,
            parameter_kinds,
            recon_gain_registered,
            bit_depth,
            renderer_factory,
            targets,
        })
    }

    fn decode_element_labels(&self, audio_element: &AudioElement, with_data: &AudioElementWithData, unit: &OutputTemporalUnit) -> Result<LabelSamples> {
        let codec_config = self
            .codec_configs
            .get(&audio_element.codec_config_id)
            .ok_or(())
            .or_else(|_| invalid_argument(format!("audio element {} references an unknown codec config", audio_element.audio_element_id)))?;
        let full_scale = (1i64 << (codec_config.bit_depth_to_measure_loudness() - 1)) as f64;

        let mut label_samples = LabelSamples::new();
        for (substream_id, labels) in &with_data.substream_labels {
            let Some(grid) = unit.decoded_substreams.get(substream_id) else { continue };
            for (channel_index, label) in labels.iter().enumerate() {
                let samples: Vec<f64> = grid.iter().map(|tick| f64::from(tick.get(channel_index).copied().unwrap_or(0)) / full_scale).collect();
                label_samples.insert(label.clone(), samples);
            }
        }
        Ok(label_samples)
    }

    /// Reconstructs and renders one temporal unit's worth of samples for
    /// every (sub mix, layout) target, returning one [`RenderedOutput`] per
    /// target. Mix-gain-bearing Parameter Blocks are read directly from
    /// `unit.parameter_blocks`; demixing and recon gain blocks are routed
    /// through the Parameters Manager and its state advanced exactly once
    /// per audio element, even when that element appears in more than one
    /// sub mix.
    pub fn render_temporal_unit(&mut self, unit: &OutputTemporalUnit) -> Result<Vec<RenderedOutput>> {
        if unit.decoded_substreams.is_empty() && unit.parameter_blocks.is_empty() {
            return Ok(Vec::new());
        }
        let (start, end) = unit
            .timestamp
            .ok_or(())
            .or_else(|_| invalid_argument("cannot render a temporal unit with no resolved timestamp"))?;
        let duration = end - start;

        for (parameter_id, block) in &unit.parameter_blocks {
            match self.parameter_kinds.get(parameter_id) {
                Some(ParamKind::Demixing) => self.parameters.ingest_demixing_block(block.clone()),
                Some(ParamKind::ReconGain) => self.parameters.ingest_recon_gain_block(block.clone()),
                None => {}
            }
        }

        let mut reconstructed: HashMap<u32, LabelSamples> = HashMap::new();
        for (&audio_element_id, audio_element) in &self.audio_elements {
            let with_data = &self.audio_elements_with_data[&audio_element_id];
            let mut label_samples = self.decode_element_labels(audio_element, with_data, unit)?;

            apply_output_gain(&mut label_samples, &with_data.label_to_output_gain_db);

            if self.parameters.demixing_param_definition_available(audio_element_id) {
                let params = self.parameters.get_down_mixing_parameters(audio_element_id)?;
                run_demix_chain(&params, &mut label_samples)?;
                if let ElementConfig::Scalable(cfg) = &audio_element.config {
                    let recon = self.parameters.get_recon_gain_info_parameter_data(audio_element_id, cfg.layers.len())?;
                    apply_recon_gain(&mut label_samples, cfg, &recon)?;
                }
                self.parameters.update_demixing_state(audio_element_id, start, duration)?;
            }
            if self.recon_gain_registered.contains(&audio_element_id) {
                self.parameters.update_recon_gain_state(audio_element_id, start, duration)?;
            }

            reconstructed.insert(audio_element_id, label_samples);
        }

        let mut outputs = Vec::with_capacity(self.targets.len());
        for target in &mut self.targets {
            let sub_mix = &self.mix_presentation.sub_mixes[target.sub_mix_index];
            let layout = &sub_mix.layouts[target.layout_index];
            let mut summed = vec![vec![0.0f64; target.channel_count as usize]; duration as usize];

            for element in &sub_mix.audio_elements {
                let with_data = &self.audio_elements_with_data[&element.audio_element_id];
                let label_samples = &reconstructed[&element.audio_element_id];

                if !target.renderers.contains_key(&element.audio_element_id) {
                    let renderer = (self.renderer_factory)(with_data, layout)?;
                    target.renderers.insert(element.audio_element_id, renderer);
                }
                let renderer = target.renderers.get_mut(&element.audio_element_id).unwrap();
                renderer.render_labeled_frame(label_samples, duration as usize)?;
                let rendered = renderer.flush()?;

                let gain_curve = mix_gain_curve(
                    &element.element_mix_gain,
                    unit.parameter_blocks.get(&element.element_mix_gain.common().parameter_id),
                    duration as usize,
                )?;

                for (t, row) in rendered.iter().enumerate() {
                    if row.len() != target.channel_count as usize {
                        return invalid_argument("renderer produced a channel count that doesn't match the target layout");
                    }
                    let gain = gain_curve[t];
                    for (c, &sample) in row.iter().enumerate() {
                        summed[t][c] += sample * gain;
                    }
                }
            }

            let output_gain_curve = mix_gain_curve(
                &sub_mix.output_mix_gain,
                unit.parameter_blocks.get(&sub_mix.output_mix_gain.common().parameter_id),
                duration as usize,
            )?;
            for (t, row) in summed.iter_mut().enumerate() {
                let gain = output_gain_curve[t];
                for sample in row.iter_mut() {
                    *sample *= gain;
                }
            }

            let mut pcm = clip_to_pcm(&summed, self.bit_depth);
            if let Some(post_processor) = &mut target.post_processor {
                post_processor.process(&mut pcm);
            }
            if let Some(calculator) = &mut target.loudness {
                calculator.accumulate_loudness_for_samples(&pcm)?;
            }

            outputs.push(RenderedOutput { sub_mix_index: target.sub_mix_index, layout_index: target.layout_index, pcm });
        }

        Ok(outputs)
    }

    /// Queries every target's accumulated loudness. When `validate_loudness`
    /// is set, each measurement is compared against the Mix Presentation's
    /// own declared `LoudnessInfo` for that layout; a mismatch is logged
    /// immediately but doesn't abort the pass, so every layout gets checked —
    /// the first error returned is for the pass as a whole.
    pub fn finalize(&mut self, validate_loudness: bool) -> Result<Vec<MeasuredLoudness>> {
        let mut measured = Vec::new();
        let mut mismatch_count = 0usize;

        for target in &self.targets {
            let Some(calculator) = &target.loudness else { continue };
            let info = calculator.query_loudness()?;
            let declared = &self.mix_presentation.sub_mixes[target.sub_mix_index].layouts[target.layout_index].loudness;

            if validate_loudness {
                if !loudness_close(info.integrated_loudness, declared.integrated_loudness) {
                    log::warn!(
                        "sub mix {} layout {}: measured integrated loudness {:.2} LKFS disagrees with declared {:.2} LKFS",
                        target.sub_mix_index,
                        target.layout_index,
                        q7_8::to_f64(info.integrated_loudness),
                        q7_8::to_f64(declared.integrated_loudness)
                    );
                    mismatch_count += 1;
                }
                if !loudness_close(info.digital_peak, declared.digital_peak) {
                    log::warn!(
                        "sub mix {} layout {}: measured digital peak {:.2} dBFS disagrees with declared {:.2} dBFS",
                        target.sub_mix_index,
                        target.layout_index,
                        q7_8::to_f64(info.digital_peak),
                        q7_8::to_f64(declared.digital_peak)
                    );
                    mismatch_count += 1;
                }
                if let (Some(measured_tp), Some(declared_tp)) = (info.true_peak, declared.true_peak) {
                    if !loudness_close(measured_tp, declared_tp) {
                        log::warn!(
                            "sub mix {} layout {}: measured true peak {:.2} dBFS disagrees with declared {:.2} dBFS",
                            target.sub_mix_index,
                            target.layout_index,
                            q7_8::to_f64(measured_tp),
                            q7_8::to_f64(declared_tp)
                        );
                        mismatch_count += 1;
                    }
                }
            }

            measured.push(MeasuredLoudness {
                sub_mix_index: target.sub_mix_index,
                layout_index: target.layout_index,
                integrated_loudness: info.integrated_loudness,
                digital_peak: info.digital_peak,
                true_peak: info.true_peak,
            });
        }

        if mismatch_count > 0 {
            return invalid_argument(format!("loudness validation failed for {mismatch_count} measurement(s); see warnings above"));
        }
        Ok(measured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_obu::audio_element::{AudioElementType, ChannelAudioLayerConfig, LoudspeakerLayout as Lsl};
    use iamf_obu::codec_config::{DecoderConfig, LpcmDecoderConfig};
    use iamf_obu::element::derive_audio_element_with_data;
    use iamf_obu::mix_presentation::{LoudnessInfo, RenderingConfig, SubMix, SubMixAudioElement};
    use iamf_obu::parameter::{MixGainAnimation, ParamDefinitionCommon, ParameterBlock, ParameterSubblock};

    struct PassthroughRenderer {
        channel_count: usize,
    }

    impl AudioElementRenderer for PassthroughRenderer {
        fn render_labeled_frame(&mut self, samples: &LabelSamples, num_ticks: usize) -> Result<()> {
            let _ = (samples, num_ticks);
            Ok(())
        }
        fn flush(&mut self) -> Result<Vec<Vec<f64>>> {
            Ok(vec![vec![0.25; self.channel_count]; 4])
        }
    }

    fn mix_gain_definition(parameter_id: u32, default_mix_gain: i16) -> ParameterDefinition {
        ParameterDefinition::MixGain {
            common: ParamDefinitionCommon {
                parameter_id,
                parameter_rate: 48_000,
                param_definition_mode: false,
                duration: 0,
                constant_subblock_duration: 0,
                subblock_durations: Vec::new(),
            },
            default_mix_gain,
        }
    }

    fn stereo_audio_element() -> AudioElement {
        AudioElement {
            audio_element_id: 1,
            audio_element_type: AudioElementType::ChannelBased,
            codec_config_id: 1,
            audio_substream_ids: vec![0],
            parameter_definitions: Vec::new(),
            config: ElementConfig::Scalable(ScalableChannelLayoutConfig {
                layers: vec![ChannelAudioLayerConfig {
                    loudspeaker_layout: Lsl::Stereo,
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

    fn descriptors_with_one_stereo_element() -> ParsedDescriptors {
        let mut descriptors = ParsedDescriptors::default();
        let element = stereo_audio_element();
        let with_data = derive_audio_element_with_data(&element).unwrap();
        descriptors.audio_elements.insert(1, element);
        descriptors.audio_elements_with_data.insert(1, with_data);
        descriptors.codec_configs.insert(
            1,
            CodecConfig {
                codec_config_id: 1,
                num_samples_per_frame: 4,
                audio_roll_distance: 0,
                decoder_config: DecoderConfig::Lpcm(LpcmDecoderConfig { sample_format_flags: 0, sample_size: 16, sample_rate: 48_000 }),
            },
        );

        let layout = Layout {
            layout_type: LayoutType::LoudspeakersSsConventional,
            ss_layout_tag: Some(1),
            loudness: LoudnessInfo::default(),
        };
        let sub_mix = SubMix {
            audio_elements: vec![SubMixAudioElement {
                audio_element_id: 1,
                rendering_config: RenderingConfig { headphones_rendering_mode: 0, extension_bytes: Vec::new() },
                element_mix_gain: mix_gain_definition(10, 0),
            }],
            output_mix_gain: mix_gain_definition(11, 0),
            layouts: vec![layout],
        };
        descriptors.mix_presentations.insert(1, MixPresentation { mix_presentation_id: 1, annotations: Vec::new(), sub_mixes: vec![sub_mix] });
        descriptors
    }

    fn unit_with_silence() -> OutputTemporalUnit {
        let mut unit = OutputTemporalUnit::default();
        unit.timestamp = Some((0, 4));
        unit.decoded_substreams.insert(0, vec![vec![0, 0]; 4]);
        unit
    }

    #[test]
    fn renders_one_target_and_applies_default_mix_gain() {
        let descriptors = descriptors_with_one_stereo_element();
        let mut finalizer = RenderingMixPresentationFinalizer::create(
            &descriptors,
            1,
            48_000,
            16,
            Box::new(|_with_data, layout| {
                let channel_count = layout_channel_count(layout).unwrap() as usize;
                Ok(Box::new(PassthroughRenderer { channel_count }) as Box<dyn AudioElementRenderer>)
            }),
            None,
            None,
        )
        .unwrap();

        let outputs = finalizer.render_temporal_unit(&unit_with_silence()).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].pcm.len(), 4);
        assert_eq!(outputs[0].pcm[0].len(), 2);
        // 0.25 full scale at 16 bits, default (0 dB) element and output gain.
        assert_eq!(outputs[0].pcm[0][0], 8192);
    }

    #[test]
    fn a_second_temporal_unit_does_not_double_commit_demixing_state() {
        let mut descriptors = descriptors_with_one_stereo_element();
        let element = descriptors.audio_elements.get_mut(&1).unwrap();
        element.parameter_definitions.push(ParameterDefinition::Demixing {
            common: ParamDefinitionCommon {
                parameter_id: 20,
                parameter_rate: 48_000,
                param_definition_mode: true,
                duration: 0,
                constant_subblock_duration: 0,
                subblock_durations: Vec::new(),
            },
            default_dmixp_mode: iamf_obu::parameter::DmixPMode::Mode1,
            default_w: 0,
        });

        let mut finalizer = RenderingMixPresentationFinalizer::create(
            &descriptors,
            1,
            48_000,
            16,
            Box::new(|_with_data, layout| {
                let channel_count = layout_channel_count(layout).unwrap() as usize;
                Ok(Box::new(PassthroughRenderer { channel_count }) as Box<dyn AudioElementRenderer>)
            }),
            None,
            None,
        )
        .unwrap();

        finalizer.render_temporal_unit(&unit_with_silence()).unwrap();
        let mut second = unit_with_silence();
        second.timestamp = Some((4, 8));
        assert!(finalizer.render_temporal_unit(&second).is_ok());
    }

    #[test]
    fn mix_gain_curve_interpolates_linear_animation() {
        let definition = mix_gain_definition(1, 0);
        let block = ParameterBlock {
            parameter_id: 1,
            duration: 4,
            constant_subblock_duration: 4,
            subblock_durations: Vec::new(),
            subblocks: vec![ParameterSubblock::MixGain {
                animation: MixGainAnimation::Linear,
                start_point_value: 0,
                end_point_value: q7_8::from_f64(6.0),
            }],
        };
        let curve = mix_gain_curve(&definition, Some(&block), 4).unwrap();
        assert!((curve[0] - 1.0).abs() < 1e-6);
        assert!(curve[3] > curve[0]);
    }
}
