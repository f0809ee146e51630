// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The OBU Processor: assembles one temporal unit at a time from a
//! continuing OBU stream, after the descriptor prefix has been parsed
//! (spec.md §4.12). Decodes each substream's Audio Frame through its codec
//! adapter and hands Parameter Blocks through unparsed-to-values — the
//! demixing/recon gain algebra that turns them into PCM belongs to the
//! renderer built on top of this module, not this module itself.

use std::collections::HashMap;

use iamf_core::bitstream::BitReader;
use iamf_core::error::{invalid_argument, Result};
use iamf_core::units::Tick;
use iamf_core::Error;
use iamf_obu::audio_frame::AudioFrame;
use iamf_obu::header::{ObuHeader, ObuType};
use iamf_obu::mix_presentation::Layout;
use iamf_obu::parameter::{ParameterBlock, ParameterDefinition};

use iamf_codecs::{init_decoders_for_substreams, Decoder, SampleGrid};
use iamf_demux::GlobalTimingModule;

use crate::descriptor_parser::{process_descriptor_obus, ParsedDescriptors};

/// A caller-supplied post-processing stage applied to rendered PCM, e.g. a
/// limiter or dither stage; constructed fresh per (sub mix, layout) pair.
pub trait SampleProcessor {
    fn process(&mut self, pcm: &mut [Vec<i32>]);
}

/// Everything assembled for one temporal unit.
#[derive(Debug, Default)]
pub struct OutputTemporalUnit {
    /// The `[start, end)` span every substream's cursor agreed on, once the
    /// unit is complete. `None` only happens on a malformed unit the caller
    /// never sees (processing returns an error instead).
    pub timestamp: Option<(Tick, Tick)>,
    pub decoded_substreams: HashMap<u32, SampleGrid>,
    pub parameter_blocks: HashMap<u32, ParameterBlock>,
    pub end_of_sequence: bool,
}

impl OutputTemporalUnit {
    fn clear(&mut self) {
        self.timestamp = None;
        self.decoded_substreams.clear();
        self.parameter_blocks.clear();
        self.end_of_sequence = false;
    }

    fn is_empty(&self) -> bool {
        self.decoded_substreams.is_empty() && self.parameter_blocks.is_empty()
    }
}

/// A selected (mix presentation, sub mix, layout) triple, resolved during
/// [`ObuProcessor::create_for_rendering`].
#[derive(Clone, Debug)]
pub struct RenderingTarget {
    pub mix_presentation_id: u32,
    pub sub_mix_index: usize,
    pub layout_index: usize,
}

fn recon_gain_channel_counts(
    audio_element: &iamf_obu::audio_element::AudioElement,
    with_data: &iamf_obu::element::AudioElementWithData,
) -> HashMap<u32, usize> {
    let mut counts = HashMap::new();
    let mut layer_index = 0usize;
    for definition in &audio_element.parameter_definitions {
        if let ParameterDefinition::ReconGain { common, .. } = definition {
            let target = layer_index + 1;
            let channels = with_data
                .layer_channel_numbers
                .get(target)
                .map(|n| (n.surround + n.lfe + n.height) as usize)
                .unwrap_or(0);
            counts.insert(common.parameter_id, channels);
            layer_index += 1;
        }
    }
    counts
}

/// Placeholder rate for codecs whose `CodecConfig` doesn't carry its own
/// output sample rate (AAC-LC, FLAC): the Global Timing Module only checks
/// this value for non-zero-ness, never converts by it, so any nonzero
/// constant is safe. `num_samples_per_frame` is guaranteed nonzero by
/// `CodecConfig::parse`.
fn substream_rate_for(codec_config: &iamf_obu::codec_config::CodecConfig) -> u32 {
    let rate = codec_config.output_sample_rate();
    if rate != 0 {
        rate
    } else {
        codec_config.num_samples_per_frame
    }
}

pub struct ObuProcessor<'a> {
    rb: BitReader<'a>,
    descriptors: ParsedDescriptors,
    parameter_definitions: HashMap<u32, ParameterDefinition>,
    recon_gain_channels: HashMap<u32, usize>,
    decoders: HashMap<u32, Box<dyn Decoder>>,
    timing: GlobalTimingModule,
    pub rendering_target: Option<RenderingTarget>,
    sample_processor_factory: Option<Box<dyn Fn() -> Box<dyn SampleProcessor>>>,
}

impl<'a> ObuProcessor<'a> {
    /// Parses the descriptor prefix and builds every per-substream decoder
    /// and timing cursor needed to assemble temporal units. `rb` is advanced
    /// past the consumed descriptors; the returned processor continues
    /// reading from a cursor starting at that same position, so the caller
    /// should route all further reads through the processor rather than `rb`.
    pub fn create(
        rb: &mut BitReader<'a>,
        is_exhaustive_and_exact: bool,
        insufficient_data: &mut bool,
    ) -> Result<Option<Self>> {
        let descriptors = match process_descriptor_obus(rb, is_exhaustive_and_exact, insufficient_data)? {
            Some(d) => d,
            None => return Ok(None),
        };
        Ok(Some(Self::from_descriptors(rb.clone(), descriptors, None)?))
    }

    /// Like [`Self::create`], but also validates the sequence's declared
    /// profile against `desired_profiles` and resolves a rendering target:
    /// the first mix presentation (and, within it, the first layout matching
    /// `desired_layout` if given, else the first layout). The resolved
    /// layout is written to `*output_layout`. `sample_processor_factory` is
    /// stashed for the renderer built on top of this processor to use.
    pub fn create_for_rendering(
        desired_profiles: &[u8],
        desired_layout: Option<&Layout>,
        sample_processor_factory: Box<dyn Fn() -> Box<dyn SampleProcessor>>,
        is_exhaustive_and_exact: bool,
        rb: &mut BitReader<'a>,
        output_layout: &mut Option<Layout>,
        insufficient_data: &mut bool,
    ) -> Result<Option<Self>> {
        let descriptors = match process_descriptor_obus(rb, is_exhaustive_and_exact, insufficient_data)? {
            Some(d) => d,
            None => return Ok(None),
        };

        if let Some(header) = &descriptors.ia_sequence_header {
            if !desired_profiles.is_empty()
                && !desired_profiles.contains(&header.primary_profile)
                && !desired_profiles.contains(&header.additional_profile)
            {
                return invalid_argument(format!(
                    "sequence profile ({}, {}) is not among the accepted profiles",
                    header.primary_profile, header.additional_profile
                ));
            }
        }

        let mut target = None;
        let mut layout = None;
        'outer: for mix in descriptors.mix_presentations.values() {
            for (sub_mix_index, sub_mix) in mix.sub_mixes.iter().enumerate() {
                for (layout_index, candidate) in sub_mix.layouts.iter().enumerate() {
                    let matches = match desired_layout {
                        Some(desired) => candidate.layout_type == desired.layout_type && candidate.ss_layout_tag == desired.ss_layout_tag,
                        None => true,
                    };
                    if matches {
                        target = Some(RenderingTarget {
                            mix_presentation_id: mix.mix_presentation_id,
                            sub_mix_index,
                            layout_index,
                        });
                        layout = Some(candidate.clone());
                        break 'outer;
                    }
                }
            }
        }

        let target = target.ok_or(()).or_else(|_| invalid_argument("no mix presentation/layout matched the requested rendering target"))?;
        *output_layout = layout;

        let mut processor = Self::from_descriptors(rb.clone(), descriptors, Some(sample_processor_factory))?;
        processor.rendering_target = Some(target);
        Ok(Some(processor))
    }

    fn from_descriptors(
        rb: BitReader<'a>,
        descriptors: ParsedDescriptors,
        sample_processor_factory: Option<Box<dyn Fn() -> Box<dyn SampleProcessor>>>,
    ) -> Result<Self> {
        let mut parameter_definitions = HashMap::new();
        let mut recon_gain_channels = HashMap::new();
        let mut decoders: HashMap<u32, Box<dyn Decoder>> = HashMap::new();
        let mut substream_rates = Vec::new();
        let mut parameter_rates = Vec::new();

        for (audio_element_id, audio_element) in &descriptors.audio_elements {
            let with_data = descriptors
                .audio_elements_with_data
                .get(audio_element_id)
                .ok_or(())
                .or_else(|_| invalid_argument(format!("audio element {audio_element_id} has no derived data")))?;
            let codec_config = descriptors
                .codec_configs
                .get(&audio_element.codec_config_id)
                .ok_or(())
                .or_else(|_| invalid_argument(format!("audio element {audio_element_id} references an unknown codec config")))?;

            for definition in &audio_element.parameter_definitions {
                let common = definition.common();
                parameter_definitions.insert(common.parameter_id, definition.clone());
                parameter_rates.push((common.parameter_id, common.parameter_rate));
            }
            recon_gain_channels.extend(recon_gain_channel_counts(audio_element, with_data));

            let rate = substream_rate_for(codec_config);
            for &substream_id in with_data.substream_labels.keys() {
                substream_rates.push((substream_id, rate));
            }

            let element_decoders = init_decoders_for_substreams(&with_data.substream_labels, codec_config)?;
            for (substream_id, decoder) in element_decoders {
                if decoders.insert(substream_id, decoder).is_some() {
                    return invalid_argument(format!("duplicate substream id {substream_id} across audio elements"));
                }
            }
        }

        for mix in descriptors.mix_presentations.values() {
            for sub_mix in &mix.sub_mixes {
                for element in &sub_mix.audio_elements {
                    let common = element.element_mix_gain.common();
                    parameter_definitions.insert(common.parameter_id, element.element_mix_gain.clone());
                    parameter_rates.push((common.parameter_id, common.parameter_rate));
                }
                let common = sub_mix.output_mix_gain.common();
                parameter_definitions.insert(common.parameter_id, sub_mix.output_mix_gain.clone());
                parameter_rates.push((common.parameter_id, common.parameter_rate));
            }
        }

        parameter_rates.sort_unstable_by_key(|&(id, _)| id);
        parameter_rates.dedup_by_key(|&mut (id, _)| id);

        let timing = GlobalTimingModule::new(&substream_rates, &parameter_rates)?;

        Ok(ObuProcessor {
            rb,
            descriptors,
            parameter_definitions,
            recon_gain_channels,
            decoders,
            timing,
            rendering_target: None,
            sample_processor_factory,
        })
    }

    pub fn descriptors(&self) -> &ParsedDescriptors {
        &self.descriptors
    }

    pub fn new_sample_processor(&self) -> Option<Box<dyn SampleProcessor>> {
        self.sample_processor_factory.as_ref().map(|factory| factory())
    }

    /// Assembles and decodes one temporal unit. Returns with
    /// `*continue_processing = false` once the buffered data runs out before
    /// a full unit is available — the caller should refill and call again
    /// (or, if `eos_is_end_of_sequence`, treat this as the true end and set
    /// `out.end_of_sequence`). A unit that decodes to zero Audio Frames and
    /// zero Parameter Blocks (an artifact of a stray leading Temporal
    /// Delimiter, not a real gap) is silently skipped rather than handed to
    /// the caller empty.
    pub fn process_temporal_unit(
        &mut self,
        eos_is_end_of_sequence: bool,
        out: &mut OutputTemporalUnit,
        continue_processing: &mut bool,
    ) -> Result<()> {
        loop {
            out.clear();
            *continue_processing = true;

            match self.assemble_one_unit(eos_is_end_of_sequence, out, continue_processing)? {
                AssembleOutcome::Ran => {
                    if out.is_empty() && !out.end_of_sequence {
                        continue;
                    }
                    return Ok(());
                }
                AssembleOutcome::OutOfData => {
                    out.clear();
                    *continue_processing = false;
                    if eos_is_end_of_sequence {
                        out.end_of_sequence = true;
                    }
                    return Ok(());
                }
            }
        }
    }

    fn assemble_one_unit(
        &mut self,
        eos_is_end_of_sequence: bool,
        out: &mut OutputTemporalUnit,
        continue_processing: &mut bool,
    ) -> Result<AssembleOutcome> {
        let _ = continue_processing;

        // Consume OBUs until we've established we're at (or past) a
        // Temporal Delimiter that opens this unit, discarding any redundant
        // descriptors or reserved OBUs interleaved mid-stream.
        loop {
            let header_start = self.rb.tell();
            let peeked = self.rb.peek_obu_type_and_total_size();
            let (obu_type_u5, redundant, _trimming, _extension, total_size) = match peeked {
                Ok(v) => v,
                Err(Error::ResourceExhausted(_)) => return Ok(AssembleOutcome::OutOfData),
                Err(e) => return Err(e),
            };
            if !self.rb.can_read_bytes(total_size) {
                return Ok(AssembleOutcome::OutOfData);
            }
            let obu_type = ObuType::from_u5(obu_type_u5)?;

            match obu_type {
                ObuType::TemporalDelimiter => {
                    let (_header, payload_size) = ObuHeader::parse(&mut self.rb)?;
                    self.rb.read_bytes(payload_size)?;
                    break;
                }
                ObuType::ParameterBlock | ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                    // No leading delimiter buffered yet; this unit's members
                    // start right here.
                    break;
                }
                ObuType::IaSequenceHeader if !redundant => {
                    self.rb.seek(header_start)?;
                    return invalid_argument("a non-redundant IA Sequence Header mid-stream is not allowed");
                }
                ObuType::IaSequenceHeader
                | ObuType::CodecConfig
                | ObuType::AudioElement
                | ObuType::MixPresentation
                | ObuType::Reserved(_) => {
                    let (_header, payload_size) = ObuHeader::parse(&mut self.rb)?;
                    self.rb.read_bytes(payload_size)?;
                }
            }
        }

        let members_start = self.rb.tell();
        loop {
            let peeked = self.rb.peek_obu_type_and_total_size();
            let (obu_type_u5, _redundant, _trimming, _extension, total_size) = match peeked {
                Ok(v) => v,
                Err(Error::ResourceExhausted(_)) => {
                    self.rb.seek(members_start)?;
                    return Ok(AssembleOutcome::OutOfData);
                }
                Err(e) => return Err(e),
            };
            if !self.rb.can_read_bytes(total_size) {
                self.rb.seek(members_start)?;
                return Ok(AssembleOutcome::OutOfData);
            }
            let obu_type = ObuType::from_u5(obu_type_u5)?;
            if matches!(obu_type, ObuType::TemporalDelimiter) {
                break;
            }

            match obu_type {
                ObuType::ParameterBlock => {
                    let (_header, payload_size) = ObuHeader::parse(&mut self.rb)?;
                    let payload_start = self.rb.tell();
                    let mut scratch = self.rb.clone();
                    let parameter_id = scratch.read_uleb128()?;
                    let definition = self
                        .parameter_definitions
                        .get(&parameter_id)
                        .ok_or(())
                        .or_else(|_| invalid_argument(format!("parameter block references unknown parameter id {parameter_id}")))?
                        .clone();
                    let recon_gain_channels = *self.recon_gain_channels.get(&parameter_id).unwrap_or(&0);
                    let block = ParameterBlock::parse(&mut self.rb, &definition, recon_gain_channels)?;
                    let consumed_bits = self.rb.tell() - payload_start;
                    debug_assert!(consumed_bits <= payload_size * 8);
                    out.parameter_blocks.insert(parameter_id, block);
                }
                ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                    let (header, payload_size) = ObuHeader::parse(&mut self.rb)?;
                    let frame = AudioFrame::parse(&mut self.rb, obu_type, payload_size)?;
                    let decoder = self
                        .decoders
                        .get_mut(&frame.substream_id)
                        .ok_or(())
                        .or_else(|_| invalid_argument(format!("audio frame references unknown substream id {}", frame.substream_id)))?;
                    let mut grid = decoder.decode(&frame)?;

                    let (status, (start, end)) = self.timing.next_audio_frame_timestamps(frame.substream_id, grid.len() as Tick);
                    status?;
                    match out.timestamp {
                        Some(existing) if existing != (start, end) => {
                            return invalid_argument(format!(
                                "substream {} timestamp ({start}, {end}) disagrees with the unit's ({}, {})",
                                frame.substream_id, existing.0, existing.1
                            ));
                        }
                        _ => out.timestamp = Some((start, end)),
                    }

                    let trim_end = header.num_samples_to_trim_at_end as usize;
                    let trim_start = header.num_samples_to_trim_at_start as usize;
                    if trim_start + trim_end > grid.len() {
                        return invalid_argument("trim amounts exceed the decoded frame length");
                    }
                    grid.drain(0..trim_start);
                    let keep = grid.len() - trim_end;
                    grid.truncate(keep);

                    out.decoded_substreams.insert(frame.substream_id, grid);
                }
                ObuType::IaSequenceHeader
                | ObuType::CodecConfig
                | ObuType::AudioElement
                | ObuType::MixPresentation
                | ObuType::Reserved(_) => {
                    let (_header, payload_size) = ObuHeader::parse(&mut self.rb)?;
                    self.rb.read_bytes(payload_size)?;
                }
                ObuType::TemporalDelimiter => unreachable!("filtered out above"),
            }
        }

        Ok(AssembleOutcome::Ran)
    }
}

enum AssembleOutcome {
    Ran,
    OutOfData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_core::bitstream::BitWriter;
    use iamf_obu::codec_config::{CodecConfig, DecoderConfig, LpcmDecoderConfig};
    use iamf_obu::audio_element::{AudioElementType, ChannelAudioLayerConfig, ElementConfig, LoudspeakerLayout, ScalableChannelLayoutConfig};
    use iamf_obu::sequence_header::IaSequenceHeader;

    fn write_obu(w: &mut BitWriter, obu_type: ObuType, payload: &[u8]) {
        let header = ObuHeader::new(obu_type);
        header.serialize(w, payload.len()).unwrap();
        w.write_bytes(payload).unwrap();
    }

    fn stereo_lpcm_stream() -> Vec<u8> {
        let mut w = BitWriter::new();

        let mut seq = BitWriter::new();
        IaSequenceHeader { primary_profile: 0, additional_profile: 0 }.serialize(&mut seq).unwrap();
        write_obu(&mut w, ObuType::IaSequenceHeader, &seq.into_bytes());

        let codec_config = CodecConfig {
            codec_config_id: 1,
            num_samples_per_frame: 4,
            audio_roll_distance: 0,
            decoder_config: DecoderConfig::Lpcm(LpcmDecoderConfig { sample_format_flags: 0, sample_size: 16, sample_rate: 48_000 }),
        };
        let mut cfg_payload = BitWriter::new();
        codec_config.serialize(&mut cfg_payload).unwrap();
        write_obu(&mut w, ObuType::CodecConfig, &cfg_payload.into_bytes());

        use iamf_obu::audio_element::AudioElement;
        let audio_element = AudioElement {
            audio_element_id: 1,
            audio_element_type: AudioElementType::ChannelBased,
            codec_config_id: 1,
            audio_substream_ids: vec![0],
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
        let mut elem_payload = BitWriter::new();
        audio_element.serialize(&mut elem_payload).unwrap();
        write_obu(&mut w, ObuType::AudioElement, &elem_payload.into_bytes());

        write_obu(&mut w, ObuType::TemporalDelimiter, &[]);

        let mut frame_payload = BitWriter::new();
        for sample in [1i16, -1, 2, -2] {
            frame_payload.write_bytes(&sample.to_le_bytes()).unwrap();
            frame_payload.write_bytes(&sample.to_le_bytes()).unwrap();
        }
        write_obu(&mut w, ObuType::AudioFrameId(0), &frame_payload.into_bytes());

        w.into_bytes()
    }

    #[test]
    fn assembles_one_temporal_unit_with_a_decoded_frame() {
        let bytes = stereo_lpcm_stream();
        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let mut processor = ObuProcessor::create(&mut rb, false, &mut insufficient).unwrap().unwrap();
        assert!(!insufficient);

        let mut out = OutputTemporalUnit::default();
        let mut keep_going = true;
        processor.process_temporal_unit(true, &mut out, &mut keep_going).unwrap();

        assert_eq!(out.timestamp, Some((0, 4)));
        assert_eq!(out.decoded_substreams[&0].len(), 4);
    }

    #[test]
    fn a_stray_leading_delimiter_with_no_members_does_not_surface_an_empty_unit() {
        let mut bytes = stereo_lpcm_stream();
        // Insert a second, memberless Temporal Delimiter right before the
        // real one so the first assembly pass sees zero frames/blocks.
        let mut w = BitWriter::new();
        write_obu(&mut w, ObuType::TemporalDelimiter, &[]);
        let extra = w.into_bytes();
        let insert_at = bytes.len() - {
            let mut probe = BitWriter::new();
            write_obu(&mut probe, ObuType::TemporalDelimiter, &[]);
            let td_len = probe.into_bytes().len();
            let mut frame_probe = BitWriter::new();
            for sample in [1i16, -1, 2, -2] {
                frame_probe.write_bytes(&sample.to_le_bytes()).unwrap();
                frame_probe.write_bytes(&sample.to_le_bytes()).unwrap();
            }
            let mut frame_obu = BitWriter::new();
            write_obu(&mut frame_obu, ObuType::AudioFrameId(0), &frame_probe.into_bytes());
            td_len + frame_obu.into_bytes().len()
        };
        bytes.splice(insert_at..insert_at, extra);

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let mut processor = ObuProcessor::create(&mut rb, false, &mut insufficient).unwrap().unwrap();

        let mut out = OutputTemporalUnit::default();
        let mut keep_going = true;
        processor.process_temporal_unit(true, &mut out, &mut keep_going).unwrap();

        // The stray empty delimiter must have been swallowed internally, not
        // handed back as an empty unit.
        assert!(!out.is_empty());
    }
}
