// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Audio Frame Generator: takes per-channel sample streams from the
//! caller, runs them through the down-mix chain, and hands fixed-size
//! frames to each substream's codec adapter.
//!
//! State machine: `TakingSamples -> FinalizedCalled -> FlushingRemaining`.
//! `add_samples` is a no-op once `finalize` has been called; `finalize`
//! pads and drains whatever is left staged, then the generator stays in
//! `FlushingRemaining` until every substream's encoder reports `finished()`.
//!
//! All mutable state lives behind one mutex, matching the one-producer/
//! one-consumer-thread contract: `add_samples` is called from the sample
//! producer, `output_frames` from the bitstream writer, and nothing here
//! assumes either runs on a particular thread.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use iamf_codecs::{EncodedAudioFrame, Encoder, PartialAudioFrameMeta, SampleGrid};
use iamf_core::error::{failed_precondition, invalid_argument, unimplemented, Result};
use iamf_core::units::Tick;
use iamf_core::Error;
use iamf_demux::demix::run_down_mix_chain;
use iamf_demux::{GlobalTimingModule, LabelSamples, ParametersManager};
use iamf_obu::channel_label::ChannelLabel;
use iamf_obu::element::AudioElementWithData;

#[derive(Clone, Copy, Debug, Default)]
pub struct TrimSpec {
    pub samples_to_trim_at_start: u32,
    pub samples_to_trim_at_end: u32,
    pub samples_to_trim_at_start_includes_codec_delay: bool,
    pub samples_to_trim_at_end_includes_padding: bool,
}

impl TrimSpec {
    fn matches(&self, other: &TrimSpec) -> bool {
        self.samples_to_trim_at_start == other.samples_to_trim_at_start
            && self.samples_to_trim_at_end == other.samples_to_trim_at_end
            && self.samples_to_trim_at_start_includes_codec_delay
                == other.samples_to_trim_at_start_includes_codec_delay
            && self.samples_to_trim_at_end_includes_padding == other.samples_to_trim_at_end_includes_padding
    }
}

/// Everything `AudioFrameGenerator::initialize` needs for one audio element:
/// a ready-derived label map, a codec adapter per substream, and the
/// caller's trimming intent.
pub struct ElementInit {
    pub audio_element_id: u32,
    pub with_data: AudioElementWithData,
    pub num_samples_per_frame: u32,
    pub input_bit_depth: u8,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub declared_labels: Vec<ChannelLabel>,
    pub encoders: HashMap<u32, Box<dyn Encoder>>,
    pub trim: TrimSpec,
    pub validate_codec_delay: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum GeneratorState {
    TakingSamples,
    FinalizedCalled,
    FlushingRemaining,
}

struct SubstreamPipeline {
    encoder: Box<dyn Encoder>,
    channel_count: usize,
    samples_obu: VecDeque<Vec<i32>>,
    trim_at_start_remaining: u32,
    trim_at_end_remaining: u32,
}

struct ElementPipeline {
    with_data: AudioElementWithData,
    num_samples_per_frame: u32,
    input_bit_depth: u8,
    declared_labels: Vec<ChannelLabel>,
    staging: HashMap<ChannelLabel, VecDeque<f64>>,
    substreams: HashMap<u32, SubstreamPipeline>,
    param_cursor: Tick,
}

impl ElementPipeline {
    /// The common staged length across every declared label, or `None` if
    /// they currently disagree (a caller hasn't finished one label's push).
    fn staged_len(&self) -> Option<usize> {
        let mut len = None;
        for label in &self.declared_labels {
            let this = self.staging.get(label).map(VecDeque::len).unwrap_or(0);
            match len {
                None => len = Some(this),
                Some(l) if l != this => return None,
                _ => {}
            }
        }
        len
    }
}

fn normalize(sample: i32, bit_depth: u8) -> f64 {
    let full_scale = (1i64 << (bit_depth - 1)) as f64;
    f64::from(sample) / full_scale
}

fn denormalize(sample: f64, bit_depth: u8) -> i32 {
    let full_scale = (1i64 << (bit_depth - 1)) as f64;
    (sample * full_scale).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

struct Inner {
    state: GeneratorState,
    elements: HashMap<u32, ElementPipeline>,
    timing: GlobalTimingModule,
    parameters: ParametersManager,
    submission_trim: Option<TrimSpec>,
}

/// The Audio Frame Generator (spec.md §4.8, §4.14).
pub struct AudioFrameGenerator {
    inner: Mutex<Inner>,
}

impl AudioFrameGenerator {
    pub fn new(timing: GlobalTimingModule, parameters: ParametersManager) -> Self {
        AudioFrameGenerator {
            inner: Mutex::new(Inner {
                state: GeneratorState::TakingSamples,
                elements: HashMap::new(),
                timing,
                parameters,
                submission_trim: None,
            }),
        }
    }

    /// Validates and wires up one submission's audio elements. Every
    /// element in a single `initialize` call must agree on trimming intent.
    pub fn initialize(&self, elements: Vec<ElementInit>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != GeneratorState::TakingSamples {
            return failed_precondition("initialize() called after finalize()");
        }

        for init in elements {
            if init.input_sample_rate != init.output_sample_rate {
                return unimplemented("resampling between input and output sample rate is not supported");
            }
            if let Some(prev) = &inner.submission_trim {
                if !prev.matches(&init.trim) {
                    return invalid_argument("audio elements in one submission disagree on trimming intent");
                }
            } else {
                inner.submission_trim = Some(init.trim);
            }
            if init.trim.samples_to_trim_at_end > init.num_samples_per_frame {
                return invalid_argument("samples_to_trim_at_end exceeds num_samples_per_frame");
            }

            let mut substreams = HashMap::with_capacity(init.encoders.len());
            let mut codec_delay = None;
            for (substream_id, mut encoder) in init.encoders {
                let delay = encoder.initialize(init.validate_codec_delay)?;
                match codec_delay {
                    None => codec_delay = Some(delay),
                    Some(existing) if existing != delay => {
                        return invalid_argument("substreams of one audio element report different codec delays");
                    }
                    _ => {}
                }
                let channel_count = init
                    .with_data
                    .substream_labels
                    .get(&substream_id)
                    .map(|labels| labels.len())
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!("no channel labels derived for substream {substream_id}"))
                    })?;
                substreams.insert(
                    substream_id,
                    SubstreamPipeline {
                        encoder,
                        channel_count,
                        samples_obu: VecDeque::new(),
                        trim_at_start_remaining: 0,
                        trim_at_end_remaining: 0,
                    },
                );
            }
            let codec_delay = codec_delay.unwrap_or(0);

            let effective_trim_at_start = if init.trim.samples_to_trim_at_start_includes_codec_delay {
                init.trim.samples_to_trim_at_start
            } else {
                init.trim.samples_to_trim_at_start + codec_delay
            };

            for sub in substreams.values_mut() {
                for _ in 0..codec_delay {
                    sub.samples_obu.push_back(vec![0i32; sub.channel_count]);
                }
                sub.trim_at_start_remaining = effective_trim_at_start;
                sub.trim_at_end_remaining = init.trim.samples_to_trim_at_end;
            }

            let staging = init.declared_labels.iter().cloned().map(|label| (label, VecDeque::new())).collect();

            inner.elements.insert(
                init.audio_element_id,
                ElementPipeline {
                    with_data: init.with_data,
                    num_samples_per_frame: init.num_samples_per_frame,
                    input_bit_depth: init.input_bit_depth,
                    declared_labels: init.declared_labels,
                    staging,
                    substreams,
                    param_cursor: 0,
                },
            );
        }
        Ok(())
    }

    pub fn taking_samples(&self) -> bool {
        self.inner.lock().unwrap().state == GeneratorState::TakingSamples
    }

    pub fn add_samples(&self, audio_element_id: u32, label: ChannelLabel, samples: Vec<i32>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != GeneratorState::TakingSamples {
            return Ok(());
        }
        let Inner { elements, timing, parameters, .. } = &mut *inner;
        let element = elements.get_mut(&audio_element_id).ok_or(Error::NotFound("no such audio element"))?;
        if !element.declared_labels.contains(&label) {
            return invalid_argument(format!("label {label:?} was not declared for this audio element"));
        }
        let bit_depth = element.input_bit_depth;
        element
            .staging
            .entry(label)
            .or_default()
            .extend(samples.into_iter().map(|s| normalize(s, bit_depth)));
        drain_full_frames(element, audio_element_id, timing, parameters)
    }

    pub fn finalize(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != GeneratorState::TakingSamples {
            return Ok(());
        }
        inner.state = GeneratorState::FinalizedCalled;
        let Inner { elements, timing, parameters, .. } = &mut *inner;
        for (&audio_element_id, element) in elements.iter_mut() {
            flush_remainder(element, audio_element_id, timing, parameters)?;
            for sub in element.substreams.values_mut() {
                sub.encoder.finalize()?;
            }
        }
        inner.state = GeneratorState::FlushingRemaining;
        Ok(())
    }

    pub fn generating_frames(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        if inner.state == GeneratorState::TakingSamples {
            return true;
        }
        inner.elements.values().any(|e| e.substreams.values().any(|s| !s.encoder.finished()))
    }

    pub fn output_frames(&self, out: &mut Vec<EncodedAudioFrame>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for element in inner.elements.values_mut() {
            for sub in element.substreams.values_mut() {
                if sub.encoder.frames_available() {
                    sub.encoder.pop(out)?;
                }
            }
        }
        Ok(())
    }
}

/// Runs the encoding pass once per full `num_samples_per_frame`-sized chunk
/// of newly staged samples, looping while enough is available.
fn drain_full_frames(
    element: &mut ElementPipeline,
    audio_element_id: u32,
    timing: &mut GlobalTimingModule,
    parameters: &mut ParametersManager,
) -> Result<()> {
    let frame_size = element.num_samples_per_frame as usize;
    while element.staged_len().map(|l| l >= frame_size && l > 0).unwrap_or(false) {
        let chunk = take_chunk(element, frame_size);
        push_down_mixed_chunk(element, audio_element_id, chunk, parameters)?;
        drain_substream_frames(element, audio_element_id, timing, false)?;
    }
    Ok(())
}

/// On `finalize`, pads each substream's remainder up to a full frame (the
/// codecs in this pipeline all need full frames except at the very end, and
/// even then padding keeps the accounting in `drain_substream_frames` simple)
/// and drains everything left.
fn flush_remainder(
    element: &mut ElementPipeline,
    audio_element_id: u32,
    timing: &mut GlobalTimingModule,
    parameters: &mut ParametersManager,
) -> Result<()> {
    let frame_size = element.num_samples_per_frame as usize;
    if let Some(len) = element.staged_len() {
        if len > 0 {
            let mut chunk = take_chunk(element, len);
            if len % frame_size != 0 {
                let padded_len = (len / frame_size + 1) * frame_size;
                for label in &element.declared_labels {
                    chunk.get_mut(label).unwrap().resize(padded_len, 0.0);
                }
            }
            push_down_mixed_chunk(element, audio_element_id, chunk, parameters)?;
        }
    }
    drain_substream_frames(element, audio_element_id, timing, true)
}

fn take_chunk(element: &mut ElementPipeline, n: usize) -> HashMap<ChannelLabel, Vec<f64>> {
    let mut chunk = HashMap::with_capacity(element.declared_labels.len());
    for label in &element.declared_labels {
        let queue = element.staging.entry(label.clone()).or_default();
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(queue.pop_front().unwrap_or(0.0));
        }
        chunk.insert(label.clone(), values);
    }
    chunk
}

fn push_down_mixed_chunk(
    element: &mut ElementPipeline,
    audio_element_id: u32,
    raw_chunk: HashMap<ChannelLabel, Vec<f64>>,
    parameters: &mut ParametersManager,
) -> Result<()> {
    let chunk_len = raw_chunk.values().next().map(Vec::len).unwrap_or(0);
    if chunk_len == 0 {
        return Ok(());
    }

    let mut normalized: LabelSamples = raw_chunk;

    if parameters.demixing_param_definition_available(audio_element_id) {
        let params = parameters.get_down_mixing_parameters(audio_element_id)?;
        run_down_mix_chain(&params, &mut normalized)?;
        parameters.update_demixing_state(audio_element_id, element.param_cursor, chunk_len as Tick)?;
    }
    match parameters.update_recon_gain_state(audio_element_id, element.param_cursor, chunk_len as Tick) {
        Ok(()) | Err(Error::InvalidArgument(_)) => {}
        Err(e) => return Err(e),
    }
    element.param_cursor += chunk_len as Tick;

    for (&substream_id, labels) in &element.with_data.substream_labels {
        let Some(sub) = element.substreams.get_mut(&substream_id) else { continue };
        let mut ticks = vec![Vec::with_capacity(labels.len()); chunk_len];
        for label in labels {
            let base = label.base();
            let samples = normalized
                .get(base)
                .ok_or_else(|| Error::InvalidArgument(format!("no down-mixed samples available for {base:?}")))?;
            for (tick_idx, sample) in samples.iter().enumerate().take(chunk_len) {
                ticks[tick_idx].push(denormalize(*sample, element.input_bit_depth));
            }
        }
        for tick in ticks {
            sub.samples_obu.push_back(tick);
        }
    }
    Ok(())
}

/// Pops frame-sized (or, on the final flush, possibly shorter) chunks off
/// every substream's FIFO and hands them to their codec adapters.
fn drain_substream_frames(
    element: &mut ElementPipeline,
    _audio_element_id: u32,
    timing: &mut GlobalTimingModule,
    is_final_flush: bool,
) -> Result<()> {
    let frame_size = element.num_samples_per_frame as usize;
    loop {
        let min_len = element.substreams.values().map(|s| s.samples_obu.len()).min().unwrap_or(0);
        if min_len == 0 {
            break;
        }
        let n = if min_len >= frame_size {
            frame_size
        } else if is_final_flush {
            min_len
        } else {
            break;
        };

        let mut shared_start: Option<Tick> = None;
        let substream_ids: Vec<u32> = element.substreams.keys().copied().collect();
        for substream_id in substream_ids {
            let sub = element.substreams.get_mut(&substream_id).unwrap();
            let samples: SampleGrid = (0..n).map(|_| sub.samples_obu.pop_front().unwrap()).collect();
            let trim_at_start = n.min(sub.trim_at_start_remaining as usize) as u32;
            sub.trim_at_start_remaining -= trim_at_start;
            let trim_at_end = if is_final_flush && sub.samples_obu.is_empty() {
                n.min(sub.trim_at_end_remaining as usize) as u32
            } else {
                0
            };
            sub.trim_at_end_remaining = sub.trim_at_end_remaining.saturating_sub(trim_at_end);

            let (res, (start, end)) = timing.next_audio_frame_timestamps(substream_id, n as Tick);
            res?;
            match shared_start {
                None => shared_start = Some(start),
                Some(s) if s != start => {
                    return Err(Error::Unknown("substreams of one audio element disagree on frame start timestamp"));
                }
                _ => {}
            }

            let meta = PartialAudioFrameMeta { substream_id, start, end, trim_at_start, trim_at_end };
            sub.encoder.encode_audio_frame(element.input_bit_depth, &samples, meta)?;
        }

        if n < frame_size {
            // A short final frame already drained every substream's FIFO to empty.
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_denormalize_round_trip_at_16_bit() {
        for sample in [-32768i32, -1, 0, 1, 32767] {
            let back = denormalize(normalize(sample, 16), 16);
            assert!((back - sample).abs() <= 1);
        }
    }

    #[test]
    fn trim_spec_matches_compares_all_fields() {
        let a = TrimSpec { samples_to_trim_at_start: 10, ..Default::default() };
        let b = TrimSpec { samples_to_trim_at_start: 11, ..Default::default() };
        assert!(a.matches(&a));
        assert!(!a.matches(&b));
    }
}
