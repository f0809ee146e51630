// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod assemble;
mod config;
mod renderer;
mod wav;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{error, info};

use iamf_core::bitstream::{BitReader, BitWriter};
use iamf_core::error::Result;
use iamf_core::Error;
use iamf_obu::sequence_header::IaSequenceHeader;

use iamf_codecs::EncodedAudioFrame;
use iamf_decode::finalizer::{AudioElementRenderer, LoudnessFactory, RenderingMixPresentationFinalizer};
use iamf_decode::loudness::{EbuR128LoudnessCalculator, LoudnessCalculator};
use iamf_decode::processor::{ObuProcessor, OutputTemporalUnit};
use iamf_encode::encoder::{AudioElementSpec, IamfEncoder};
use iamf_encode::frame_generator::TrimSpec;

use config::ProgramDescription;

#[derive(Parser)]
#[command(name = "iamf-cli", about = "Encode and decode IAMF bitstreams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encodes every audio element in a program description's source WAV
    /// files into one IAMF bitstream file.
    Encode {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = false)]
        validate_codec_delay: bool,
    },
    /// Decodes and renders every layout of one Mix Presentation in an IAMF
    /// bitstream file to WAV files in `output_dir`.
    Decode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        mix_presentation_id: u32,
        #[arg(long)]
        output_dir: PathBuf,
        #[arg(long, default_value_t = 24)]
        bit_depth: u8,
        #[arg(long, default_value_t = false)]
        validate_loudness: bool,
    },
}

fn source_labels_for(layout: &str) -> Result<Vec<iamf_obu::channel_label::ChannelLabel>> {
    let loudspeaker_layout = match layout {
        "mono" => iamf_obu::audio_element::LoudspeakerLayout::Mono,
        "stereo" => iamf_obu::audio_element::LoudspeakerLayout::Stereo,
        other => return Err(Error::InvalidArgument(format!("unsupported source layout {other:?}"))),
    };
    Ok(iamf_obu::channel_label::base_channel_group_labels(loudspeaker_layout))
}

fn run_encode(config_path: &Path, output_path: &Path, validate_codec_delay: bool) -> Result<()> {
    let config_text = std::fs::read_to_string(config_path)
        .map_err(|e| Error::InvalidArgument(format!("failed to read {}: {e}", config_path.display())))?;
    let program: ProgramDescription = serde_json::from_str(&config_text)
        .map_err(|e| Error::InvalidArgument(format!("failed to parse {}: {e}", config_path.display())))?;

    let mut codec_configs = Vec::with_capacity(program.audio_elements.len());
    let mut audio_elements = Vec::with_capacity(program.audio_elements.len());
    let mut specs = Vec::with_capacity(program.audio_elements.len());
    let mut per_element_samples = Vec::with_capacity(program.audio_elements.len());
    let mut overall_sample_rate = None;

    for (substream_id, element_spec) in program.audio_elements.iter().enumerate() {
        let (audio_element, codec_config) = config::build_audio_element(element_spec, substream_id as u32)?;
        let source = wav::read_wav(Path::new(&element_spec.input_wav_path))?;
        let expected_channels = config::source_channel_count(&element_spec.layout)?;
        if source.channels.len() != expected_channels {
            return Err(Error::InvalidArgument(format!(
                "{} declares {} channels, expected {} for layout {:?}",
                element_spec.input_wav_path,
                source.channels.len(),
                expected_channels,
                element_spec.layout
            )));
        }
        overall_sample_rate.get_or_insert(source.sample_rate);

        specs.push(AudioElementSpec {
            audio_element: audio_element.clone(),
            codec_config: codec_config.clone(),
            input_bit_depth: source.bit_depth,
            input_sample_rate: source.sample_rate,
            bit_rate: element_spec.bit_rate,
            trim: TrimSpec::default(),
        });
        per_element_samples.push(source.channels);
        codec_configs.push(codec_config);
        audio_elements.push(audio_element);
    }

    let mut encoder = IamfEncoder::new_audio_frame_generator(specs, validate_codec_delay);
    encoder.initialize()?;

    for (element_spec, channels) in program.audio_elements.iter().zip(per_element_samples.into_iter()) {
        let labels = source_labels_for(&element_spec.layout)?;
        for (label, samples) in labels.into_iter().zip(channels.into_iter()) {
            encoder.add_samples(element_spec.audio_element_id, label, samples)?;
        }
    }
    encoder.finalize()?;

    let mut frames: Vec<EncodedAudioFrame> = Vec::new();
    while encoder.generating_frames() {
        let before = frames.len();
        encoder.output_frames(&mut frames)?;
        if frames.len() == before {
            break;
        }
    }

    let sample_rate = overall_sample_rate.unwrap_or(48_000);
    let mut mix_presentations = Vec::with_capacity(program.mix_presentations.len());
    for mix_spec in &program.mix_presentations {
        mix_presentations.push(config::build_mix_presentation(mix_spec, sample_rate)?);
    }

    let sequence_header = IaSequenceHeader { primary_profile: program.primary_profile, additional_profile: program.additional_profile };

    let mut w = BitWriter::new();
    assemble::write_descriptors(&mut w, &sequence_header, &codec_configs, &audio_elements, &mix_presentations)?;
    assemble::write_temporal_units(&mut w, frames)?;

    std::fs::write(output_path, w.into_bytes())
        .map_err(|e| Error::InvalidArgument(format!("failed to write {}: {e}", output_path.display())))?;
    info!("wrote {}", output_path.display());
    Ok(())
}

fn run_decode(input_path: &Path, mix_presentation_id: u32, output_dir: &Path, bit_depth: u8, validate_loudness: bool) -> Result<()> {
    let bytes = std::fs::read(input_path).map_err(|e| Error::InvalidArgument(format!("failed to read {}: {e}", input_path.display())))?;
    let mut rb = BitReader::new(&bytes);
    let mut insufficient_data = false;
    // The whole file is already in memory, but `is_exhaustive_and_exact` is
    // about the descriptor *prefix* specifically: this buffer also holds
    // every temporal unit that follows it, so reaching the first one is the
    // expected, successful end of the prefix, not a contradiction.
    let mut processor = ObuProcessor::create(&mut rb, false, &mut insufficient_data)?
        .ok_or_else(|| Error::InvalidArgument(format!("{} has no complete descriptor prefix", input_path.display())))?;

    let sample_rate = processor
        .descriptors()
        .codec_configs
        .values()
        .map(|cfg| cfg.output_sample_rate())
        .find(|&rate| rate != 0)
        .unwrap_or(48_000);

    let loudness_factory: Box<LoudnessFactory> = Box::new(move |channel_count, sample_rate| {
        Ok(Box::new(EbuR128LoudnessCalculator::new(channel_count, sample_rate, bit_depth, true)?) as Box<dyn LoudnessCalculator>)
    });

    let mut finalizer = RenderingMixPresentationFinalizer::create(
        processor.descriptors(),
        mix_presentation_id,
        sample_rate,
        bit_depth,
        Box::new(|with_data, layout| renderer::MatchingLabelRenderer::new(with_data, layout).map(|r| Box::new(r) as Box<dyn AudioElementRenderer>)),
        Some(loudness_factory),
        None,
    )?;

    let mut pcm_by_target: BTreeMap<(usize, usize), Vec<Vec<i32>>> = BTreeMap::new();
    loop {
        let mut out = OutputTemporalUnit::default();
        let mut continue_processing = true;
        processor.process_temporal_unit(true, &mut out, &mut continue_processing)?;
        if !out.decoded_substreams.is_empty() || !out.parameter_blocks.is_empty() {
            for rendered in finalizer.render_temporal_unit(&out)? {
                pcm_by_target.entry((rendered.sub_mix_index, rendered.layout_index)).or_default().extend(rendered.pcm);
            }
        }
        if !continue_processing {
            break;
        }
    }

    std::fs::create_dir_all(output_dir).map_err(|e| Error::InvalidArgument(format!("failed to create {}: {e}", output_dir.display())))?;
    for ((sub_mix_index, layout_index), pcm) in &pcm_by_target {
        let path = output_dir.join(format!("mix{mix_presentation_id}_submix{sub_mix_index}_layout{layout_index}.wav"));
        wav::write_wav(&path, pcm, sample_rate, bit_depth)?;
        info!("wrote {}", path.display());
    }

    match finalizer.finalize(validate_loudness) {
        Ok(measured) => {
            for m in measured {
                info!(
                    "sub mix {} layout {}: integrated loudness {:.2} LKFS, digital peak {:.2} dBFS",
                    m.sub_mix_index,
                    m.layout_index,
                    iamf_core::units::q7_8::to_f64(m.integrated_loudness),
                    iamf_core::units::q7_8::to_f64(m.digital_peak)
                );
            }
        }
        Err(e) => error!("loudness validation: {e}"),
    }

    Ok(())
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Encode { config, output, validate_codec_delay } => run_encode(&config, &output, validate_codec_delay),
        Command::Decode { input, mix_presentation_id, output_dir, bit_depth, validate_loudness } => {
            run_decode(&input, mix_presentation_id, &output_dir, bit_depth, validate_loudness)
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
