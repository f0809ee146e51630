// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembles the descriptor prefix and temporal units into a complete IAMF
//! bitstream, once `iamf-encode` has produced every OBU payload. This CLI
//! never emits Parameter Block OBUs (every Parameter Definition it builds
//! carries only a constant default), so a temporal unit here is just a
//! Temporal Delimiter followed by each substream's Audio Frame.

use std::collections::BTreeMap;

use iamf_core::bitstream::BitWriter;
use iamf_core::error::Result;
use iamf_core::units::Tick;
use iamf_obu::audio_element::AudioElement;
use iamf_obu::codec_config::CodecConfig;
use iamf_obu::header::{ObuHeader, ObuType};
use iamf_obu::mix_presentation::MixPresentation;
use iamf_obu::sequence_header::IaSequenceHeader;

use iamf_codecs::EncodedAudioFrame;

fn write_obu(w: &mut BitWriter, obu_type: ObuType, payload: &[u8]) -> Result<()> {
    ObuHeader::new(obu_type).serialize(w, payload.len())?;
    w.write_bytes(payload)
}

fn write_payload(w: &mut BitWriter, obu_type: ObuType, build: impl FnOnce(&mut BitWriter) -> Result<()>) -> Result<()> {
    let mut payload_writer = BitWriter::new();
    build(&mut payload_writer)?;
    write_obu(w, obu_type, &payload_writer.into_bytes())
}

/// Writes the IA Sequence Header, every Codec Config, every Audio Element,
/// and every Mix Presentation, in that order.
pub fn write_descriptors(
    w: &mut BitWriter,
    sequence_header: &IaSequenceHeader,
    codec_configs: &[CodecConfig],
    audio_elements: &[AudioElement],
    mix_presentations: &[MixPresentation],
) -> Result<()> {
    write_payload(w, ObuType::IaSequenceHeader, |pw| sequence_header.serialize(pw))?;
    for codec_config in codec_configs {
        write_payload(w, ObuType::CodecConfig, |pw| codec_config.serialize(pw))?;
    }
    for audio_element in audio_elements {
        write_payload(w, ObuType::AudioElement, |pw| audio_element.serialize(pw))?;
    }
    for mix_presentation in mix_presentations {
        write_payload(w, ObuType::MixPresentation, |pw| mix_presentation.serialize(pw))?;
    }
    Ok(())
}

fn write_audio_frame(w: &mut BitWriter, frame: &EncodedAudioFrame) -> Result<()> {
    let obu_type = if frame.meta.substream_id <= 17 {
        ObuType::AudioFrameId(frame.meta.substream_id as u8)
    } else {
        ObuType::AudioFrame
    };
    let mut header = ObuHeader::new(obu_type);
    header.num_samples_to_trim_at_start = frame.meta.trim_at_start;
    header.num_samples_to_trim_at_end = frame.meta.trim_at_end;

    let mut payload_writer = BitWriter::new();
    if matches!(obu_type, ObuType::AudioFrame) {
        payload_writer.write_uleb128(frame.meta.substream_id)?;
    }
    payload_writer.write_bytes(&frame.payload)?;
    let payload = payload_writer.into_bytes();

    header.serialize(w, payload.len())?;
    w.write_bytes(&payload)
}

/// Groups every encoded frame by its start tick and writes one Temporal
/// Delimiter plus its member Audio Frame OBUs per group, in ascending
/// timestamp order.
pub fn write_temporal_units(w: &mut BitWriter, frames: Vec<EncodedAudioFrame>) -> Result<()> {
    let mut by_start: BTreeMap<Tick, Vec<EncodedAudioFrame>> = BTreeMap::new();
    for frame in frames {
        by_start.entry(frame.meta.start).or_default().push(frame);
    }

    for (_, unit_frames) in by_start {
        write_obu(w, ObuType::TemporalDelimiter, &[])?;
        for frame in &unit_frames {
            write_audio_frame(w, frame)?;
        }
    }
    Ok(())
}
