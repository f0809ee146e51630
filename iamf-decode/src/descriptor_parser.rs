// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming descriptor OBU parsing (spec.md §4.10). Reads the IA Sequence
//! Header, Codec Config, Audio Element, and Mix Presentation OBUs that
//! precede the first temporal unit, tolerating a buffer that doesn't yet
//! hold the whole prefix: any short read rewinds the cursor to where this
//! call started and reports `insufficient_data`, so a caller that refills
//! the buffer and retries makes forward progress without double-counting
//! anything already committed.

use std::collections::HashMap;

use iamf_core::bitstream::BitReader;
use iamf_core::error::{invalid_argument, Result};
use iamf_core::Error;
use iamf_obu::audio_element::AudioElement;
use iamf_obu::codec_config::{CodecConfig, MIN_PLAUSIBLE_CODEC_CONFIG_BYTES};
use iamf_obu::element::{derive_audio_element_with_data, AudioElementWithData};
use iamf_obu::header::{ObuHeader, ObuType};
use iamf_obu::mix_presentation::MixPresentation;
use iamf_obu::sequence_header::IaSequenceHeader;

/// Everything collected from one IA Sequence's descriptor prefix.
#[derive(Debug, Default)]
pub struct ParsedDescriptors {
    pub ia_sequence_header: Option<IaSequenceHeader>,
    pub codec_configs: HashMap<u32, CodecConfig>,
    pub audio_elements: HashMap<u32, AudioElement>,
    pub audio_elements_with_data: HashMap<u32, AudioElementWithData>,
    pub mix_presentations: HashMap<u32, MixPresentation>,
}

fn is_descriptor_type(obu_type: ObuType) -> bool {
    matches!(
        obu_type,
        ObuType::IaSequenceHeader
            | ObuType::CodecConfig
            | ObuType::AudioElement
            | ObuType::MixPresentation
            | ObuType::Reserved(_)
    )
}

/// Parses as much of the descriptor prefix as the buffer currently holds.
///
/// Returns `Ok(Some(descriptors))` once a non-descriptor OBU (a Temporal
/// Delimiter or Audio Frame) is reached — `rb` is left positioned right
/// before that OBU's header. Returns `Ok(None)` with `*insufficient_data =
/// true` and `rb` rewound to its starting position if the buffer runs out
/// mid-OBU; the caller should refill and call again.
///
/// `is_exhaustive_and_exact` asserts that `rb` holds the whole descriptor
/// prefix and nothing more will ever be appended. Under that assertion,
/// reaching a temporal-unit OBU before the buffer is exhausted contradicts
/// the assertion itself — the prefix isn't actually exhaustive — so the
/// call fails closed with `InvalidArgument` and rewinds to where it started,
/// rather than treating the prefix as complete. It also means a trailing
/// gap at end-of-buffer (no temporal-unit OBU reached, no bytes left) ends
/// the loop successfully instead of attempting another peek and surfacing
/// `ResourceExhausted`. A descriptor prefix with no IA Sequence Header is
/// never valid, exhaustive-and-exact or not.
pub fn process_descriptor_obus(
    rb: &mut BitReader<'_>,
    is_exhaustive_and_exact: bool,
    insufficient_data: &mut bool,
) -> Result<Option<ParsedDescriptors>> {
    *insufficient_data = false;
    let outer_start = rb.tell();
    let mut descriptors = ParsedDescriptors::default();

    loop {
        let header_start = rb.tell();
        let peeked = rb.peek_obu_type_and_total_size();
        let (obu_type_u5, _redundant, _trimming, _extension, total_size) = match peeked {
            Ok(v) => v,
            Err(Error::ResourceExhausted(_)) => {
                rb.seek(outer_start)?;
                *insufficient_data = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !rb.can_read_bytes(total_size) {
            rb.seek(outer_start)?;
            *insufficient_data = true;
            return Ok(None);
        }

        let obu_type = ObuType::from_u5(obu_type_u5)?;
        if !is_descriptor_type(obu_type) {
            if descriptors.ia_sequence_header.is_none() {
                rb.seek(outer_start)?;
                return invalid_argument("a descriptor prefix must contain an IA Sequence Header");
            }
            if is_exhaustive_and_exact {
                rb.seek(outer_start)?;
                return invalid_argument(
                    "is_exhaustive_and_exact but a temporal-unit OBU was reached before the buffer was exhausted",
                );
            }
            rb.seek(header_start)?;
            break;
        }

        let (header, payload_size) = ObuHeader::parse(rb)?;
        match header.obu_type {
            ObuType::IaSequenceHeader => {
                if descriptors.ia_sequence_header.is_some() && !header.obu_redundant_copy {
                    return invalid_argument("a second non-redundant IA Sequence Header is not allowed");
                }
                let parsed = IaSequenceHeader::parse(rb)?;
                if descriptors.ia_sequence_header.is_none() {
                    descriptors.ia_sequence_header = Some(parsed);
                }
            }
            ObuType::CodecConfig => {
                if payload_size < MIN_PLAUSIBLE_CODEC_CONFIG_BYTES {
                    rb.read_bytes(payload_size)?;
                } else {
                    let cfg = CodecConfig::parse(rb, payload_size)?;
                    descriptors.codec_configs.insert(cfg.codec_config_id, cfg);
                }
            }
            ObuType::AudioElement => {
                let element = AudioElement::parse(rb)?;
                let with_data = derive_audio_element_with_data(&element)?;
                descriptors.audio_elements_with_data.insert(element.audio_element_id, with_data);
                descriptors.audio_elements.insert(element.audio_element_id, element);
            }
            ObuType::MixPresentation => {
                let mix = MixPresentation::parse(rb)?;
                descriptors.mix_presentations.insert(mix.mix_presentation_id, mix);
            }
            ObuType::Reserved(_) => {
                rb.read_bytes(payload_size)?;
            }
            _ => unreachable!("is_descriptor_type filtered out everything else"),
        }

        if is_exhaustive_and_exact && !rb.data_available() {
            break;
        }
    }

    Ok(Some(descriptors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_core::bitstream::BitWriter;

    fn write_sequence_header(w: &mut BitWriter) {
        let header = ObuHeader::new(ObuType::IaSequenceHeader);
        let mut payload = BitWriter::new();
        IaSequenceHeader { primary_profile: 0, additional_profile: 0 }.serialize(&mut payload).unwrap();
        let bytes = payload.into_bytes();
        header.serialize(w, bytes.len()).unwrap();
        w.write_bytes(&bytes).unwrap();
    }

    #[test]
    fn stops_before_the_first_temporal_delimiter() {
        let mut w = BitWriter::new();
        write_sequence_header(&mut w);
        let td_header = ObuHeader::new(ObuType::TemporalDelimiter);
        td_header.serialize(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let descriptors = process_descriptor_obus(&mut rb, false, &mut insufficient).unwrap().unwrap();
        assert!(!insufficient);
        assert!(descriptors.ia_sequence_header.is_some());

        let (header, _) = ObuHeader::parse(&mut rb).unwrap();
        assert_eq!(header.obu_type, ObuType::TemporalDelimiter);
    }

    #[test]
    fn exhaustive_and_exact_rejects_a_trailing_temporal_unit() {
        // The caller asserts `rb` holds the entire prefix and nothing more
        // will ever arrive, so a temporal-unit OBU before the buffer is
        // exhausted contradicts that assertion rather than just ending the
        // prefix.
        let mut w = BitWriter::new();
        write_sequence_header(&mut w);
        let td_header = ObuHeader::new(ObuType::TemporalDelimiter);
        td_header.serialize(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let err = process_descriptor_obus(&mut rb, true, &mut insufficient).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(rb.tell(), 0);
    }

    #[test]
    fn exhaustive_and_exact_succeeds_when_buffer_ends_exactly_at_the_prefix() {
        let mut w = BitWriter::new();
        write_sequence_header(&mut w);
        let bytes = w.into_bytes();

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let descriptors = process_descriptor_obus(&mut rb, true, &mut insufficient).unwrap().unwrap();
        assert!(!insufficient);
        assert!(descriptors.ia_sequence_header.is_some());
        assert!(!rb.data_available());
    }

    #[test]
    fn missing_sequence_header_is_rejected_even_when_lenient() {
        let mut w = BitWriter::new();
        let td_header = ObuHeader::new(ObuType::TemporalDelimiter);
        td_header.serialize(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let err = process_descriptor_obus(&mut rb, false, &mut insufficient).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn short_buffer_rewinds_and_reports_insufficient_data() {
        let mut w = BitWriter::new();
        write_sequence_header(&mut w);
        let full = w.into_bytes();
        let truncated = &full[..full.len() - 1];

        let mut rb = BitReader::new(truncated);
        let mut insufficient = false;
        let result = process_descriptor_obus(&mut rb, false, &mut insufficient).unwrap();
        assert!(result.is_none());
        assert!(insufficient);
        assert_eq!(rb.tell(), 0);
    }

    #[test]
    fn rejects_a_second_non_redundant_sequence_header() {
        let mut w = BitWriter::new();
        write_sequence_header(&mut w);
        write_sequence_header(&mut w);
        let bytes = w.into_bytes();

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        assert!(process_descriptor_obus(&mut rb, true, &mut insufficient).is_err());
    }

    #[test]
    fn implausibly_small_codec_config_is_skipped_not_rejected() {
        let mut w = BitWriter::new();
        write_sequence_header(&mut w);
        let header = ObuHeader::new(ObuType::CodecConfig);
        header.serialize(&mut w, 2).unwrap();
        w.write_bytes(&[0, 0]).unwrap();
        let td_header = ObuHeader::new(ObuType::TemporalDelimiter);
        td_header.serialize(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        let mut rb = BitReader::new(&bytes);
        let mut insufficient = false;
        let descriptors = process_descriptor_obus(&mut rb, false, &mut insufficient).unwrap().unwrap();
        assert!(descriptors.codec_configs.is_empty());
    }
}
