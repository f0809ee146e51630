// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The 5-bit `obu_type` enum and the OBU header that precedes every OBU's
//! payload.

use iamf_core::bitstream::{BitReader, BitWriter, MAX_OBU_SIZE};
use iamf_core::error::{invalid_argument, Result};

/// The type tag carried in the top 5 bits of every OBU's first byte.
///
/// `AudioFrameId` folds the 18 "implicit substream id" codepoints (8..=25)
/// into one variant carrying the substream id directly, mirroring how
/// callers actually want to use it; `Reserved` carries the raw value for any
/// other codepoint so readers can skip it rather than reject the stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObuType {
    CodecConfig,
    AudioElement,
    MixPresentation,
    ParameterBlock,
    TemporalDelimiter,
    /// Generic Audio Frame OBU; the substream id is the first field of the
    /// payload rather than implicit in the type.
    AudioFrame,
    /// Audio Frame OBU whose substream id (0..=17) is implicit in the type.
    AudioFrameId(u8),
    Reserved(u8),
    IaSequenceHeader,
}

impl ObuType {
    pub fn from_u5(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ObuType::CodecConfig,
            1 => ObuType::AudioElement,
            2 => ObuType::MixPresentation,
            3 => ObuType::ParameterBlock,
            4 => ObuType::TemporalDelimiter,
            6 => ObuType::AudioFrame,
            8..=25 => ObuType::AudioFrameId(value - 8),
            31 => ObuType::IaSequenceHeader,
            5 | 7 | 26..=30 => ObuType::Reserved(value),
            _ => return invalid_argument(format!("obu_type {value} does not fit in 5 bits")),
        })
    }

    pub fn to_u5(self) -> u8 {
        match self {
            ObuType::CodecConfig => 0,
            ObuType::AudioElement => 1,
            ObuType::MixPresentation => 2,
            ObuType::ParameterBlock => 3,
            ObuType::TemporalDelimiter => 4,
            ObuType::AudioFrame => 6,
            ObuType::AudioFrameId(id) => 8 + id,
            ObuType::Reserved(value) => value,
            ObuType::IaSequenceHeader => 31,
        }
    }

    /// A Parameter Block, any Audio Frame, or a Temporal Delimiter — the set
    /// of types that can appear inside a temporal unit.
    pub fn is_temporal_unit(self) -> bool {
        matches!(
            self,
            ObuType::ParameterBlock | ObuType::AudioFrame | ObuType::AudioFrameId(_) | ObuType::TemporalDelimiter
        )
    }

    pub fn is_reserved(self) -> bool {
        matches!(self, ObuType::Reserved(_))
    }
}

/// The fixed-shape prefix that precedes every OBU's payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    pub obu_redundant_copy: bool,
    pub num_samples_to_trim_at_end: u32,
    pub num_samples_to_trim_at_start: u32,
    pub extension_header: Option<Vec<u8>>,
}

impl ObuHeader {
    pub fn new(obu_type: ObuType) -> Self {
        ObuHeader {
            obu_type,
            obu_redundant_copy: false,
            num_samples_to_trim_at_end: 0,
            num_samples_to_trim_at_start: 0,
            extension_header: None,
        }
    }

    fn trimming_status_flag(&self) -> bool {
        self.num_samples_to_trim_at_end != 0 || self.num_samples_to_trim_at_start != 0
    }

    /// Parses the header and returns it alongside `payload_size` (the
    /// `obu_size` field: payload bytes only, not counting the header itself).
    pub fn parse(rb: &mut BitReader<'_>) -> Result<(ObuHeader, usize)> {
        let flags = rb.read_u8()?;
        let obu_type = ObuType::from_u5(flags >> 3)?;
        let redundant = (flags >> 2) & 1 != 0;
        let trimming = (flags >> 1) & 1 != 0;
        let extension = flags & 1 != 0;

        if trimming && !matches!(obu_type, ObuType::AudioFrame | ObuType::AudioFrameId(_)) {
            return invalid_argument("trimming_status_flag is only valid on Audio Frame OBUs");
        }

        let (mut trim_end, mut trim_start) = (0u32, 0u32);
        if trimming {
            trim_end = rb.read_uleb128()?;
            trim_start = rb.read_uleb128()?;
        }

        let extension_header = if extension {
            let size = rb.read_uleb128()? as usize;
            Some(rb.read_bytes(size)?.to_vec())
        } else {
            None
        };

        let obu_size = rb.read_uleb128()? as usize;

        Ok((
            ObuHeader {
                obu_type,
                obu_redundant_copy: redundant,
                num_samples_to_trim_at_end: trim_end,
                num_samples_to_trim_at_start: trim_start,
                extension_header,
            },
            obu_size,
        ))
    }

    /// Writes the header and `obu_size` (payload byte count). Does not write
    /// the payload itself.
    pub fn serialize(&self, w: &mut BitWriter, payload_size: usize) -> Result<()> {
        let trimming = self.trimming_status_flag();
        if trimming && !matches!(self.obu_type, ObuType::AudioFrame | ObuType::AudioFrameId(_)) {
            return invalid_argument("trimming_status_flag is only valid on Audio Frame OBUs");
        }

        let flags = (self.obu_type.to_u5() << 3)
            | (u8::from(self.obu_redundant_copy) << 2)
            | (u8::from(trimming) << 1)
            | u8::from(self.extension_header.is_some());
        w.write_u8(flags);

        if trimming {
            w.write_uleb128(self.num_samples_to_trim_at_end)?;
            w.write_uleb128(self.num_samples_to_trim_at_start)?;
        }

        if let Some(ext) = &self.extension_header {
            w.write_uleb128(ext.len() as u32)?;
            w.write_bytes(ext)?;
        }

        let total_size = header_size_without_obu_size(self) + leb128_len(payload_size as u32) + payload_size;
        if total_size > MAX_OBU_SIZE {
            return invalid_argument(format!("OBU size {total_size} exceeds the 2 MiB limit"));
        }

        w.write_uleb128(payload_size as u32)
    }
}

fn header_size_without_obu_size(header: &ObuHeader) -> usize {
    let mut n = 1;
    if header.trimming_status_flag() {
        n += leb128_len(header.num_samples_to_trim_at_end);
        n += leb128_len(header.num_samples_to_trim_at_start);
    }
    if let Some(ext) = &header.extension_header {
        n += leb128_len(ext.len() as u32) + ext.len();
    }
    n
}

fn leb128_len(value: u32) -> usize {
    let mut v = value;
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obu_type_round_trips() {
        for value in 0u8..32 {
            let ty = ObuType::from_u5(value).unwrap();
            assert_eq!(ty.to_u5(), value);
        }
    }

    #[test]
    fn audio_frame_id_range_maps_substream_id() {
        assert_eq!(ObuType::from_u5(8).unwrap(), ObuType::AudioFrameId(0));
        assert_eq!(ObuType::from_u5(25).unwrap(), ObuType::AudioFrameId(17));
    }

    #[test]
    fn header_round_trips_without_trimming() {
        let header = ObuHeader::new(ObuType::TemporalDelimiter);
        let mut w = BitWriter::new();
        header.serialize(&mut w, 0).unwrap();
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        let (parsed, size) = ObuHeader::parse(&mut r).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(size, 0);
    }

    #[test]
    fn header_round_trips_with_trimming() {
        let mut header = ObuHeader::new(ObuType::AudioFrameId(3));
        header.num_samples_to_trim_at_end = 12;
        header.num_samples_to_trim_at_start = 0;

        let mut w = BitWriter::new();
        header.serialize(&mut w, 42).unwrap();
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        let (parsed, size) = ObuHeader::parse(&mut r).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(size, 42);
    }

    #[test]
    fn trimming_flag_rejected_on_non_audio_frame_types() {
        let mut header = ObuHeader::new(ObuType::ParameterBlock);
        header.num_samples_to_trim_at_end = 1;
        let mut w = BitWriter::new();
        assert!(header.serialize(&mut w, 0).is_err());
    }

    #[test]
    fn peek_obu_type_and_total_size_matches_header() {
        let header = ObuHeader::new(ObuType::CodecConfig);
        let mut w = BitWriter::new();
        header.serialize(&mut w, 5).unwrap();
        w.write_bytes(&[0; 5]).unwrap();
        let bytes = w.into_bytes();

        let r = BitReader::new(&bytes);
        let (obu_type, redundant, trimming, extension, total) =
            r.peek_obu_type_and_total_size().unwrap();
        assert_eq!(obu_type, ObuType::CodecConfig.to_u5());
        assert!(!redundant);
        assert!(!trimming);
        assert!(!extension);
        assert_eq!(total, bytes.len());
    }
}
