// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Codec Config OBU: which codec a set of substreams uses, the frame
//! size, and the codec-specific decoder config payload.

use iamf_core::bitstream::{BitReader, BitWriter};
use iamf_core::error::{invalid_argument, Result};
use iamf_core::FourCc;

/// Minimum plausible Codec Config payload size; shorter payloads are skipped
/// with a warning by the Descriptor Parser rather than rejected outright.
pub const MIN_PLAUSIBLE_CODEC_CONFIG_BYTES: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LpcmDecoderConfig {
    pub sample_format_flags: u8,
    pub sample_size: u8,
    pub sample_rate: u32,
}

impl LpcmDecoderConfig {
    pub fn is_big_endian(self) -> bool {
        self.sample_format_flags & 1 != 0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpusDecoderConfig {
    pub version: u8,
    pub output_channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AacDecoderConfig {
    pub decoder_config_descriptor: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlacDecoderConfig {
    pub metadata_blocks: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderConfig {
    Lpcm(LpcmDecoderConfig),
    Opus(OpusDecoderConfig),
    AacLc(AacDecoderConfig),
    Flac(FlacDecoderConfig),
}

impl DecoderConfig {
    fn parse(codec_id: FourCc, rb: &mut BitReader<'_>, bytes_remaining: usize) -> Result<Self> {
        Ok(match codec_id {
            FourCc::LPCM => DecoderConfig::Lpcm(LpcmDecoderConfig {
                sample_format_flags: rb.read_u8()?,
                sample_size: rb.read_u8()?,
                sample_rate: rb.read_u32be()?,
            }),
            FourCc::OPUS => DecoderConfig::Opus(OpusDecoderConfig {
                version: rb.read_u8()?,
                output_channel_count: rb.read_u8()?,
                pre_skip: rb.read_u16be()?,
                input_sample_rate: rb.read_u32be()?,
            }),
            FourCc::AAC_LC => DecoderConfig::AacLc(AacDecoderConfig {
                decoder_config_descriptor: rb.read_bytes(bytes_remaining)?.to_vec(),
            }),
            FourCc::FLAC => DecoderConfig::Flac(FlacDecoderConfig {
                metadata_blocks: rb.read_bytes(bytes_remaining)?.to_vec(),
            }),
            _ => return invalid_argument(format!("unsupported codec_id {codec_id}")),
        })
    }

    fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        match self {
            DecoderConfig::Lpcm(cfg) => {
                w.write_u8(cfg.sample_format_flags);
                w.write_u8(cfg.sample_size);
                w.write_u32be(cfg.sample_rate);
            }
            DecoderConfig::Opus(cfg) => {
                w.write_u8(cfg.version);
                w.write_u8(cfg.output_channel_count);
                w.write_u16be(cfg.pre_skip);
                w.write_u32be(cfg.input_sample_rate);
            }
            DecoderConfig::AacLc(cfg) => w.write_bytes(&cfg.decoder_config_descriptor)?,
            DecoderConfig::Flac(cfg) => w.write_bytes(&cfg.metadata_blocks)?,
        }
        Ok(())
    }

    pub fn codec_id(&self) -> FourCc {
        match self {
            DecoderConfig::Lpcm(_) => FourCc::LPCM,
            DecoderConfig::Opus(_) => FourCc::OPUS,
            DecoderConfig::AacLc(_) => FourCc::AAC_LC,
            DecoderConfig::Flac(_) => FourCc::FLAC,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, DecoderConfig::Lpcm(_) | DecoderConfig::Flac(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    pub codec_config_id: u32,
    pub num_samples_per_frame: u32,
    pub audio_roll_distance: i16,
    pub decoder_config: DecoderConfig,
}

impl CodecConfig {
    pub fn codec_id(&self) -> FourCc {
        self.decoder_config.codec_id()
    }

    pub fn is_lossless(&self) -> bool {
        self.decoder_config.is_lossless()
    }

    /// The sample rate samples are produced/consumed at; LPCM reports its own
    /// field, compressed codecs report their decoder config's rate.
    pub fn output_sample_rate(&self) -> u32 {
        match &self.decoder_config {
            DecoderConfig::Lpcm(cfg) => cfg.sample_rate,
            DecoderConfig::Opus(cfg) => cfg.input_sample_rate,
            DecoderConfig::AacLc(_) | DecoderConfig::Flac(_) => 0,
        }
    }

    pub fn bit_depth_to_measure_loudness(&self) -> u8 {
        match &self.decoder_config {
            DecoderConfig::Lpcm(cfg) => cfg.sample_size,
            _ => 16,
        }
    }

    pub fn parse(rb: &mut BitReader<'_>, payload_size: usize) -> Result<Self> {
        let start_bytes = rb.bytes_remaining();
        if payload_size < MIN_PLAUSIBLE_CODEC_CONFIG_BYTES {
            return invalid_argument(format!(
                "codec config payload of {payload_size} bytes is implausibly small"
            ));
        }

        let codec_config_id = rb.read_uleb128()?;
        let codec_id = FourCc::from_u32_be(rb.read_u32be()?);
        let num_samples_per_frame = rb.read_uleb128()?;
        if num_samples_per_frame == 0 {
            return invalid_argument("num_samples_per_frame must be greater than zero");
        }
        let audio_roll_distance = rb.read_in(16)? as i16;

        let consumed_so_far = start_bytes - rb.bytes_remaining();
        let decoder_config_bytes = payload_size
            .checked_sub(consumed_so_far)
            .ok_or(())
            .or_else(|_| invalid_argument("codec config payload shorter than its fixed fields"))?;
        let decoder_config = DecoderConfig::parse(codec_id, rb, decoder_config_bytes)?;

        Ok(CodecConfig {
            codec_config_id,
            num_samples_per_frame,
            audio_roll_distance,
            decoder_config,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        w.write_uleb128(self.codec_config_id)?;
        w.write_u32be(self.decoder_config.codec_id().to_u32_be());
        w.write_uleb128(self.num_samples_per_frame)?;
        w.write_in(i64::from(self.audio_roll_distance), 16)?;
        self.decoder_config.serialize(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpcm_codec_config_round_trips() {
        let cfg = CodecConfig {
            codec_config_id: 1,
            num_samples_per_frame: 1024,
            audio_roll_distance: 0,
            decoder_config: DecoderConfig::Lpcm(LpcmDecoderConfig {
                sample_format_flags: 0,
                sample_size: 16,
                sample_rate: 48_000,
            }),
        };
        let mut w = BitWriter::new();
        cfg.serialize(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let parsed = CodecConfig::parse(&mut r, bytes.len()).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn zero_frame_size_is_rejected() {
        let cfg = CodecConfig {
            codec_config_id: 1,
            num_samples_per_frame: 0,
            audio_roll_distance: 0,
            decoder_config: DecoderConfig::Lpcm(LpcmDecoderConfig {
                sample_format_flags: 0,
                sample_size: 16,
                sample_rate: 48_000,
            }),
        };
        let mut w = BitWriter::new();
        // Bypass the constructor-level check to exercise the parser's own check.
        w.write_uleb128(cfg.codec_config_id).unwrap();
        w.write_u32be(FourCc::LPCM.to_u32_be());
        w.write_uleb128(0).unwrap();
        w.write_in(0, 16).unwrap();
        w.write_u8(0);
        w.write_u8(16);
        w.write_u32be(48_000);
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert!(CodecConfig::parse(&mut r, bytes.len()).is_err());
    }

    #[test]
    fn implausibly_small_payload_is_rejected() {
        let mut r = BitReader::new(&[0u8; 4]);
        assert!(CodecConfig::parse(&mut r, 4).is_err());
    }
}
