// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC decode via `claxon`, encode via `flacenc`.
//!
//! An IAMF Audio Frame OBU carries only a single FLAC frame, not a whole
//! FLAC stream; the `fLaC` marker and metadata blocks (including
//! STREAMINFO) live once in the Codec Config OBU instead. Both directions
//! here stitch a minimal one-frame stream together around that shared
//! metadata so the general-purpose stream decoder/encoder can be reused
//! unmodified.

use std::io::Cursor;

use claxon::FlacReader;

use iamf_core::error::{invalid_argument, Result};
use iamf_obu::audio_frame::AudioFrame;
use iamf_obu::codec_config::FlacDecoderConfig;

use crate::{Decoder, EncodedAudioFrame, Encoder, PartialAudioFrameMeta, SampleGrid};

const FLAC_MAGIC: &[u8; 4] = b"fLaC";

/// Scans metadata block headers starting right after the `fLaC` magic and
/// returns the byte offset where the first audio frame begins.
fn metadata_blocks_end(stream: &[u8]) -> Result<usize> {
    if stream.len() < 4 || &stream[0..4] != FLAC_MAGIC {
        return invalid_argument("flac stream is missing the fLaC marker");
    }
    let mut offset = 4;
    loop {
        if offset + 4 > stream.len() {
            return invalid_argument("flac metadata block header runs past the end of the stream");
        }
        let header = &stream[offset..offset + 4];
        let is_last = header[0] & 0x80 != 0;
        let length = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
        offset += 4 + length;
        if is_last {
            return Ok(offset);
        }
    }
}

/// Glues the Codec Config's metadata blocks to a single frame payload to
/// produce a complete, if minimal, FLAC stream claxon can read.
fn build_stream(metadata_blocks: &[u8], frame: &[u8]) -> Vec<u8> {
    let mut stream = Vec::with_capacity(4 + metadata_blocks.len() + frame.len());
    stream.extend_from_slice(FLAC_MAGIC);
    stream.extend_from_slice(metadata_blocks);
    stream.extend_from_slice(frame);
    stream
}

pub struct FlacDecoder {
    metadata_blocks: Vec<u8>,
    channel_count: usize,
    bits_per_sample: u32,
}

impl FlacDecoder {
    pub fn new(config: FlacDecoderConfig, channel_count: usize) -> Result<Self> {
        // Parse just far enough to read STREAMINFO's bit depth; claxon wants
        // it as its own well-formed stream, but we only need this one field
        // to sign-extend the wide samples it hands back as i32.
        let probe = build_stream(&config.metadata_blocks, &[]);
        let bits_per_sample = match FlacReader::new(Cursor::new(probe)) {
            Ok(reader) => reader.streaminfo().bits_per_sample,
            Err(_) => 16,
        };
        Ok(FlacDecoder { metadata_blocks: config.metadata_blocks, channel_count, bits_per_sample })
    }
}

impl Decoder for FlacDecoder {
    fn decode(&mut self, audio_frame: &AudioFrame) -> Result<SampleGrid> {
        let stream = build_stream(&self.metadata_blocks, &audio_frame.payload);
        let mut reader = FlacReader::new(Cursor::new(stream))
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("flac stream open failed: {e}")))?;

        let channel_count = reader.streaminfo().channels as usize;
        if channel_count != self.channel_count {
            return invalid_argument(format!(
                "flac frame carries {channel_count} channels, expected {}",
                self.channel_count
            ));
        }

        let mut interleaved = Vec::new();
        for sample in reader.samples() {
            let sample = sample.map_err(|e| iamf_core::Error::InvalidArgument(format!("flac sample decode failed: {e}")))?;
            interleaved.push(sample);
        }
        if interleaved.len() % channel_count != 0 {
            return invalid_argument("flac decoded sample count is not a multiple of the channel count");
        }

        let num_ticks = interleaved.len() / channel_count;
        let mut grid = Vec::with_capacity(num_ticks);
        for tick in 0..num_ticks {
            grid.push(interleaved[tick * channel_count..(tick + 1) * channel_count].to_vec());
        }
        let _ = self.bits_per_sample; // claxon already widens samples to i32 for us.
        Ok(grid)
    }

    fn supports_partial_frames(&self) -> bool {
        true
    }
}

pub struct FlacEncoder {
    channel_count: usize,
    bits_per_sample: u32,
    sample_rate: u32,
    ready: Vec<EncodedAudioFrame>,
    finalized: bool,
}

impl FlacEncoder {
    pub fn new(sample_rate: u32, channel_count: usize, bits_per_sample: u32) -> Self {
        FlacEncoder { channel_count, bits_per_sample, sample_rate, ready: Vec::new(), finalized: false }
    }
}

impl Encoder for FlacEncoder {
    fn initialize(&mut self, _validate_codec_delay: bool) -> Result<u32> {
        Ok(0)
    }

    fn encode_audio_frame(&mut self, _input_bit_depth: u8, samples: &SampleGrid, meta: PartialAudioFrameMeta) -> Result<()> {
        if samples.iter().any(|tick| tick.len() != self.channel_count) {
            return invalid_argument("flac encode_audio_frame received a tick with the wrong channel count");
        }
        let mut interleaved = Vec::with_capacity(samples.len() * self.channel_count);
        for tick in samples {
            interleaved.extend_from_slice(tick);
        }

        let source = flacenc::source::MemSource::from_samples(
            &interleaved,
            self.channel_count,
            self.bits_per_sample as usize,
            self.sample_rate as usize,
        );
        let config = flacenc::config::Encoder::default();
        let block_size = samples.len().max(1);
        let stream = flacenc::encode_with_fixed_block_size(&config, source, block_size)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("flac encode failed: {e:?}")))?;

        let mut sink = flacenc::bitsink::ByteSink::new();
        flacenc::component::BitRepr::write(&stream, &mut sink)
            .map_err(|e| iamf_core::Error::InvalidArgument(format!("flac bitstream write failed: {e:?}")))?;
        let full_stream = sink.as_slice().to_vec();

        let frame_start = metadata_blocks_end(&full_stream)?;
        let payload = full_stream[frame_start..].to_vec();
        self.ready.push(EncodedAudioFrame { meta, payload });
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }

    fn frames_available(&self) -> bool {
        !self.ready.is_empty()
    }

    fn pop(&mut self, frames: &mut Vec<EncodedAudioFrame>) -> Result<()> {
        frames.append(&mut self.ready);
        Ok(())
    }

    fn finished(&self) -> bool {
        self.finalized && self.ready.is_empty()
    }

    fn number_of_samples_to_delay_at_start(&self) -> u32 {
        0
    }

    fn supports_partial_frames(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_blocks_end_finds_the_last_block() {
        // STREAMINFO (34-byte body) marked as the only, final, block.
        let mut stream = Vec::new();
        stream.extend_from_slice(FLAC_MAGIC);
        stream.push(0x80); // is_last = 1, block_type = 0 (STREAMINFO)
        stream.extend_from_slice(&[0, 0, 34]); // 24-bit length
        stream.extend(std::iter::repeat(0u8).take(34));
        stream.extend_from_slice(b"FRAMEDATA");

        let end = metadata_blocks_end(&stream).unwrap();
        assert_eq!(end, 4 + 4 + 34);
        assert_eq!(&stream[end..], b"FRAMEDATA");
    }

    #[test]
    fn missing_magic_is_rejected() {
        assert!(metadata_blocks_end(b"nope").is_err());
    }
}
