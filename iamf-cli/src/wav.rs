// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WAV file I/O via `hound`, standing in for the original's raw PCM file
//! reader/writer (`wav_writer.cc`/`wav_reader.cc` in `original_source/`).

use std::path::Path;

use iamf_core::error::{invalid_argument, Result};

/// Reads an entire WAV file as per-channel integer sample vectors (not
/// interleaved), at whatever bit depth it declares.
pub struct WavSource {
    pub channels: Vec<Vec<i32>>,
    pub sample_rate: u32,
    pub bit_depth: u8,
}

pub fn read_wav(path: &Path) -> Result<WavSource> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| iamf_core::Error::InvalidArgument(format!("failed to open {}: {e}", path.display())))?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        return invalid_argument(format!("{} declares zero channels", path.display()));
    }

    let mut channels = vec![Vec::new(); num_channels];
    match spec.sample_format {
        hound::SampleFormat::Int => {
            for (i, sample) in reader.samples::<i32>().enumerate() {
                let sample = sample.map_err(|e| iamf_core::Error::InvalidArgument(format!("bad sample in {}: {e}", path.display())))?;
                channels[i % num_channels].push(sample);
            }
        }
        hound::SampleFormat::Float => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for (i, sample) in reader.samples::<f32>().enumerate() {
                let sample = sample.map_err(|e| iamf_core::Error::InvalidArgument(format!("bad sample in {}: {e}", path.display())))?;
                channels[i % num_channels].push((sample * full_scale).round() as i32);
            }
        }
    }

    Ok(WavSource { channels, sample_rate: spec.sample_rate, bit_depth: spec.bits_per_sample as u8 })
}

/// Writes `pcm` (`[tick][channel]`) to `path` as a signed integer WAV file.
pub fn write_wav(path: &Path, pcm: &[Vec<i32>], sample_rate: u32, bit_depth: u8) -> Result<()> {
    let channel_count = pcm.first().map(|row| row.len()).unwrap_or(0);
    if channel_count == 0 {
        return invalid_argument("cannot write a WAV file with zero channels");
    }

    let spec = hound::WavSpec {
        channels: channel_count as u16,
        sample_rate,
        bits_per_sample: u16::from(bit_depth),
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| iamf_core::Error::InvalidArgument(format!("failed to create {}: {e}", path.display())))?;

    for row in pcm {
        if row.len() != channel_count {
            return invalid_argument("every tick must carry the same channel count to write a WAV file");
        }
        for &sample in row {
            writer
                .write_sample(sample)
                .map_err(|e| iamf_core::Error::InvalidArgument(format!("failed to write sample to {}: {e}", path.display())))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| iamf_core::Error::InvalidArgument(format!("failed to finalize {}: {e}", path.display())))
}
