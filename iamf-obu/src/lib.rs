// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OBU (Object Unit) types for the IAMF bitstream: the header grammar, every
//! descriptor and temporal-unit payload, the closed channel-label algebra,
//! and the `AudioElementWithData`/`CodecConfigWithData` derivations that
//! downstream crates (`iamf-demux`, `iamf-encode`, `iamf-decode`) build on.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod audio_element;
pub mod audio_frame;
pub mod channel_label;
pub mod codec_config;
pub mod element;
pub mod header;
pub mod mix_presentation;
pub mod parameter;
pub mod sequence_header;

pub use channel_label::ChannelLabel;
pub use header::{ObuHeader, ObuType};
