// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The decode side of the IAMF pipeline: the streaming descriptor parser,
//! the OBU Processor that assembles temporal units, and the Rendering Mix
//! Presentation Finalizer that turns them into measured, clipped PCM.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod descriptor_parser;
pub mod finalizer;
pub mod loudness;
pub mod processor;

pub use descriptor_parser::{process_descriptor_obus, ParsedDescriptors};
pub use finalizer::{AudioElementRenderer, MeasuredLoudness, RenderedOutput, RenderingMixPresentationFinalizer};
pub use processor::{ObuProcessor, OutputTemporalUnit};
