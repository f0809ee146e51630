// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The encode side of the IAMF pipeline: the Audio Frame Generator state
//! machine and the top-level orchestrator that wires it to codec adapters,
//! the demixing module, and the Global Timing Module.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod encoder;
pub mod frame_generator;

pub use encoder::IamfEncoder;
pub use frame_generator::{AudioFrameGenerator, ElementInit, TrimSpec};
