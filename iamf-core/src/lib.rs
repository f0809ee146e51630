// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared plumbing for the IAMF encoder/decoder pipeline: bit-level I/O over
//! in-memory buffers, the common error type, and small unit types (ticks,
//! `FourCc`, Q7.8 fixed point) used by every other crate in the workspace.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod bitstream;
pub mod error;
pub mod fourcc;
pub mod units;

pub use error::{Error, Result};
pub use fourcc::FourCc;
