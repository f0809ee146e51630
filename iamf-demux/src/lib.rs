// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Global timing, channel demixing, parameter block evaluation, and the
//! Parameters Manager that ties them to an audio element's lifetime.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod demix;
pub mod manager;
pub mod param_state;
pub mod timing;

pub use demix::{DownMixingParams, LabelSamples};
pub use manager::{ParametersManager, ReconGainInfoParameterData};
pub use timing::GlobalTimingModule;
