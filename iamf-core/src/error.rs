// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The common error type returned at every API boundary in the pipeline.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// `Error` enumerates every kind of failure the pipeline can report.
///
/// Every multi-step operation either succeeds completely or leaves observable
/// state unchanged (bitstream parsers rewind their cursor on failure rather than
/// leaving it mid-read).
#[derive(Debug)]
pub enum Error {
    /// Malformed or semantically inconsistent input: duplicate ids, mismatched
    /// channel counts, forbidden layer transitions, trim larger than a frame,
    /// mismatched trim flags across substreams of one submission, unknown enum
    /// values, parameter-rate mismatches, and the like.
    InvalidArgument(String),
    /// A short read on the bitstream. The caller should provide more bytes and
    /// retry; callers that reached this via the Descriptor Parser or OBU
    /// Processor will also see `insufficient_data = true` on the companion
    /// return value.
    ResourceExhausted(&'static str),
    /// The requested behavior is not implemented by this pipeline (e.g. input
    /// and output sample rates differ, or a reserved loudspeaker layout).
    Unimplemented(&'static str),
    /// Rendering was requested but no Mix Presentation in the stream matches
    /// the desired profile set.
    NotFound(&'static str),
    /// An internal invariant that should not be reachable through the public
    /// API was violated; indicates a bug in the caller or in this crate.
    Unknown(&'static str),
    /// The renderer failed to produce output within its poll budget.
    DeadlineExceeded(&'static str),
    /// The API was used out of sequence (e.g. finalizing a mix presentation
    /// while the encoder is still generating audio frames).
    FailedPrecondition(&'static str),
    /// An I/O error from the surrounding file/CLI layer.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
            Error::Unimplemented(msg) => write!(f, "unimplemented: {msg}"),
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::Unknown(msg) => write!(f, "internal error: {msg}"),
            Error::DeadlineExceeded(msg) => write!(f, "deadline exceeded: {msg}"),
            Error::FailedPrecondition(msg) => write!(f, "failed precondition: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience constructor for [`Error::InvalidArgument`].
pub fn invalid_argument<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::InvalidArgument(msg.into()))
}

/// Convenience constructor for [`Error::ResourceExhausted`].
pub fn resource_exhausted<T>(msg: &'static str) -> Result<T> {
    Err(Error::ResourceExhausted(msg))
}

/// Convenience constructor for [`Error::Unimplemented`].
pub fn unimplemented<T>(msg: &'static str) -> Result<T> {
    Err(Error::Unimplemented(msg))
}

/// Convenience constructor for [`Error::NotFound`].
pub fn not_found<T>(msg: &'static str) -> Result<T> {
    Err(Error::NotFound(msg))
}

/// Convenience constructor for [`Error::Unknown`].
pub fn unknown<T>(msg: &'static str) -> Result<T> {
    Err(Error::Unknown(msg))
}

/// Convenience constructor for [`Error::DeadlineExceeded`].
pub fn deadline_exceeded<T>(msg: &'static str) -> Result<T> {
    Err(Error::DeadlineExceeded(msg))
}

/// Convenience constructor for [`Error::FailedPrecondition`].
pub fn failed_precondition<T>(msg: &'static str) -> Result<T> {
    Err(Error::FailedPrecondition(msg))
}
