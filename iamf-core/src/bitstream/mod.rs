// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composable bit- and byte-level I/O over an in-memory buffer.
//!
//! Every reader and writer here operates on a buffer the caller already
//! holds in memory (`&[u8]` to read, `Vec<u8>` to write) rather than
//! streaming from an arbitrary source, so reads are expressed directly
//! against a bit offset without a fetch/consume cache in front of them.

mod reader;
mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;

/// The largest LEB128 encoding this bitstream accepts, per spec: at most 8
/// bytes, and the decoded value must fit in 32 bits.
pub const LEB128_MAX_BYTES: usize = 8;

/// Null-terminated strings (e.g. Mix Presentation annotations) are capped at
/// this many bytes, terminator included.
pub const MAX_STRING_SIZE: usize = 128;

/// An entire OBU, header and payload together, must not exceed this size.
pub const MAX_OBU_SIZE: usize = 2 * 1024 * 1024;
