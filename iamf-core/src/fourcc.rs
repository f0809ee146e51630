// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Four-character codec identifiers, encoded big-endian on the wire.

use std::fmt;

/// A four-byte ASCII codec identifier, e.g. `"Opus"`, `"fLaC"`, `"ipcm"`, `"mp4a"`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const OPUS: FourCc = FourCc(*b"Opus");
    pub const FLAC: FourCc = FourCc(*b"fLaC");
    pub const LPCM: FourCc = FourCc(*b"ipcm");
    pub const AAC_LC: FourCc = FourCc(*b"mp4a");

    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCc(bytes)
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn from_u32_be(value: u32) -> Self {
        FourCc(value.to_be_bytes())
    }

    pub fn to_u32_be(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "FourCc({s:?})"),
            _ => write!(f, "FourCc({:?})", self.0),
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{s}"),
            _ => write!(f, "{:?}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u32() {
        assert_eq!(FourCc::from_u32_be(FourCc::OPUS.to_u32_be()), FourCc::OPUS);
    }

    #[test]
    fn known_constants_match_ascii() {
        assert_eq!(FourCc::OPUS.as_bytes(), *b"Opus");
        assert_eq!(FourCc::FLAC.as_bytes(), *b"fLaC");
        assert_eq!(FourCc::LPCM.as_bytes(), *b"ipcm");
        assert_eq!(FourCc::AAC_LC.as_bytes(), *b"mp4a");
    }
}
