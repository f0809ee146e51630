// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The IA Sequence Header OBU: the four-byte magic that opens every IA
//! Sequence plus its profile pair.

use iamf_core::bitstream::{BitReader, BitWriter};
use iamf_core::error::{invalid_argument, Result};

pub const IAMF_MAGIC: [u8; 4] = *b"iamf";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IaSequenceHeader {
    pub primary_profile: u8,
    pub additional_profile: u8,
}

impl IaSequenceHeader {
    pub fn parse(rb: &mut BitReader<'_>) -> Result<Self> {
        let magic = rb.read_bytes(4)?;
        if magic != IAMF_MAGIC {
            return invalid_argument("IA Sequence Header is missing the \"iamf\" magic");
        }
        let primary_profile = rb.read_u8()?;
        let additional_profile = rb.read_u8()?;
        Ok(IaSequenceHeader { primary_profile, additional_profile })
    }

    pub fn serialize(&self, w: &mut BitWriter) -> Result<()> {
        w.write_bytes(&IAMF_MAGIC)?;
        w.write_u8(self.primary_profile);
        w.write_u8(self.additional_profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let header = IaSequenceHeader { primary_profile: 0, additional_profile: 0 };
        let mut w = BitWriter::new();
        header.serialize(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(IaSequenceHeader::parse(&mut r).unwrap(), header);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut r = BitReader::new(b"xxxx\x00\x00");
        assert!(IaSequenceHeader::parse(&mut r).is_err());
    }
}
