//! Fixed 20-byte container header.
//!
//! ```text
//! 0   magic          "CHNK" (raw bytes)
//! 4   flag word      u32 BE; bit 0x100 selects the Alternate variant
//! 8   block count    i32, variant byte order from here on
//! 12  max block size i32 (capacity hint, never validated)
//! 16  version        i16 = 1
//! 18  secondary tag  i16 = 2 (Standard) / 5 (Alternate)
//! ```

use std::io::{Read, Write};

use log::debug;
use serde::Serialize;

use crate::chunk::{ChunkError, Region};
use crate::io_stream::{Endian, EndianReader, EndianWriter};

/// "CHNK" read as a big-endian u32.
pub const CHNK_MAGIC: u32 = 0x4348_4E4B;
pub const HEADER_SIZE: u64 = 20;
/// Flag-word bit selecting the Alternate layout.
pub const ALTERNATE_FLAG: u32 = 0x100;
pub const HEADER_VERSION: i16 = 1;

/// On-disk layout mode.
///
/// The variant is consulted in exactly two places: here, for byte order, and
/// in [`TableRecord`](crate::block::TableRecord), for the order of the
/// offset and flags fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Variant {
    /// Big-endian, records laid out as `(flags, offset)`.
    #[default]
    Standard,
    /// Little-endian, records laid out as `(offset, flags)`.
    Alternate,
}

impl Variant {
    pub fn from_flags(flags: u32) -> Self {
        if flags & ALTERNATE_FLAG != 0 { Variant::Alternate } else { Variant::Standard }
    }

    /// Flag word the writer emits.
    pub fn flag_word(self) -> u32 {
        match self {
            Variant::Standard  => 0xFF,
            Variant::Alternate => 0x1FF,
        }
    }

    pub fn endian(self) -> Endian {
        match self {
            Variant::Standard  => Endian::Big,
            Variant::Alternate => Endian::Little,
        }
    }

    pub fn secondary_tag(self) -> i16 {
        match self {
            Variant::Standard  => 2,
            Variant::Alternate => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Standard  => "standard",
            Variant::Alternate => "alternate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkHeader {
    pub variant:        Variant,
    pub flags:          u32,
    pub block_count:    i32,
    pub max_block_size: i32,
    pub version:        i16,
    pub secondary_tag:  i16,
}

impl ChunkHeader {
    pub fn new(variant: Variant, block_count: i32, max_block_size: i32) -> Self {
        Self {
            variant,
            flags: variant.flag_word(),
            block_count,
            max_block_size,
            version: HEADER_VERSION,
            secondary_tag: variant.secondary_tag(),
        }
    }

    /// Writes the header and leaves `writer` in the variant's byte order.
    pub fn write<W: Write>(&self, writer: &mut EndianWriter<W>) -> std::io::Result<()> {
        writer.set_endian(Endian::Big);
        writer.write_u32(CHNK_MAGIC)?;
        writer.write_u32(self.flags)?;
        writer.set_endian(self.variant.endian());
        writer.write_i32(self.block_count)?;
        writer.write_i32(self.max_block_size)?;
        writer.write_i16(self.version)?;
        writer.write_i16(self.secondary_tag)?;
        Ok(())
    }

    /// Reads the header and leaves `reader` in the variant's byte order.
    ///
    /// A wrong magic yields [`ChunkError::FormatMismatch`]; the caller
    /// decides whether that is fatal.
    pub fn read<R: Read>(reader: &mut EndianReader<R>) -> Result<Self, ChunkError> {
        let at_header = |e: std::io::Error| ChunkError::reading(e, Region::Header);

        reader.set_endian(Endian::Big);
        let magic = reader.read_tag().map_err(at_header)?;
        if u32::from_be_bytes(magic) != CHNK_MAGIC {
            return Err(ChunkError::FormatMismatch { found: hex::encode(magic) });
        }

        let flags = reader.read_u32().map_err(at_header)?;
        let variant = Variant::from_flags(flags);
        reader.set_endian(variant.endian());

        let header = Self {
            variant,
            flags,
            block_count:    reader.read_i32().map_err(at_header)?,
            max_block_size: reader.read_i32().map_err(at_header)?,
            version:        reader.read_i16().map_err(at_header)?,
            secondary_tag:  reader.read_i16().map_err(at_header)?,
        };
        debug!(
            "CHNK header: {} variant, flags {:#x}, {} blocks",
            variant.name(), flags, header.block_count
        );
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn standard_header_bytes() {
        let mut w = EndianWriter::new(Vec::new(), Endian::Big);
        ChunkHeader::new(Variant::Standard, 3, 10).write(&mut w).unwrap();
        assert_eq!(w.endian(), Endian::Big);
        let buf = w.into_inner();
        assert_eq!(buf.len() as u64, HEADER_SIZE);
        assert_eq!(&buf[0..4], b"CHNK");
        assert_eq!(&buf[4..8], &[0, 0, 0, 0xFF]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 3]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 10]);
        assert_eq!(&buf[16..20], &[0, 1, 0, 2]);
    }

    #[test]
    fn alternate_header_bytes() {
        let mut w = EndianWriter::new(Vec::new(), Endian::Big);
        ChunkHeader::new(Variant::Alternate, 3, 10).write(&mut w).unwrap();
        assert_eq!(w.endian(), Endian::Little);
        let buf = w.into_inner();
        // Magic and flag word stay big-endian in both variants.
        assert_eq!(&buf[0..4], b"CHNK");
        assert_eq!(&buf[4..8], &[0, 0, 1, 0xFF]);
        assert_eq!(&buf[8..12], &[3, 0, 0, 0]);
        assert_eq!(&buf[12..16], &[10, 0, 0, 0]);
        assert_eq!(&buf[16..20], &[1, 0, 5, 0]);
    }

    #[test]
    fn read_back_both_variants() {
        for variant in [Variant::Standard, Variant::Alternate] {
            let header = ChunkHeader::new(variant, 7, 4096);
            let mut w = EndianWriter::new(Vec::new(), Endian::Big);
            header.write(&mut w).unwrap();

            let mut r = EndianReader::new(Cursor::new(w.into_inner()), Endian::Big);
            assert_eq!(ChunkHeader::read(&mut r).unwrap(), header);
            assert_eq!(r.endian(), variant.endian());
        }
    }

    #[test]
    fn any_flag_word_with_bit_0x100_is_alternate() {
        assert_eq!(Variant::from_flags(0x100), Variant::Alternate);
        assert_eq!(Variant::from_flags(0xFFFF_FFFF), Variant::Alternate);
        assert_eq!(Variant::from_flags(0xFF), Variant::Standard);
        assert_eq!(Variant::from_flags(0), Variant::Standard);
    }

    #[test]
    fn wrong_magic() {
        let mut r = EndianReader::new(Cursor::new(b"RIFF\0\0\0\0".to_vec()), Endian::Big);
        match ChunkHeader::read(&mut r) {
            Err(ChunkError::FormatMismatch { found }) => assert_eq!(found, "52494646"),
            other => panic!("expected FormatMismatch, got {other:?}"),
        }
    }

    #[test]
    fn short_header_is_truncated() {
        let mut r = EndianReader::new(Cursor::new(b"CHNK\0\0\0\xFF\0\0".to_vec()), Endian::Big);
        assert!(matches!(
            ChunkHeader::read(&mut r),
            Err(ChunkError::TruncatedStream { region: Region::Header, .. })
        ));
    }
}
