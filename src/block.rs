use std::io::{self, Read, Write};

use serde::Serialize;

use crate::chunk::ChunkError;
use crate::codec::{deflate_block, CodecError, CompressionType};
use crate::header::{Variant, HEADER_SIZE};
use crate::io_stream::{EndianReader, EndianWriter};

/// Record flag: the stored bytes are a zlib stream.
pub const COMPRESSED_FLAG: u32 = 0x0100_0000;
pub const TABLE_RECORD_SIZE: u64 = 16;

/// One 16-byte entry of the block table.
///
/// `inflated_size` duplicates `size` when written and is ignored on read.
/// `offset` is written for other tools; the decoder reads blocks back to
/// back and never seeks to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableRecord {
    pub size:          i32,
    pub inflated_size: i32,
    pub offset:        i32,
    pub flags:         u32,
}

impl TableRecord {
    pub fn is_compressed(&self) -> bool {
        self.flags & COMPRESSED_FLAG != 0
    }

    pub fn write<W: Write>(&self, writer: &mut EndianWriter<W>, variant: Variant) -> io::Result<()> {
        writer.write_i32(self.size)?;
        writer.write_i32(self.inflated_size)?;
        match variant {
            Variant::Standard => {
                writer.write_u32(self.flags)?;
                writer.write_i32(self.offset)?;
            }
            Variant::Alternate => {
                writer.write_i32(self.offset)?;
                writer.write_u32(self.flags)?;
            }
        }
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut EndianReader<R>, variant: Variant) -> io::Result<Self> {
        let size = reader.read_i32()?;
        let inflated_size = reader.read_i32()?;
        let (flags, offset) = match variant {
            Variant::Standard => {
                let flags = reader.read_u32()?;
                (flags, reader.read_i32()?)
            }
            Variant::Alternate => {
                let offset = reader.read_i32()?;
                (reader.read_u32()?, offset)
            }
        };
        Ok(Self { size, inflated_size, offset, flags })
    }
}

/// One payload unit of a container.
///
/// `compressed` describes `data` as it is: when set, `data` already holds a
/// zlib stream and is written verbatim with [`COMPRESSED_FLAG`] raised.
/// Writing never compresses.  Blocks produced by decoding are always
/// inflated and carry `compressed == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub data:       Vec<u8>,
    pub compressed: bool,
}

impl Block {
    pub fn raw(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), compressed: false }
    }

    /// Wrap bytes that are already a zlib stream.
    pub fn precompressed(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), compressed: true }
    }

    /// Deflate `data` now and wrap the result as a precompressed block.
    pub fn compress(data: &[u8], level: u32) -> Result<Self, CodecError> {
        Ok(Self::precompressed(deflate_block(data, CompressionType::Zlib, level)?))
    }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

/// Lay out the block table for `blocks`.
///
/// Offsets start right after the header and table, and each block advances
/// the running offset by its stored length.  Every length, the count and
/// every written offset must fit the format's signed 32-bit fields.
pub fn plan_table(blocks: &[Block]) -> Result<Vec<TableRecord>, ChunkError> {
    let count = fit_i32("block count", blocks.len() as u64)?;
    let mut offset = HEADER_SIZE + count as u64 * TABLE_RECORD_SIZE;

    let mut table = Vec::with_capacity(blocks.len());
    for block in blocks {
        let size = fit_i32("block size", block.len() as u64)?;
        table.push(TableRecord {
            size,
            inflated_size: size,
            offset: fit_i32("block offset", offset)?,
            flags: if block.compressed { COMPRESSED_FLAG } else { 0 },
        });
        offset += block.len() as u64;
    }
    Ok(table)
}

fn fit_i32(what: &'static str, value: u64) -> Result<i32, ChunkError> {
    i32::try_from(value).map_err(|_| ChunkError::CapacityExceeded { what, value })
}
