//! CHNK container: an ordered list of opaque blocks behind a fixed header
//! and a block table.
//!
//! ```no_run
//! use chnk::codec::DEFAULT_ZLIB_LEVEL;
//! use chnk::{Block, Chunk, Variant};
//!
//! let mut chunk = Chunk::new(Variant::Alternate);
//! chunk.push(Block::raw(b"first".to_vec()));
//! chunk.push(Block::compress(b"second", DEFAULT_ZLIB_LEVEL)?);
//! chunk.write_to_file("out.chnk", true)?;
//!
//! let back = Chunk::open("out.chnk")?;
//! assert_eq!(back.entries[1].data, b"second");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Decoding
//! Blocks come back inflated and in table order.  A stream that does not
//! start with the CHNK magic decodes to an empty container through
//! [`Chunk::read`]; use [`Chunk::read_strict`] to get
//! [`ChunkError::FormatMismatch`] instead.
//!
//! # Encoding
//! Payloads are written verbatim.  A block flagged `compressed` must already
//! hold a zlib stream (see [`Block::compress`]).

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::block::{plan_table, Block, TableRecord};
use crate::codec::{inflate_block, CodecError, CompressionType};
use crate::header::{ChunkHeader, Variant};
use crate::io_stream::{Endian, EndianReader, EndianWriter};

// ── Errors ───────────────────────────────────────────────────────────────────

/// Part of the container being read when a stream error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Header,
    Table(usize),
    Payload(usize),
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Header     => write!(f, "header"),
            Region::Table(i)   => write!(f, "table record {i}"),
            Region::Payload(i) => write!(f, "payload of block {i}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Not a CHNK container (magic bytes {found})")]
    FormatMismatch { found: String },
    #[error("Stream ended inside {region}")]
    TruncatedStream {
        region: Region,
        #[source]
        source: io::Error,
    },
    #[error("Payload of block {index} is corrupt")]
    PayloadCorrupt {
        index: usize,
        #[source]
        source: CodecError,
    },
    #[error("Failed to compress block {index}")]
    Compression {
        index: usize,
        #[source]
        source: CodecError,
    },
    #[error("{what} {value} does not fit a 32-bit table field")]
    CapacityExceeded { what: &'static str, value: u64 },
    #[error("Invalid block table: {what} is {value}")]
    InvalidTable { what: String, value: i64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ChunkError {
    /// Classify a read failure: running out of bytes is a truncated
    /// container, anything else is a transport error.
    pub(crate) fn reading(err: io::Error, region: Region) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ChunkError::TruncatedStream { region, source: err }
        } else {
            ChunkError::Io(err)
        }
    }
}

// ── PackOptions ──────────────────────────────────────────────────────────────

/// Configuration for [`Chunk::pack`] and the CLI `pack` command.
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub variant:        Variant,
    /// Deflate every payload at this zlib level before insertion.
    pub compression:    Option<u32>,
    pub include_header: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            variant:        Variant::Standard,
            compression:    None,
            include_header: true,
        }
    }
}

// ── Inspection ───────────────────────────────────────────────────────────────

/// Per-block diagnostics returned by [`Chunk::inspect`].
#[derive(Debug, Clone, Serialize)]
pub struct BlockInfo {
    pub index:       usize,
    pub stored_size: i32,
    pub offset:      i32,
    pub compressed:  bool,
    /// Length after inflation.
    pub size:        usize,
    pub crc32:       u32,
    /// Hex of the first bytes of the inflated payload.
    pub preview:     String,
}

/// Header and table as found on disk, alongside what decoding produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkInfo {
    pub header:  ChunkHeader,
    pub records: Vec<TableRecord>,
    pub blocks:  Vec<BlockInfo>,
}

const PREVIEW_LEN: usize = 8;

// ── Chunk ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub variant: Variant,
    pub entries: Vec<Block>,
}

impl Chunk {
    pub fn new(variant: Variant) -> Self {
        Self { variant, entries: Vec::new() }
    }

    /// Build a container from raw payloads, deflating them first when
    /// `opts.compression` is set.
    pub fn pack<I, B>(payloads: I, opts: &PackOptions) -> Result<Self, ChunkError>
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let mut chunk = Self::new(opts.variant);
        for (index, payload) in payloads.into_iter().enumerate() {
            let payload = payload.into();
            let block = match opts.compression {
                Some(level) => Block::compress(&payload, level)
                    .map_err(|source| ChunkError::Compression { index, source })?,
                None => Block::raw(payload),
            };
            chunk.push(block);
        }
        Ok(chunk)
    }

    pub fn push(&mut self, block: Block) {
        self.entries.push(block);
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Largest stored payload, or 0 for an empty container.
    pub fn max_block_size(&self) -> usize {
        self.entries.iter().map(Block::len).max().unwrap_or(0)
    }

    /// The table records [`Chunk::write`] would emit.
    pub fn table(&self) -> Result<Vec<TableRecord>, ChunkError> {
        plan_table(&self.entries)
    }

    // ── Decode ───────────────────────────────────────────────────────────────

    /// Decode a container, returning an empty one if the magic is wrong.
    pub fn read<R: Read>(reader: R) -> Result<Self, ChunkError> {
        match Self::read_strict(reader) {
            Err(ChunkError::FormatMismatch { found }) => {
                warn!("magic {found} is not CHNK; treating input as an empty container");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Decode a container; a wrong magic is an error.
    pub fn read_strict<R: Read>(reader: R) -> Result<Self, ChunkError> {
        decode(reader).map(|d| d.chunk)
    }

    /// Decode a container and report its header and table as stored.
    pub fn inspect<R: Read>(reader: R) -> Result<(ChunkInfo, Self), ChunkError> {
        let Decoded { header, records, chunk } = decode(reader)?;
        let blocks = records
            .iter()
            .zip(&chunk.entries)
            .enumerate()
            .map(|(index, (rec, block))| BlockInfo {
                index,
                stored_size: rec.size,
                offset:      rec.offset,
                compressed:  rec.is_compressed(),
                size:        block.len(),
                crc32:       crc32fast::hash(&block.data),
                preview:     hex::encode(&block.data[..block.len().min(PREVIEW_LEN)]),
            })
            .collect();
        Ok((ChunkInfo { header, records, blocks }, chunk))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChunkError> {
        Self::read(BufReader::new(File::open(path)?))
    }

    // ── Encode ───────────────────────────────────────────────────────────────

    /// Encode the container.
    ///
    /// With `include_header == false` only the concatenated payloads are
    /// written, for embedding in a format that carries its own header.
    pub fn write<W: Write>(&self, writer: W, include_header: bool) -> Result<(), ChunkError> {
        let mut w = EndianWriter::new(writer, Endian::Big);

        if include_header {
            let table = self.table()?;
            // plan_table already bounded every length and the count.
            let header = ChunkHeader::new(
                self.variant,
                table.len() as i32,
                self.max_block_size() as i32,
            );
            header.write(&mut w)?;
            for record in &table {
                record.write(&mut w, self.variant)?;
            }
        }

        for block in &self.entries {
            w.write_bytes(&block.data)?;
        }
        w.flush()?;

        debug!(
            "wrote {} {} blocks ({} bytes, header {})",
            self.entries.len(),
            self.variant.name(),
            w.position(),
            if include_header { "on" } else { "off" },
        );
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, include_header: bool) -> Result<(), ChunkError> {
        self.write(BufWriter::new(File::create(path)?), include_header)
    }
}

/// Decode `in_path` and write it back to `out_path` with every block stored
/// inflated.  The container keeps its variant.
pub fn decompress_chunk_file<P: AsRef<Path>, Q: AsRef<Path>>(
    in_path:        P,
    out_path:       Q,
    include_header: bool,
) -> Result<Chunk, ChunkError> {
    let chunk = Chunk::open(in_path)?;
    chunk.write_to_file(out_path, include_header)?;
    Ok(chunk)
}

// ── Decoder ──────────────────────────────────────────────────────────────────

struct Decoded {
    header:  ChunkHeader,
    records: Vec<TableRecord>,
    chunk:   Chunk,
}

/// Upper bound on table entries reserved before any record has been read.
const TABLE_RESERVE_LIMIT: usize = 4096;

fn decode<R: Read>(reader: R) -> Result<Decoded, ChunkError> {
    let mut r = EndianReader::new(reader, Endian::Big);
    let header = ChunkHeader::read(&mut r)?;
    let variant = header.variant;

    let count = usize::try_from(header.block_count).map_err(|_| ChunkError::InvalidTable {
        what:  "block count".to_string(),
        value: header.block_count as i64,
    })?;

    let mut records = Vec::with_capacity(count.min(TABLE_RESERVE_LIMIT));
    for index in 0..count {
        let record = TableRecord::read(&mut r, variant)
            .map_err(|e| ChunkError::reading(e, Region::Table(index)))?;
        if record.size < 0 {
            return Err(ChunkError::InvalidTable {
                what:  format!("size of block {index}"),
                value: record.size as i64,
            });
        }
        records.push(record);
    }

    let mut chunk = Chunk::new(variant);
    for (index, record) in records.iter().enumerate() {
        let stored = r
            .read_bytes(record.size as usize)
            .map_err(|e| ChunkError::reading(e, Region::Payload(index)))?;

        let data = if record.is_compressed() && !stored.is_empty() {
            let inflated = inflate_block(&stored, CompressionType::Zlib)
                .map_err(|source| ChunkError::PayloadCorrupt { index, source })?;
            debug!("block {index}: inflated {} -> {} bytes", stored.len(), inflated.len());
            inflated
        } else {
            stored
        };
        chunk.push(Block::raw(data));
    }

    debug!("decoded {} {} blocks ({} bytes read)", chunk.len(), variant.name(), r.position());
    Ok(Decoded { header, records, chunk })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::COMPRESSED_FLAG;
    use crate::codec::deflate_block;
    use std::io::Cursor;

    fn encode(chunk: &Chunk, include_header: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        chunk.write(&mut buf, include_header).unwrap();
        buf
    }

    fn sample(variant: Variant) -> Chunk {
        let mut chunk = Chunk::new(variant);
        chunk.push(Block::raw(vec![0xAB; 10]));
        chunk.push(Block::raw(Vec::new()));
        chunk.push(Block::raw(b"texture".to_vec()));
        chunk
    }

    #[test]
    fn roundtrip_both_variants() {
        for variant in [Variant::Standard, Variant::Alternate] {
            let chunk = sample(variant);
            let back = Chunk::read(Cursor::new(encode(&chunk, true))).unwrap();
            assert_eq!(back, chunk);
            assert_eq!(back.variant, variant);
        }
    }

    #[test]
    fn standard_layout_is_byte_exact() {
        let buf = encode(&sample(Variant::Standard), true);
        assert_eq!(buf.len(), 20 + 3 * 16 + 17);
        assert_eq!(&buf[0..4], b"CHNK");
        assert_eq!(&buf[4..8], &[0, 0, 0, 0xFF]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 3]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 10]);
        assert_eq!(&buf[16..20], &[0, 1, 0, 2]);
        // First record: size, size, flags, offset.
        assert_eq!(&buf[20..36], &[0, 0, 0, 10, 0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 68]);
        // Third record points past the 10-byte first block.
        assert_eq!(&buf[52..68], &[0, 0, 0, 7, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 78]);
        assert_eq!(&buf[68..78], &[0xAB; 10]);
        assert_eq!(&buf[78..], b"texture");
    }

    #[test]
    fn alternate_layout_is_byte_exact() {
        let mut chunk = Chunk::new(Variant::Alternate);
        chunk.push(Block::precompressed(vec![1, 2, 3]));
        let buf = encode(&chunk, true);
        assert_eq!(&buf[4..8], &[0, 0, 1, 0xFF]);
        assert_eq!(&buf[8..12], &[1, 0, 0, 0]);
        assert_eq!(&buf[12..16], &[3, 0, 0, 0]);
        assert_eq!(&buf[16..20], &[1, 0, 5, 0]);
        // size, size, offset, flags.
        assert_eq!(&buf[20..36], &[3, 0, 0, 0, 3, 0, 0, 0, 36, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&buf[36..], &[1, 2, 3]);
    }

    #[test]
    fn headerless_write_is_just_payloads() {
        for variant in [Variant::Standard, Variant::Alternate] {
            let mut chunk = sample(variant);
            chunk.push(Block::precompressed(vec![9, 9]));
            let mut expected = vec![0xAB; 10];
            expected.extend_from_slice(b"texture");
            expected.extend_from_slice(&[9, 9]);
            assert_eq!(encode(&chunk, false), expected);
        }
    }

    #[test]
    fn compressed_blocks_are_inflated_on_read() {
        let original = b"DXT1 DXT1 DXT1 DXT1 DXT1 DXT1 DXT1".repeat(20);
        for variant in [Variant::Standard, Variant::Alternate] {
            let mut chunk = Chunk::new(variant);
            chunk.push(Block::compress(&original, 9).unwrap());
            chunk.push(Block::raw(b"plain".to_vec()));

            let (info, back) = Chunk::inspect(Cursor::new(encode(&chunk, true))).unwrap();
            assert!(info.records[0].is_compressed());
            assert!(!info.records[1].is_compressed());
            assert_eq!(info.blocks[0].size, original.len());
            assert_eq!(info.blocks[0].stored_size as usize, chunk.entries[0].len());
            assert_eq!(back.entries[0], Block::raw(original.clone()));
            assert_eq!(back.entries[1], Block::raw(b"plain".to_vec()));
        }
    }

    #[test]
    fn empty_flagged_block_is_not_inflated() {
        let mut chunk = Chunk::new(Variant::Standard);
        chunk.push(Block::precompressed(Vec::new()));
        let back = Chunk::read(Cursor::new(encode(&chunk, true))).unwrap();
        assert_eq!(back.entries, vec![Block::raw(Vec::new())]);
    }

    #[test]
    fn wrong_magic_reads_as_empty() {
        let mut buf = encode(&sample(Variant::Standard), true);
        buf[..4].copy_from_slice(b"KNHC");
        let chunk = Chunk::read(Cursor::new(buf.clone())).unwrap();
        assert!(chunk.is_empty());
        assert_eq!(chunk.variant, Variant::Standard);

        assert!(matches!(
            Chunk::read_strict(Cursor::new(buf)),
            Err(ChunkError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn truncated_table_is_an_error() {
        let buf = encode(&sample(Variant::Standard), true);
        match Chunk::read(Cursor::new(&buf[..20 + 16 + 5])) {
            Err(ChunkError::TruncatedStream { region, .. }) => assert_eq!(region, Region::Table(1)),
            other => panic!("expected TruncatedStream, got {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let buf = encode(&sample(Variant::Alternate), true);
        match Chunk::read(Cursor::new(&buf[..buf.len() - 1])) {
            Err(ChunkError::TruncatedStream { region, .. }) => assert_eq!(region, Region::Payload(2)),
            other => panic!("expected TruncatedStream, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let mut chunk = Chunk::new(Variant::Standard);
        chunk.push(Block::raw(b"ok".to_vec()));
        chunk.push(Block::precompressed(b"not a zlib stream".to_vec()));
        match Chunk::read(Cursor::new(encode(&chunk, true))) {
            Err(ChunkError::PayloadCorrupt { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected PayloadCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn truncated_zlib_payload_is_corrupt() {
        let packed = deflate_block(&b"mip chain ".repeat(64), CompressionType::Zlib, 6).unwrap();
        let mut damaged_trailer = packed.clone();
        let last = damaged_trailer.len() - 1;
        damaged_trailer[last] ^= 0xFF;

        let cuts = [packed.len() - 1, packed.len() - 4, packed.len() / 2, 2];
        let payloads = cuts.iter().map(|&n| packed[..n].to_vec()).chain([damaged_trailer]);
        for payload in payloads {
            let mut chunk = Chunk::new(Variant::Alternate);
            chunk.push(Block::precompressed(payload));
            match Chunk::read(Cursor::new(encode(&chunk, true))) {
                Err(ChunkError::PayloadCorrupt { index: 0, source: CodecError::Decompression(_) }) => {}
                other => panic!("expected PayloadCorrupt, got {other:?}"),
            }
        }
    }

    #[test]
    fn negative_count_is_rejected() {
        let mut buf = encode(&Chunk::new(Variant::Standard), true);
        buf[8..12].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(
            Chunk::read(Cursor::new(buf)),
            Err(ChunkError::InvalidTable { value: -1, .. })
        ));
    }

    #[test]
    fn negative_size_is_rejected() {
        let mut buf = encode(&sample(Variant::Standard), true);
        buf[20..24].copy_from_slice(&(-5i32).to_be_bytes());
        assert!(matches!(
            Chunk::read(Cursor::new(buf)),
            Err(ChunkError::InvalidTable { value: -5, .. })
        ));
    }

    #[test]
    fn offsets_and_duplicate_size_are_not_trusted() {
        let mut buf = encode(&sample(Variant::Standard), true);
        // Scribble over record 0's duplicate size and offset.
        buf[24..28].copy_from_slice(&999i32.to_be_bytes());
        buf[32..36].copy_from_slice(&12345i32.to_be_bytes());
        assert_eq!(Chunk::read(Cursor::new(buf)).unwrap(), sample(Variant::Standard));
    }

    #[test]
    fn empty_container() {
        for variant in [Variant::Standard, Variant::Alternate] {
            let buf = encode(&Chunk::new(variant), true);
            assert_eq!(buf.len(), 20);
            assert_eq!(&buf[12..16], &[0, 0, 0, 0]);
            let back = Chunk::read(Cursor::new(buf)).unwrap();
            assert!(back.is_empty());
            assert_eq!(back.variant, variant);
        }
    }

    #[test]
    fn empty_input_is_truncated() {
        assert!(matches!(
            Chunk::read(Cursor::new(Vec::new())),
            Err(ChunkError::TruncatedStream { region: Region::Header, .. })
        ));
    }

    #[test]
    fn pack_with_compression() {
        let opts = PackOptions { variant: Variant::Alternate, compression: Some(6), ..Default::default() };
        let chunk = Chunk::pack([b"aaaaaaaaaaaaaaaa".to_vec(), Vec::new()], &opts).unwrap();
        assert_eq!(chunk.variant, Variant::Alternate);
        assert!(chunk.entries.iter().all(|b| b.compressed));
        assert_eq!(
            chunk.entries[0].data,
            deflate_block(b"aaaaaaaaaaaaaaaa", CompressionType::Zlib, 6).unwrap()
        );
        let table = chunk.table().unwrap();
        assert!(table.iter().all(|r| r.flags == COMPRESSED_FLAG));
    }

    #[test]
    fn inspect_reports_header_fields() {
        let (info, _) = Chunk::inspect(Cursor::new(encode(&sample(Variant::Alternate), true))).unwrap();
        assert_eq!(info.header.variant, Variant::Alternate);
        assert_eq!(info.header.flags, 0x1FF);
        assert_eq!(info.header.max_block_size, 10);
        assert_eq!(info.header.secondary_tag, 5);
        assert_eq!(info.blocks[2].preview, hex::encode(b"texture"));
        assert_eq!(info.blocks[2].crc32, crc32fast::hash(b"texture"));
        assert_eq!(info.blocks[1].offset, info.blocks[2].offset);
    }
}
