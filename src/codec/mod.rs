//! Block compression.
//!
//! CHNK containers only ever carry zlib streams (RFC 1950: 2-byte header,
//! deflate body, Adler-32 trailer).  The decoder inflates flagged blocks
//! itself.  The encoder never deflates on its own, so callers that want
//! compressed blocks run [`deflate_block`] first and insert the result with
//! the compressed flag set.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Serialize;
use thiserror::Error;

/// Default zlib level for caller-side compression.
pub const DEFAULT_ZLIB_LEVEL: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompressionType {
    Zlib,
}

impl CompressionType {
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::Zlib => "zlib",
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec {
    fn compression_type(&self) -> CompressionType;
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn compression_type(&self) -> CompressionType { CompressionType::Zlib }

    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_codec(ty: CompressionType) -> Box<dyn Codec> {
    match ty {
        CompressionType::Zlib => Box::new(ZlibCodec),
    }
}

/// Inflate a stored block.
pub fn inflate_block(data: &[u8], ty: CompressionType) -> Result<Vec<u8>, CodecError> {
    get_codec(ty).decompress(data)
}

/// Deflate a payload so it can be inserted as an already-compressed block.
pub fn deflate_block(data: &[u8], ty: CompressionType, level: u32) -> Result<Vec<u8>, CodecError> {
    get_codec(ty).compress(data, level)
}
