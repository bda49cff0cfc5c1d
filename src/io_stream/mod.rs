//! Endian-switchable byte streams.
//!
//! A CHNK container starts big-endian and may flip to little-endian once the
//! flag word has been read, so the byte order here is a runtime setting
//! rather than a type parameter.  Both wrappers only move forward and count
//! the bytes they have moved, so any `Read`/`Write` works, seekable or not.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

/// Byte order used for multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct EndianReader<R: Read> {
    inner:    R,
    endian:   Endian,
    position: u64,
}

impl<R: Read> EndianReader<R> {
    pub fn new(inner: R, endian: Endian) -> Self {
        Self { inner, endian, position: 0 }
    }

    pub fn endian(&self) -> Endian { self.endian }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Bytes consumed since construction.
    pub fn position(&self) -> u64 { self.position }

    pub fn into_inner(self) -> R { self.inner }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let v = match self.endian {
            Endian::Big    => self.inner.read_u32::<BigEndian>()?,
            Endian::Little => self.inner.read_u32::<LittleEndian>()?,
        };
        self.position += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let v = match self.endian {
            Endian::Big    => self.inner.read_u16::<BigEndian>()?,
            Endian::Little => self.inner.read_u16::<LittleEndian>()?,
        };
        self.position += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> io::Result<i16> {
        self.read_u16().map(|v| v as i16)
    }

    /// Read four raw bytes, ignoring the current byte order.
    pub fn read_tag(&mut self) -> io::Result<[u8; 4]> {
        let mut tag = [0u8; 4];
        self.inner.read_exact(&mut tag)?;
        self.position += 4;
        Ok(tag)
    }

    /// Read exactly `len` bytes.
    ///
    /// The buffer grows with the data actually received, so a bogus length
    /// from a corrupt table cannot force a huge up-front allocation.
    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        let got = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.position += got as u64;
        if got < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, stream ended after {got}"),
            ));
        }
        Ok(buf)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct EndianWriter<W: Write> {
    inner:    W,
    endian:   Endian,
    position: u64,
}

impl<W: Write> EndianWriter<W> {
    pub fn new(inner: W, endian: Endian) -> Self {
        Self { inner, endian, position: 0 }
    }

    pub fn endian(&self) -> Endian { self.endian }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Bytes written since construction.
    pub fn position(&self) -> u64 { self.position }

    pub fn into_inner(self) -> W { self.inner }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        match self.endian {
            Endian::Big    => self.inner.write_u32::<BigEndian>(v)?,
            Endian::Little => self.inner.write_u32::<LittleEndian>(v)?,
        }
        self.position += 4;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.write_u32(v as u32)
    }

    pub fn write_u16(&mut self, v: u16) -> io::Result<()> {
        match self.endian {
            Endian::Big    => self.inner.write_u16::<BigEndian>(v)?,
            Endian::Little => self.inner.write_u16::<LittleEndian>(v)?,
        }
        self.position += 2;
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> io::Result<()> {
        self.write_u16(v as u16)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
