//! File header, the format anchor at offset 0.
//!
//! # On-disk layout (64 bytes, all numeric fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   magic                 = "QRSDPLOG" (8 ASCII bytes)
//!    8      2   version_major         = 1 (LE u16)
//!   10      2   version_minor         (LE u16)
//!   12      4   record_size           must equal 26 (LE u32)
//!   16      8   seed                  generator RNG seed (LE u64)
//!   24      4   p0_ticks              session reference price (LE i32)
//!   28      4   tick_size             (LE u32)
//!   32      4   session_seconds       (LE u32)
//!   36      4   levels_per_side       book depth per side (LE u32)
//!   40      4   initial_spread_ticks  (LE u32)
//!   44      4   initial_depth         lots per level at open (LE u32)
//!   48      4   chunk_capacity        records per chunk (LE u32)
//!   52      4   header_flags          (LE u32)
//!   56      8   market_open_ns in >= v1.1; reserved zero in v1.0 (LE u64)
//! ```
//!
//! # Version policy
//! `version_major` must be 1; anything else is refused. The trailing u64 is
//! interpreted strictly by `version_minor`: v1.0 files predate the market
//! open stamp and expose it as reserved. Readers key off the minor version
//! and never assume.
//!
//! # Record size
//! `record_size` must equal 26. A reader that sees any other value refuses
//! the file rather than misinterpret every record after offset 64.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::error::LogError;
use crate::record::RECORD_SIZE;

pub const MAGIC:            &[u8; 8] = b"QRSDPLOG";
pub const FILE_HEADER_SIZE: usize    = 64;
pub const VERSION_MAJOR:    u16      = 1;
/// Current minor version: the trailing header field carries `market_open_ns`.
pub const VERSION_MINOR:    u16      = 1;

/// Default records per chunk; range is clamped to `[1, 2^24]` on write.
pub const DEFAULT_CHUNK_CAPACITY: u32 = 4096;
pub const MAX_CHUNK_CAPACITY:     u32 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version_major:        u16,
    pub version_minor:        u16,
    pub seed:                 u64,
    pub p0_ticks:             i32,
    pub tick_size:            u32,
    pub session_seconds:      u32,
    pub levels_per_side:      u32,
    pub initial_spread_ticks: u32,
    pub initial_depth:        u32,
    pub chunk_capacity:       u32,
    pub header_flags:         u32,
    /// Wall-clock nanosecond offset of the market open (>= v1.1).
    /// Reserved, written as zero, in v1.0 files.
    pub market_open_ns:       u64,
}

impl FileHeader {
    /// A current-version header with the generator's default session
    /// geometry. Callers overwrite fields as needed before writing.
    pub fn new() -> Self {
        Self {
            version_major:        VERSION_MAJOR,
            version_minor:        VERSION_MINOR,
            seed:                 0,
            p0_ticks:             10_000,
            tick_size:            1,
            session_seconds:      23_400,
            levels_per_side:      5,
            initial_spread_ticks: 2,
            initial_depth:        5,
            chunk_capacity:       DEFAULT_CHUNK_CAPACITY,
            header_flags:         0,
            market_open_ns:       0,
        }
    }

    /// The trailing field under its v1.1 meaning, `None` for v1.0 files
    /// where those bytes are reserved.
    pub fn market_open(&self) -> Option<u64> {
        if self.version_minor >= 1 {
            Some(self.market_open_ns)
        } else {
            None
        }
    }

    /// Write the 64-byte header.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(FILE_HEADER_SIZE);
        buf.extend_from_slice(MAGIC);
        buf.write_u16::<LittleEndian>(self.version_major)?;
        buf.write_u16::<LittleEndian>(self.version_minor)?;
        buf.write_u32::<LittleEndian>(RECORD_SIZE as u32)?;
        buf.write_u64::<LittleEndian>(self.seed)?;
        buf.write_i32::<LittleEndian>(self.p0_ticks)?;
        buf.write_u32::<LittleEndian>(self.tick_size)?;
        buf.write_u32::<LittleEndian>(self.session_seconds)?;
        buf.write_u32::<LittleEndian>(self.levels_per_side)?;
        buf.write_u32::<LittleEndian>(self.initial_spread_ticks)?;
        buf.write_u32::<LittleEndian>(self.initial_depth)?;
        buf.write_u32::<LittleEndian>(self.chunk_capacity)?;
        buf.write_u32::<LittleEndian>(self.header_flags)?;
        // Reserved in v1.0; market_open_ns from v1.1 on.
        let tail = if self.version_minor >= 1 { self.market_open_ns } else { 0 };
        buf.write_u64::<LittleEndian>(tail)?;

        assert_eq!(buf.len(), FILE_HEADER_SIZE, "file header must be exactly 64 bytes");
        w.write_all(&buf)
    }

    /// Read and validate a 64-byte header: magic, then record size, then
    /// major version. Fewer than 64 bytes is `Truncated`.
    pub fn read<R: Read>(mut r: R) -> Result<Self, LogError> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        r.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                LogError::Truncated { what: "file header", offset: 0 }
            } else {
                LogError::Io(e)
            }
        })?;
        Self::from_bytes(&buf)
    }

    /// Parse a header already in memory; same validation as [`Self::read`].
    pub fn from_bytes(buf: &[u8; FILE_HEADER_SIZE]) -> Result<Self, LogError> {
        if &buf[0..8] != MAGIC {
            return Err(LogError::BadMagic { found: buf[0..8].try_into().unwrap() });
        }

        let mut c = Cursor::new(&buf[8..]);
        let version_major = c.read_u16::<LittleEndian>()?;
        let version_minor = c.read_u16::<LittleEndian>()?;
        let record_size   = c.read_u32::<LittleEndian>()?;

        if record_size != RECORD_SIZE as u32 {
            return Err(LogError::UnsupportedRecordSize(record_size));
        }
        if version_major != VERSION_MAJOR {
            return Err(LogError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        Ok(Self {
            version_major,
            version_minor,
            seed:                 c.read_u64::<LittleEndian>()?,
            p0_ticks:             c.read_i32::<LittleEndian>()?,
            tick_size:            c.read_u32::<LittleEndian>()?,
            session_seconds:      c.read_u32::<LittleEndian>()?,
            levels_per_side:      c.read_u32::<LittleEndian>()?,
            initial_spread_ticks: c.read_u32::<LittleEndian>()?,
            initial_depth:        c.read_u32::<LittleEndian>()?,
            chunk_capacity:       c.read_u32::<LittleEndian>()?,
            header_flags:         c.read_u32::<LittleEndian>()?,
            market_open_ns:       c.read_u64::<LittleEndian>()?,
        })
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut h = FileHeader::new();
        h.seed = 0xDEAD_BEEF;
        h.p0_ticks = -250;
        h.market_open_ns = 34_200_000_000_000;

        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), FILE_HEADER_SIZE);

        let back = FileHeader::read(&buf[..]).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn short_header_is_truncated() {
        let err = FileHeader::read(&[0u8; 63][..]).unwrap_err();
        assert!(matches!(err, LogError::Truncated { what: "file header", .. }));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut buf = Vec::new();
        FileHeader::new().write(&mut buf).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            FileHeader::read(&buf[..]).unwrap_err(),
            LogError::BadMagic { .. }
        ));
    }

    #[test]
    fn wrong_record_size_is_refused() {
        let mut buf = Vec::new();
        FileHeader::new().write(&mut buf).unwrap();
        buf[12..16].copy_from_slice(&27u32.to_le_bytes());
        assert!(matches!(
            FileHeader::read(&buf[..]).unwrap_err(),
            LogError::UnsupportedRecordSize(27)
        ));
    }

    #[test]
    fn wrong_major_version_is_refused() {
        let mut buf = Vec::new();
        FileHeader::new().write(&mut buf).unwrap();
        buf[8..10].copy_from_slice(&2u16.to_le_bytes());
        assert!(matches!(
            FileHeader::read(&buf[..]).unwrap_err(),
            LogError::UnsupportedVersion { major: 2, .. }
        ));
    }

    #[test]
    fn trailing_field_keys_off_minor_version() {
        let mut h = FileHeader::new();
        h.market_open_ns = 99;
        assert_eq!(h.market_open(), Some(99));

        // A v1.0 writer stamps zero and readers expose nothing.
        h.version_minor = 0;
        assert_eq!(h.market_open(), None);

        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(&buf[56..64], &[0u8; 8]);
    }
}
