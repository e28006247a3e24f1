//! Chunk headers and the LZ4 payload transform.
//!
//! # On-disk layout (32 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   uncompressed_size  = record_count * 26 (LE u32)
//!    4      4   compressed_size    LZ4 payload bytes; 0 = end sentinel (LE u32)
//!    8      4   record_count       (LE u32)
//!   12      4   flags              (LE u32)
//!   16      8   first_ts           ts_ns of the first record (LE u64)
//!   24      8   last_ts            ts_ns of the last record (LE u64)
//! ```
//!
//! Payloads are raw LZ4 block data (not the frame format): the block
//! carries no size of its own, so decompression is single-shot with the
//! header's `uncompressed_size` supplied externally. A decompressed byte
//! count other than `uncompressed_size` is corruption, not a warning.
//!
//! A header with `compressed_size == 0` is the clean end-of-stream
//! sentinel, written by the generator so a reader can tell "session closed
//! here" from "crash mid-write".

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};

use crate::error::LogError;
use crate::record::{pack_records, unpack_records, EventRecord, RECORD_SIZE};

pub const CHUNK_HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub uncompressed_size: u32,
    pub compressed_size:   u32,
    pub record_count:      u32,
    pub flags:             u32,
    pub first_ts:          u64,
    pub last_ts:           u64,
}

impl ChunkHeader {
    /// The all-zero end-of-stream sentinel.
    pub fn sentinel() -> Self {
        Self {
            uncompressed_size: 0,
            compressed_size:   0,
            record_count:      0,
            flags:             0,
            first_ts:          0,
            last_ts:           0,
        }
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.compressed_size == 0
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.record_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..24].copy_from_slice(&self.first_ts.to_le_bytes());
        buf[24..32].copy_from_slice(&self.last_ts.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; CHUNK_HEADER_SIZE]) -> Self {
        let mut c = Cursor::new(&buf[..]);
        // Reads from a fixed in-memory buffer cannot fail.
        Self {
            uncompressed_size: c.read_u32::<LittleEndian>().unwrap(),
            compressed_size:   c.read_u32::<LittleEndian>().unwrap(),
            record_count:      c.read_u32::<LittleEndian>().unwrap(),
            flags:             c.read_u32::<LittleEndian>().unwrap(),
            first_ts:          c.read_u64::<LittleEndian>().unwrap(),
            last_ts:           c.read_u64::<LittleEndian>().unwrap(),
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE);
        buf.write_u32::<LittleEndian>(self.uncompressed_size)?;
        buf.write_u32::<LittleEndian>(self.compressed_size)?;
        buf.write_u32::<LittleEndian>(self.record_count)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u64::<LittleEndian>(self.first_ts)?;
        buf.write_u64::<LittleEndian>(self.last_ts)?;
        w.write_all(&buf)
    }
}

/// One decoded chunk: its header plus an owned copy of the records, so
/// consumers may hold on to them beyond the next iteration step.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub header:  ChunkHeader,
    pub records: Vec<EventRecord>,
}

// ── encode / decode ──────────────────────────────────────────────────────────

/// Pack and LZ4-compress a run of records, returning the populated header
/// and the on-disk payload. `first_ts`/`last_ts` are stamped from the
/// records themselves, which the writer keeps non-decreasing.
pub fn encode_chunk(records: &[EventRecord]) -> (ChunkHeader, Vec<u8>) {
    debug_assert!(!records.is_empty(), "data chunks are never empty; use the sentinel");
    debug_assert!(records.windows(2).all(|w| w[0].ts_ns <= w[1].ts_ns));

    let packed  = pack_records(records);
    let payload = lz4_flex::block::compress(&packed);

    let header = ChunkHeader {
        uncompressed_size: packed.len() as u32,
        compressed_size:   payload.len() as u32,
        record_count:      records.len() as u32,
        flags:             0,
        first_ts:          records.first().map(|r| r.ts_ns).unwrap_or(0),
        last_ts:           records.last().map(|r| r.ts_ns).unwrap_or(0),
    };
    (header, payload)
}

/// Decompress and reinterpret a chunk payload.
///
/// The header's `uncompressed_size` must equal `record_count * 26` and the
/// LZ4 output must land on exactly that many bytes; both failures are
/// [`LogError::Decompress`].
pub fn decode_chunk(header: &ChunkHeader, payload: &[u8]) -> Result<Vec<EventRecord>, LogError> {
    let expected = header.uncompressed_size as usize;
    if expected != header.record_count as usize * RECORD_SIZE {
        return Err(LogError::Decompress(format!(
            "chunk declares {} uncompressed bytes for {} records (record stride is {})",
            expected, header.record_count, RECORD_SIZE,
        )));
    }
    if header.record_count == 0 {
        return Ok(Vec::new());
    }

    let mut out = vec![0u8; expected];
    let written = lz4_flex::block::decompress_into(payload, &mut out)
        .map_err(|e| LogError::Decompress(e.to_string()))?;
    if written != expected {
        return Err(LogError::Decompress(format!(
            "LZ4 produced {written} bytes, chunk header declares {expected}"
        )));
    }

    unpack_records(&out, header.record_count as usize)
}
