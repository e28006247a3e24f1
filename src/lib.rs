//! # qrsdp — .qrsdp event-log format and book replay, reference implementation
//!
//! Format guarantees (frozen in v1):
//! - All numeric fields are little-endian; big-endian hosts byte-swap
//! - Magic `"QRSDPLOG"`, a fixed 64-byte file header, then repeated
//!   {32-byte chunk header, raw LZ4 block payload}
//! - Records are exactly 26 bytes; readers refuse any other declared size
//! - Chunk payloads decompress to exactly `uncompressed_size` bytes or the
//!   file is rejected; there is no partial chunk decode
//! - A zero-sized chunk header is the clean end-of-stream sentinel; a
//!   truncated tail after the last whole chunk is recoverable, so a crash
//!   mid-write never poisons the chunks already flushed
//! - Replay is deterministic: the fixed-slot book reproduces the
//!   generator's shift semantics exactly, so generate, log, replay yields
//!   the same top-of-book trajectory bit for bit
//!
//! The manifest (`manifest.json`) indexing a run directory's sessions is
//! plain JSON in one of two schemas (single- and multi-security); see
//! [`manifest`].

pub mod error;
pub mod record;
pub mod header;
pub mod chunk;
pub mod stream;
pub mod manifest;
pub mod book;
pub mod replay;

// Flat re-exports for the most common types.
pub use error::LogError;
pub use record::{EventRecord, EventType, Side, RECORD_SIZE};
pub use header::{FileHeader, FILE_HEADER_SIZE, MAGIC};
pub use chunk::{Chunk, ChunkHeader, CHUNK_HEADER_SIZE};
pub use stream::{
    iter_chunks, iter_chunks_with, read_day, read_header, write_session, ChunkIter,
    ReadOptions, SessionWriter,
};
pub use manifest::{iter_days, iter_securities, Manifest, ManifestError, Session, SessionRecords};
pub use book::{BookError, Level, MultiLevelBook};
pub use replay::{replay, replay_file, ReplayError, ReplaySeries};
#[cfg(feature = "parallel")]
pub use replay::{replay_run_parallel, ReplayedSession};
