//! Codec error taxonomy.
//!
//! Every failure mode of the on-disk format gets its own variant so callers
//! can distinguish "refuse to read" conditions (bad magic, wrong record
//! size) from truncation, which is frequently recoverable: the generator
//! may crash mid-session and the chunks it already flushed must stay
//! readable.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    /// A structural unit (file header, chunk header, chunk payload) ended
    /// before its fixed size was read. Recoverable as clean EOF during
    /// chunk iteration when `ReadOptions::recover_on_truncation` is set.
    #[error("truncated {what} at byte offset {offset}")]
    Truncated { what: &'static str, offset: u64 },

    /// The first 8 bytes are not `"QRSDPLOG"`. Fatal.
    #[error("bad magic {found:?} (expected \"QRSDPLOG\"): not a .qrsdp event log")]
    BadMagic { found: [u8; 8] },

    /// The header declares a record size this build cannot interpret.
    /// Refusing is mandatory: guessing a stride would misread every field.
    #[error("unsupported record size {0} (this build reads 26-byte records)")]
    UnsupportedRecordSize(u32),

    /// Format major version mismatch. Compatibility below v1 is not kept.
    #[error("unsupported format version {major}.{minor} (this build reads v1.x)")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// LZ4 failed, or produced a byte count other than the chunk header's
    /// `uncompressed_size`. Fatal for the file.
    #[error("chunk decompression failed: {0}")]
    Decompress(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
