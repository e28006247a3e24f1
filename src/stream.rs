//! Streaming session I/O: lazy chunk iteration and the session writer.
//!
//! # Reader
//! [`ChunkIter`] pulls one chunk at a time: read a 32-byte chunk header,
//! read `compressed_size` payload bytes, decompress, yield the records as
//! an owned [`Chunk`]. At most one decompressed chunk is resident, so
//! memory stays bounded by `chunk_capacity * 26` plus the compressed
//! scratch regardless of file size. The iterator owns the file handle and
//! releases it on termination, whether that is the natural end, an error,
//! or an early drop.
//!
//! Truncated trailing data is a recovery case, not an error, when
//! [`ReadOptions::recover_on_truncation`] is set (the default) and at
//! least one full chunk precedes the cut: a crash during simulation must
//! not poison the chunks already flushed. A truncation before the first
//! full chunk completes means nothing salvageable exists and is always
//! [`LogError::Truncated`]; so is any truncation when the option is
//! false.
//!
//! # Writer
//! [`SessionWriter`] accepts records one at a time, groups them into
//! chunks of at most `chunk_capacity`, stamps each chunk's timestamp range
//! from its records, and appends the zero-sized sentinel chunk header on
//! [`SessionWriter::finish`] so readers can tell a closed session from a
//! crashed one.

use log::debug;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::chunk::{decode_chunk, encode_chunk, Chunk, ChunkHeader, CHUNK_HEADER_SIZE};
use crate::error::LogError;
use crate::header::{FileHeader, FILE_HEADER_SIZE, MAX_CHUNK_CAPACITY};
use crate::record::EventRecord;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Treat a short trailing chunk (header or payload) as clean EOF.
    pub recover_on_truncation: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { recover_on_truncation: true }
    }
}

// ── Header convenience ───────────────────────────────────────────────────────

/// Read and validate the 64-byte file header of a session file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<FileHeader, LogError> {
    let file = File::open(path)?;
    FileHeader::read(BufReader::new(file))
}

// ── Chunk iteration ──────────────────────────────────────────────────────────

/// Lazy, finite, non-restartable chunk sequence over any byte stream.
///
/// Construction reads and validates the file header eagerly. A stream with
/// fewer than 64 bytes total is treated as an empty session (nothing was
/// ever flushed) under the recovery policy and refused as `Truncated` in
/// strict mode; a present header with a wrong magic or record size fails
/// immediately either way.
pub struct ChunkIter<R: Read> {
    /// `None` once iteration has terminated; dropping it closes the handle.
    reader:  Option<R>,
    header:  Option<FileHeader>,
    opts:    ReadOptions,
    /// Byte offset of the next unread structural unit, for diagnostics.
    offset:  u64,
    /// At least one complete chunk has been read. Truncation before this
    /// point is never forgiven: there is nothing salvageable in front of
    /// it, so recovery would only hide a broken file.
    saw_full_chunk: bool,
    scratch: Vec<u8>,
}

/// Read until `buf` is full or EOF; returns bytes read. Plain `read_exact`
/// cannot tell "no bytes at all" from "some bytes then EOF", and the
/// recovery policy treats those differently.
fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

impl<R: Read> ChunkIter<R> {
    pub fn new(reader: R, opts: ReadOptions) -> Result<Self, LogError> {
        let mut reader = reader;
        let mut buf = [0u8; FILE_HEADER_SIZE];
        let n = read_fully(&mut reader, &mut buf)?;
        if n < FILE_HEADER_SIZE {
            if !opts.recover_on_truncation {
                return Err(LogError::Truncated { what: "file header", offset: n as u64 });
            }
            // Nothing was ever flushed past (or including) the header.
            return Ok(Self {
                reader:  None,
                header:  None,
                opts,
                offset:  n as u64,
                saw_full_chunk: false,
                scratch: Vec::new(),
            });
        }
        let header = FileHeader::from_bytes(&buf)?;
        Ok(Self {
            reader:  Some(reader),
            header:  Some(header),
            opts,
            offset:  FILE_HEADER_SIZE as u64,
            saw_full_chunk: false,
            scratch: Vec::new(),
        })
    }

    /// The session header, if the stream held one at all.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Terminate iteration and release the underlying handle.
    fn finish(&mut self) {
        self.reader = None;
        self.scratch = Vec::new();
    }

    fn next_chunk(&mut self) -> Option<Result<Chunk, LogError>> {
        let reader = self.reader.as_mut()?;

        // Chunk header: clean EOF at a boundary ends the stream; a partial
        // header is truncation.
        let mut hdr_buf = [0u8; CHUNK_HEADER_SIZE];
        let n = match read_fully(reader, &mut hdr_buf) {
            Ok(n) => n,
            Err(e) => {
                self.finish();
                return Some(Err(e.into()));
            }
        };
        if n == 0 {
            self.finish();
            return None;
        }
        if n < CHUNK_HEADER_SIZE {
            let offset = self.offset;
            self.finish();
            if self.opts.recover_on_truncation && self.saw_full_chunk {
                debug!("partial chunk header at byte {offset}: treating as end of stream");
                return None;
            }
            return Some(Err(LogError::Truncated { what: "chunk header", offset }));
        }

        let header = ChunkHeader::from_bytes(&hdr_buf);
        self.offset += CHUNK_HEADER_SIZE as u64;
        if header.is_sentinel() {
            self.finish();
            return None;
        }

        // Payload.
        self.scratch.resize(header.compressed_size as usize, 0);
        let got = match read_fully(reader, &mut self.scratch) {
            Ok(got) => got,
            Err(e) => {
                self.finish();
                return Some(Err(e.into()));
            }
        };
        if got < header.compressed_size as usize {
            let offset = self.offset;
            self.finish();
            if self.opts.recover_on_truncation && self.saw_full_chunk {
                debug!(
                    "short chunk payload at byte {offset} ({got} of {} bytes): \
                     treating as end of stream",
                    header.compressed_size
                );
                return None;
            }
            return Some(Err(LogError::Truncated { what: "chunk payload", offset }));
        }
        self.offset += header.compressed_size as u64;

        match decode_chunk(&header, &self.scratch) {
            Ok(records) => {
                self.saw_full_chunk = true;
                Some(Ok(Chunk { header, records }))
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> Iterator for ChunkIter<R> {
    type Item = Result<Chunk, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

/// Open a session file for lazy chunk iteration with default options.
pub fn iter_chunks<P: AsRef<Path>>(path: P) -> Result<ChunkIter<BufReader<File>>, LogError> {
    iter_chunks_with(path, ReadOptions::default())
}

pub fn iter_chunks_with<P: AsRef<Path>>(
    path: P,
    opts: ReadOptions,
) -> Result<ChunkIter<BufReader<File>>, LogError> {
    let file = File::open(path)?;
    ChunkIter::new(BufReader::new(file), opts)
}

/// Read every record of a session file into one contiguous vec.
///
/// Empty and missing-body files give an empty vec. Unbounded memory by
/// design; use [`iter_chunks`] to stay chunk-bounded.
pub fn read_day<P: AsRef<Path>>(path: P) -> Result<Vec<EventRecord>, LogError> {
    let mut out = Vec::new();
    for chunk in iter_chunks(path)? {
        out.extend(chunk?.records);
    }
    Ok(out)
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct SessionWriter<W: Write> {
    writer:   W,
    capacity: usize,
    pending:  Vec<EventRecord>,
    finished: bool,
}

impl<W: Write> SessionWriter<W> {
    /// Write the file header and prepare for appends. The header's
    /// `chunk_capacity` is clamped into `[1, 2^24]` and the clamped value
    /// is what lands on disk.
    pub fn new(mut writer: W, header: &FileHeader) -> Result<Self, LogError> {
        let mut header = *header;
        header.chunk_capacity = header.chunk_capacity.clamp(1, MAX_CHUNK_CAPACITY);
        header.write(&mut writer)?;
        Ok(Self {
            writer,
            capacity: header.chunk_capacity as usize,
            pending:  Vec::with_capacity(header.chunk_capacity as usize),
            finished: false,
        })
    }

    /// Append one record; flushes a full chunk transparently.
    /// Record timestamps must be non-decreasing in append order.
    pub fn append(&mut self, record: EventRecord) -> Result<(), LogError> {
        debug_assert!(!self.finished, "append after finish");
        debug_assert!(
            self.pending.last().map_or(true, |p| p.ts_ns <= record.ts_ns),
            "record timestamps must be non-decreasing"
        );
        self.pending.push(record);
        if self.pending.len() >= self.capacity {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<(), LogError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let (header, payload) = encode_chunk(&self.pending);
        header.write(&mut self.writer)?;
        self.writer.write_all(&payload)?;
        self.pending.clear();
        Ok(())
    }

    /// Flush the partial last chunk, append the end-of-stream sentinel,
    /// and flush the underlying writer. Must be called exactly once.
    pub fn finish(&mut self) -> Result<(), LogError> {
        self.flush_chunk()?;
        ChunkHeader::sentinel().write(&mut self.writer)?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

/// Write a complete session file: header, chunks of at most
/// `header.chunk_capacity` records, end sentinel.
pub fn write_session<P: AsRef<Path>>(
    path: P,
    header: &FileHeader,
    events: &[EventRecord],
) -> Result<(), LogError> {
    let file = File::create(path)?;
    let mut writer = SessionWriter::new(BufWriter::new(file), header)?;
    for ev in events {
        writer.append(*ev)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventType;

    fn synthetic_events(n: usize) -> Vec<EventRecord> {
        // Cycle through all six kinds with non-decreasing timestamps.
        let kinds = [
            EventType::AddBid,
            EventType::AddAsk,
            EventType::CancelBid,
            EventType::CancelAsk,
            EventType::ExecuteBuy,
            EventType::ExecuteSell,
        ];
        (0..n)
            .map(|i| {
                EventRecord::new(
                    (i as u64) * 1_000,
                    kinds[i % kinds.len()],
                    10_000 + (i as i32 % 7) - 3,
                    1 + (i as u32 % 5),
                    i as u64,
                )
            })
            .collect()
    }

    fn session_bytes(header: &FileHeader, events: &[EventRecord]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut w = SessionWriter::new(&mut buf, header).unwrap();
        for ev in events {
            w.append(*ev).unwrap();
        }
        w.finish().unwrap();
        buf
    }

    fn collect_chunks(bytes: &[u8], opts: ReadOptions) -> Result<Vec<Chunk>, LogError> {
        ChunkIter::new(bytes, opts)?.collect()
    }

    #[test]
    fn ten_events_capacity_three_makes_four_chunks() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 3;
        let events = synthetic_events(10);
        let bytes = session_bytes(&header, &events);

        let chunks = collect_chunks(&bytes, ReadOptions::default()).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.records.len()).collect();
        assert_eq!(sizes, [3, 3, 3, 1]);

        let all: Vec<EventRecord> = chunks.into_iter().flat_map(|c| c.records).collect();
        assert_eq!(all, events);
    }

    #[test]
    fn chunk_timestamps_match_their_records() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 4;
        let events = synthetic_events(9);
        let bytes = session_bytes(&header, &events);

        for chunk in collect_chunks(&bytes, ReadOptions::default()).unwrap() {
            assert_eq!(chunk.header.first_ts, chunk.records.first().unwrap().ts_ns);
            assert_eq!(chunk.header.last_ts, chunk.records.last().unwrap().ts_ns);
        }
    }

    #[test]
    fn empty_session_round_trips() {
        let bytes = session_bytes(&FileHeader::new(), &[]);
        assert_eq!(bytes.len(), FILE_HEADER_SIZE + CHUNK_HEADER_SIZE);

        let mut iter = ChunkIter::new(&bytes[..], ReadOptions::default()).unwrap();
        assert_eq!(iter.header().unwrap().chunk_capacity, 4096);
        assert!(iter.next().is_none());
    }

    #[test]
    fn missing_sentinel_still_terminates_cleanly() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 3;
        let events = synthetic_events(6);
        let mut bytes = session_bytes(&header, &events);
        bytes.truncate(bytes.len() - CHUNK_HEADER_SIZE); // drop the sentinel

        let chunks = collect_chunks(&bytes, ReadOptions::default()).unwrap();
        assert_eq!(chunks.len(), 2);
        // Strict mode also accepts a bare EOF at a chunk boundary.
        let strict = ReadOptions { recover_on_truncation: false };
        assert_eq!(collect_chunks(&bytes, strict).unwrap().len(), 2);
    }

    #[test]
    fn truncation_inside_first_chunk_is_never_forgiven() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 3;
        let events = synthetic_events(6);
        let full = session_bytes(&header, &events);

        // Cut into the first chunk's payload: no full chunk precedes the
        // truncation, so even the recovering reader must refuse.
        let mut bytes = full.clone();
        bytes.truncate(FILE_HEADER_SIZE + CHUNK_HEADER_SIZE + 5);
        let err = collect_chunks(&bytes, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, LogError::Truncated { what: "chunk payload", .. }));

        // Same for a partial first chunk header.
        let mut bytes = full;
        bytes.truncate(FILE_HEADER_SIZE + 7);
        let err = collect_chunks(&bytes, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, LogError::Truncated { what: "chunk header", .. }));
    }

    #[test]
    fn truncated_payload_recovers_or_errors_by_option() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 3;
        let events = synthetic_events(9);
        let mut bytes = session_bytes(&header, &events);
        bytes.truncate(bytes.len() - CHUNK_HEADER_SIZE - 5); // cut into chunk 3

        let recovered = collect_chunks(&bytes, ReadOptions::default()).unwrap();
        assert_eq!(recovered.len(), 2);

        let strict = ReadOptions { recover_on_truncation: false };
        let err = collect_chunks(&bytes, strict).unwrap_err();
        assert!(matches!(err, LogError::Truncated { what: "chunk payload", .. }));
    }

    #[test]
    fn truncated_chunk_header_recovers_or_errors_by_option() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 2;
        let events = synthetic_events(4);
        let full = session_bytes(&header, &events);

        // Find the second chunk's header start and keep 7 bytes of it.
        let first_payload = {
            let mut iter = ChunkIter::new(&full[..], ReadOptions::default()).unwrap();
            iter.next().unwrap().unwrap().header.compressed_size as usize
        };
        let cut = FILE_HEADER_SIZE + CHUNK_HEADER_SIZE + first_payload + 7;
        let mut bytes = full;
        bytes.truncate(cut);

        assert_eq!(collect_chunks(&bytes, ReadOptions::default()).unwrap().len(), 1);
        let strict = ReadOptions { recover_on_truncation: false };
        let err = collect_chunks(&bytes, strict).unwrap_err();
        assert!(matches!(err, LogError::Truncated { what: "chunk header", .. }));
    }

    #[test]
    fn corrupt_chunk_is_fatal_even_when_recovering() {
        let mut header = FileHeader::new();
        header.chunk_capacity = 8;
        let events = synthetic_events(8);
        let mut bytes = session_bytes(&header, &events);
        // Break the declared uncompressed size so it no longer matches
        // record_count * 26; recovery only forgives truncation, never
        // corruption.
        let size_field = FILE_HEADER_SIZE..FILE_HEADER_SIZE + 4;
        let declared = u32::from_le_bytes(bytes[size_field.clone()].try_into().unwrap());
        bytes[size_field].copy_from_slice(&(declared + 1).to_le_bytes());

        let result: Result<Vec<Chunk>, LogError> =
            collect_chunks(&bytes, ReadOptions::default());
        assert!(matches!(result, Err(LogError::Decompress(_))));
    }

    #[test]
    fn empty_stream_is_an_empty_session() {
        let mut iter = ChunkIter::new(&[][..], ReadOptions::default()).unwrap();
        assert!(iter.header().is_none());
        assert!(iter.next().is_none());

        // Same for a stream shorter than one header.
        let mut iter = ChunkIter::new(&[0u8; 10][..], ReadOptions::default()).unwrap();
        assert!(iter.header().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn short_file_header_errors_in_strict_mode() {
        let strict = ReadOptions { recover_on_truncation: false };
        for stream in [&[][..], &[0u8; 10][..], &[0u8; 63][..]] {
            let err = match ChunkIter::new(stream, strict) {
                Err(e) => e,
                Ok(_) => panic!("short header must not open in strict mode"),
            };
            assert!(matches!(err, LogError::Truncated { what: "file header", .. }));
        }
    }

    #[test]
    fn bad_magic_fails_at_open() {
        let mut bytes = session_bytes(&FileHeader::new(), &synthetic_events(2));
        bytes[0..8].copy_from_slice(b"NOTAQLOG");
        assert!(matches!(
            ChunkIter::new(&bytes[..], ReadOptions::default()),
            Err(LogError::BadMagic { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_events(max_len: usize) -> impl Strategy<Value = Vec<EventRecord>> {
            prop::collection::vec(
                (
                    0u64..1_000_000,  // timestamp delta
                    0u8..=5,          // kind
                    -50_000i32..50_000,
                    any::<u32>(),
                    any::<u64>(),
                ),
                0..max_len,
            )
            .prop_map(|raw| {
                let mut ts = 0u64;
                raw.into_iter()
                    .map(|(delta, kind, price, qty, order_id)| {
                        ts += delta;
                        let ty = EventType::from_u8(kind).unwrap();
                        EventRecord::new(ts, ty, price, qty, order_id)
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn session_round_trip(
                events in arbitrary_events(200),
                capacity in 1u32..=64,
            ) {
                let mut header = FileHeader::new();
                header.chunk_capacity = capacity;
                let bytes = session_bytes(&header, &events);

                let chunks = collect_chunks(&bytes, ReadOptions::default()).unwrap();
                prop_assert!(chunks.iter().all(|c| c.records.len() <= capacity as usize));
                let all: Vec<EventRecord> =
                    chunks.into_iter().flat_map(|c| c.records).collect();
                prop_assert_eq!(all, events);
            }
        }
    }
}
