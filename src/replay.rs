//! Replay driver: event stream in, top-of-book time series out.
//!
//! Each applied event contributes one sample to a set of parallel arrays
//! (timestamp, best bid, best ask, mid, spread). The driver is
//! deterministic and single-threaded per stream; identical input files
//! produce identical arrays bit for bit. Run-level parallelism, one
//! independent book per session, lives behind the `parallel` feature.

use std::path::Path;
use thiserror::Error;

use crate::book::{BookError, MultiLevelBook};
use crate::error::LogError;
use crate::header::FileHeader;
use crate::manifest::ManifestError;
use crate::record::EventRecord;
use crate::stream::iter_chunks;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Per-event top-of-book series, one entry per applied event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySeries {
    pub ts_ns:        Vec<u64>,
    pub best_bid:     Vec<i32>,
    pub best_ask:     Vec<i32>,
    pub mid_ticks:    Vec<f64>,
    pub spread_ticks: Vec<i32>,
}

impl ReplaySeries {
    fn with_capacity(n: usize) -> Self {
        Self {
            ts_ns:        Vec::with_capacity(n),
            best_bid:     Vec::with_capacity(n),
            best_ask:     Vec::with_capacity(n),
            mid_ticks:    Vec::with_capacity(n),
            spread_ticks: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, ts_ns: u64, book: &MultiLevelBook) {
        self.ts_ns.push(ts_ns);
        self.best_bid.push(book.best_bid());
        self.best_ask.push(book.best_ask());
        self.mid_ticks.push(book.mid());
        self.spread_ticks.push(book.spread_ticks());
    }

    pub fn len(&self) -> usize {
        self.ts_ns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts_ns.is_empty()
    }
}

/// Replay a record stream through a book seeded from `header`.
/// Zero events in, empty arrays out.
pub fn replay(header: &FileHeader, events: &[EventRecord]) -> Result<ReplaySeries, BookError> {
    let mut book = MultiLevelBook::from_header(header)?;
    let mut series = ReplaySeries::with_capacity(events.len());
    for ev in events {
        book.apply(ev)?;
        series.push(ev.ts_ns, &book);
    }
    Ok(series)
}

/// Replay a session file chunk by chunk, never holding more than one
/// decompressed chunk of records. An empty or missing-body file replays
/// to empty arrays.
pub fn replay_file<P: AsRef<Path>>(path: P) -> Result<ReplaySeries, ReplayError> {
    let mut chunks = iter_chunks(path)?;
    let Some(header) = chunks.header().copied() else {
        return Ok(ReplaySeries::default());
    };

    let mut book = MultiLevelBook::from_header(&header)?;
    let mut series = ReplaySeries::with_capacity(header.chunk_capacity as usize);
    for chunk in chunks {
        for ev in chunk?.records {
            book.apply(&ev)?;
            series.push(ev.ts_ns, &book);
        }
    }
    Ok(series)
}

// ── Run-level parallel replay ────────────────────────────────────────────────

/// One session replayed out of a run directory.
#[derive(Debug, Clone)]
pub struct ReplayedSession {
    /// Empty for v1.0 manifests.
    pub symbol: String,
    pub date:   String,
    pub series: ReplaySeries,
}

/// Replay every session of a run directory concurrently, one rayon task
/// per session. Books share nothing, so sessions are trivially
/// independent; output order follows the manifest regardless of task
/// scheduling.
#[cfg(feature = "parallel")]
pub fn replay_run_parallel<P: AsRef<Path>>(
    run_dir:    P,
    start_date: Option<&str>,
    end_date:   Option<&str>,
) -> Result<Vec<ReplayedSession>, ReplayError> {
    use rayon::prelude::*;

    let run_dir = run_dir.as_ref();
    let manifest = crate::manifest::Manifest::load_dir(run_dir)?;
    let jobs: Vec<(String, String, std::path::PathBuf)> = manifest
        .iter_sessions(None)
        .filter(|(_, s)| crate::manifest::in_range(&s.date, start_date, end_date))
        .map(|(sym, s)| (sym.to_owned(), s.date.clone(), run_dir.join(&s.file)))
        .collect();

    jobs.into_par_iter()
        .map(|(symbol, date, path)| {
            let series = replay_file(&path)?;
            Ok(ReplayedSession { symbol, date, series })
        })
        .collect()
}
