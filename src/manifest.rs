//! Run manifest: the JSON index of sessions in a run directory.
//!
//! Two schemas are in the field and both must parse:
//!
//! - v1.0, one unnamed security:
//!   `{ "sessions": [ { "date": "YYYY-MM-DD", "file": "..." }, ... ] }`
//! - v1.1, multi-security:
//!   `{ "securities": [ { "symbol": "...", "sessions": [ ... ] }, ... ] }`
//!
//! The schema is decided once at parse time and carried as a tagged
//! variant; call sites never sniff keys themselves. Unknown fields are
//! ignored. Dates are ISO `YYYY-MM-DD` strings and all filtering is
//! inclusive lexicographic comparison, which for this shape equals
//! chronological order.
//!
//! Session `file` paths are relative to the manifest's directory.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::LogError;
use crate::record::EventRecord;
use crate::stream::read_day;

/// Manifest file name at the root of a run directory.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    /// JSON parse failure, or a document with neither `"sessions"` nor
    /// `"securities"` at the top level.
    #[error("bad manifest: {0}")]
    BadManifest(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Schema ───────────────────────────────────────────────────────────────────

/// One dated session file of one security.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub date: String,
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
    pub symbol:   String,
    pub sessions: Vec<Session>,
}

/// A parsed manifest, schema resolved.
#[derive(Debug, Clone)]
pub enum Manifest {
    /// v1.0 legacy shape: a single unnamed security.
    SingleSecurity { sessions: Vec<Session> },
    /// v1.1 shape: named securities, each with its own session list.
    MultiSecurity { securities: Vec<Security> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifest {
    Multi { securities: Vec<Security> },
    Single { sessions: Vec<Session> },
}

impl Manifest {
    pub fn from_str(text: &str) -> Result<Self, ManifestError> {
        // Parse in two steps so malformed JSON and an unknown schema get
        // distinguishable messages.
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ManifestError::BadManifest(e.to_string()))?;
        let raw: RawManifest = serde_json::from_value(value).map_err(|_| {
            ManifestError::BadManifest(
                "neither \"securities\" nor \"sessions\" present at top level".into(),
            )
        })?;
        Ok(match raw {
            RawManifest::Multi { securities } => Manifest::MultiSecurity { securities },
            RawManifest::Single { sessions } => Manifest::SingleSecurity { sessions },
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        Self::from_str(&fs::read_to_string(path)?)
    }

    /// Load `manifest.json` from a run directory.
    pub fn load_dir<P: AsRef<Path>>(run_dir: P) -> Result<Self, ManifestError> {
        Self::load(run_dir.as_ref().join(MANIFEST_FILE))
    }

    /// Security symbols in manifest order; empty for the v1.0 shape.
    pub fn symbols(&self) -> Vec<&str> {
        match self {
            Manifest::SingleSecurity { .. } => Vec::new(),
            Manifest::MultiSecurity { securities } => {
                securities.iter().map(|s| s.symbol.as_str()).collect()
            }
        }
    }

    /// Iterate `(symbol, session)` pairs, optionally restricted to one
    /// symbol. The v1.0 shape has no symbols at all, so any symbol filter
    /// on it yields nothing; unfiltered iteration reports the symbol as "".
    pub fn iter_sessions<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a Session)> + 'a {
        let pairs: Vec<(&str, &Session)> = match self {
            Manifest::SingleSecurity { sessions } => {
                if symbol.is_some() {
                    Vec::new()
                } else {
                    sessions.iter().map(|s| ("", s)).collect()
                }
            }
            Manifest::MultiSecurity { securities } => securities
                .iter()
                .filter(|sec| symbol.map_or(true, |want| sec.symbol == want))
                .flat_map(|sec| sec.sessions.iter().map(move |s| (sec.symbol.as_str(), s)))
                .collect(),
        };
        pairs.into_iter()
    }
}

// ── Run-directory iteration ──────────────────────────────────────────────────

/// One session's worth of records read back from a run directory.
#[derive(Debug, Clone)]
pub struct SessionRecords {
    /// Empty for v1.0 manifests.
    pub symbol:  String,
    pub date:    String,
    pub records: Vec<EventRecord>,
}

/// Lazy join of the manifest with [`read_day`]: each `next()` reads one
/// session file. Manifest problems fail before the iterator exists;
/// per-session read failures stream as `Err` items so a caller may log
/// and skip a day without losing the rest of the run, and without a
/// corrupt file masquerading as an empty one.
pub struct SessionIter {
    base:  PathBuf,
    queue: std::vec::IntoIter<(String, Session)>,
}

impl Iterator for SessionIter {
    type Item = Result<SessionRecords, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (symbol, session) = self.queue.next()?;
        let path = self.base.join(&session.file);
        Some(read_day(&path).map(|records| SessionRecords {
            symbol,
            date: session.date,
            records,
        }))
    }
}

pub(crate) fn in_range(date: &str, start: Option<&str>, end: Option<&str>) -> bool {
    if start.is_some_and(|s| date < s) {
        return false;
    }
    if end.is_some_and(|e| date > e) {
        return false;
    }
    true
}

/// Iterate `(date, records)` sessions of a run directory, inclusive date
/// bounds, optionally restricted to one symbol.
pub fn iter_days<P: AsRef<Path>>(
    run_dir:    P,
    start_date: Option<&str>,
    end_date:   Option<&str>,
    symbol:     Option<&str>,
) -> Result<SessionIter, ManifestError> {
    let run_dir = run_dir.as_ref();
    let manifest = Manifest::load_dir(run_dir)?;
    let queue: Vec<(String, Session)> = manifest
        .iter_sessions(symbol)
        .filter(|(_, s)| in_range(&s.date, start_date, end_date))
        .map(|(sym, s)| (sym.to_owned(), s.clone()))
        .collect();
    Ok(SessionIter {
        base:  run_dir.to_path_buf(),
        queue: queue.into_iter(),
    })
}

/// Like [`iter_days`] but across every security in the manifest; the
/// yielded symbol is empty for v1.0 runs.
pub fn iter_securities<P: AsRef<Path>>(
    run_dir:    P,
    start_date: Option<&str>,
    end_date:   Option<&str>,
) -> Result<SessionIter, ManifestError> {
    iter_days(run_dir, start_date, end_date, None)
}
