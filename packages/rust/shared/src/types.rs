//! Core domain types for a harvest run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

/// Result mapping for a run (or a single batch), keyed by candidate index.
pub type ResultMap = BTreeMap<usize, FetchResult>;

// ---------------------------------------------------------------------------
// Candidate / Batch
// ---------------------------------------------------------------------------

/// A URL to examine, tagged with its position in the input sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Zero-based position in the original input.
    pub index: usize,
    /// URL to fetch, already trimmed.
    pub url: String,
}

impl Candidate {
    pub fn new(index: usize, url: impl AsRef<str>) -> Self {
        Self {
            index,
            url: url.as_ref().trim().to_string(),
        }
    }
}

/// A contiguous, index-preserving slice of the candidate sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in the partition (0-based).
    pub id: usize,
    /// Candidates in original order.
    pub candidates: Vec<Candidate>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

/// Outcome of running the fetch-classify-store pipeline on one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    /// A new macro-bearing sample was written to the store.
    Stored,
    /// The digest directory already existed (earlier run or a concurrent worker).
    AlreadyStored,
    /// The payload does not start with a known container signature.
    NotAContainer,
    /// Container, but the classifier found no macro.
    NoMacros,
    /// Network/transport failure.
    FetchError(String),
    /// Store failure other than "already exists".
    StoreError(String),
    /// The item's task failed unexpectedly (panic, cancellation).
    WorkerError(String),
}

impl Note {
    pub fn kind(&self) -> NoteKind {
        match self {
            Self::Stored => NoteKind::Stored,
            Self::AlreadyStored => NoteKind::AlreadyStored,
            Self::NotAContainer => NoteKind::NotAContainer,
            Self::NoMacros => NoteKind::NoMacros,
            Self::FetchError(_) => NoteKind::FetchError,
            Self::StoreError(_) => NoteKind::StoreError,
            Self::WorkerError(_) => NoteKind::WorkerError,
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => f.write_str("stored new sample with macro"),
            Self::AlreadyStored => f.write_str("already stored"),
            Self::NotAContainer => f.write_str("not a recognized document container"),
            Self::NoMacros => f.write_str("no macros detected"),
            Self::FetchError(desc) => write!(f, "fetch error: {desc}"),
            Self::StoreError(desc) => write!(f, "store error: {desc}"),
            Self::WorkerError(desc) => write!(f, "worker error: {desc}"),
        }
    }
}

// Reports carry the human-readable note, matching the tabular export.
impl Serialize for Note {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Payload-free discriminant of [`Note`], used for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Stored,
    AlreadyStored,
    NotAContainer,
    NoMacros,
    FetchError,
    StoreError,
    WorkerError,
}

// ---------------------------------------------------------------------------
// FetchResult
// ---------------------------------------------------------------------------

/// Per-candidate report row.
///
/// `content_hash` and `storage_path` are only set when a new sample was
/// stored. A duplicate deliberately drops the digest: it means "nothing new",
/// not "sample located here".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    #[serde(rename = "hash")]
    pub content_hash: Option<String>,
    #[serde(rename = "path")]
    pub storage_path: Option<PathBuf>,
    pub filename: String,
    pub url: String,
    pub note: Note,
}

impl FetchResult {
    /// Row for a newly stored sample.
    pub fn stored(
        content_hash: impl Into<String>,
        storage_path: impl Into<PathBuf>,
        filename: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: Some(content_hash.into()),
            storage_path: Some(storage_path.into()),
            filename: filename.into(),
            url: url.into(),
            note: Note::Stored,
        }
    }

    /// Row for every outcome that did not store anything.
    pub fn skipped(filename: impl Into<String>, url: impl Into<String>, note: Note) -> Self {
        Self {
            content_hash: None,
            storage_path: None,
            filename: filename.into(),
            url: url.into(),
            note,
        }
    }

    pub fn is_stored(&self) -> bool {
        self.note == Note::Stored
    }
}
