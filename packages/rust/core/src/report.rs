//! JSON report export for a finished harvest.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use macroharvest_shared::{HarvestError, NoteKind, ResultMap, Result};

use crate::harvest::HarvestOutcome;

/// Serialized form of a [`HarvestOutcome`].
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub generated_at: DateTime<Utc>,
    pub candidates: usize,
    pub workers: usize,
    pub batches: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub summary: BTreeMap<NoteKind, usize>,
    /// index → `{hash, path, filename, url, note}`
    pub results: &'a ResultMap,
}

impl<'a> Report<'a> {
    pub fn new(outcome: &'a HarvestOutcome) -> Self {
        Self {
            generated_at: Utc::now(),
            candidates: outcome.candidates,
            workers: outcome.workers,
            batches: outcome.batches,
            cancelled: outcome.cancelled,
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            summary: outcome.summary(),
            results: &outcome.results,
        }
    }
}

/// Render the report as pretty JSON.
pub fn to_json(outcome: &HarvestOutcome) -> Result<String> {
    serde_json::to_string_pretty(&Report::new(outcome))
        .map_err(|e| HarvestError::Report(e.to_string()))
}

/// Write the report to `path`, creating parent directories as needed.
pub fn write_json(outcome: &HarvestOutcome, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
    }

    let json = to_json(outcome)?;
    std::fs::write(path, json).map_err(|e| HarvestError::io(path, e))?;
    info!(path = %path.display(), rows = outcome.results.len(), "report written");
    Ok(())
}
