//! End-to-end harvest: candidates → batches → worker pool → merged results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use macroharvest_classify::DocumentClassifier;
use macroharvest_shared::{Candidate, FetchResult, HarvestConfig, NoteKind, ResultMap, Result};
use macroharvest_store::ContentStore;

use crate::fetch::Fetcher;
use crate::partition::partition;
use crate::pipeline::FetchClassifyStore;
use crate::pool::{CancelHandle, WorkerId, WorkerPool};

/// Result of a harvest run.
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Per-candidate results keyed by input index.
    pub results: ResultMap,
    /// Candidates handed to the run.
    pub candidates: usize,
    /// Workers in the pool.
    pub workers: usize,
    /// Batches the input was split into.
    pub batches: usize,
    /// Whether the run was cancelled before the queue emptied.
    pub cancelled: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

impl HarvestOutcome {
    /// Count of results per outcome kind.
    pub fn summary(&self) -> BTreeMap<NoteKind, usize> {
        let mut counts = BTreeMap::new();
        for result in self.results.values() {
            *counts.entry(result.note.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Newly stored samples, in input order.
    pub fn stored(&self) -> impl Iterator<Item = &FetchResult> {
        self.results.values().filter(|r| r.is_stored())
    }

    /// Candidates never processed (non-zero only after cancellation).
    pub fn unprocessed(&self) -> usize {
        self.candidates.saturating_sub(self.results.len())
    }
}

/// Progress callback for reporting harvest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each batch result reaches the aggregator.
    fn batch_completed(&self, worker: WorkerId, completed: usize, total: usize, items: usize);
    /// Called when the run completes.
    fn done(&self, outcome: &HarvestOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_completed(&self, _worker: WorkerId, _completed: usize, _total: usize, _items: usize) {}
    fn done(&self, _outcome: &HarvestOutcome) {}
}

/// Run a full harvest.
///
/// 1. Validate configuration and open the store (fatal on failure)
/// 2. Partition candidates into batches
/// 3. Start the worker pool and queue every batch
/// 4. Drain: wait for every worker's completion marker and merge
#[instrument(skip_all, fields(candidates = candidates.len(), root = %config.storage_root.display()))]
pub async fn harvest<F: Fetcher>(
    config: &HarvestConfig,
    candidates: Vec<Candidate>,
    fetcher: F,
    classifier: Arc<dyn DocumentClassifier>,
    cancel: CancelHandle,
    progress: &dyn ProgressReporter,
) -> Result<HarvestOutcome> {
    let start = Instant::now();

    // --- Phase 1: Configuration ---
    progress.phase("Validating configuration");
    config.validate()?;
    let store = ContentStore::open(&config.storage_root).await?;

    // --- Phase 2: Partition ---
    let total = candidates.len();
    let batches = partition(candidates, config.batch_size)?;
    let batch_count = batches.len();
    let workers = config.worker_count()?;

    info!(
        candidates = total,
        batches = batch_count,
        batch_size = config.batch_size,
        workers,
        classifier = classifier.name(),
        "starting harvest"
    );

    // --- Phase 3: Dispatch ---
    progress.phase("Fetching candidates");
    let pipeline = Arc::new(FetchClassifyStore::new(fetcher, classifier, store));
    let mut pool = WorkerPool::start(pipeline, workers, cancel)?;
    for batch in batches {
        pool.submit(batch)?;
    }

    // --- Phase 4: Drain ---
    let drained = pool.drain(progress).await?;

    let outcome = HarvestOutcome {
        results: drained.aggregate.results,
        candidates: total,
        workers,
        batches: batch_count,
        cancelled: drained.cancelled,
        elapsed: start.elapsed(),
    };

    progress.done(&outcome);

    info!(
        results = outcome.results.len(),
        stored = outcome.stored().count(),
        unprocessed = outcome.unprocessed(),
        cancelled = outcome.cancelled,
        elapsed_ms = outcome.elapsed.as_millis(),
        "harvest complete"
    );

    Ok(outcome)
}
