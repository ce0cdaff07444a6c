//! Fixed-size worker pool.
//!
//! Workers share one batch queue and one event channel. End of input is the
//! queue closing (every sender dropped), never a sentinel batch. A worker
//! announces its exit with [`WorkerEvent::Finished`], so an empty batch result
//! can't be mistaken for shutdown.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use macroharvest_shared::{Batch, FetchResult, HarvestError, Note, ResultMap, Result};

use crate::aggregate::{Aggregate, ResultAggregator};
use crate::fetch::Fetcher;
use crate::harvest::ProgressReporter;
use crate::pipeline::{FetchClassifyStore, derive_filename};

/// Identity of a pool worker, `0..W`.
pub type WorkerId = usize;

/// Message from a worker to the aggregator.
#[derive(Debug)]
pub enum WorkerEvent {
    /// One batch fully processed.
    BatchDone {
        worker: WorkerId,
        batch: usize,
        results: ResultMap,
    },
    /// The worker has exited and will send nothing more.
    Finished { worker: WorkerId },
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared cancellation signal.
///
/// Once cancelled, workers stop taking new batches; the batch each worker
/// holds still runs to completion.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the signal is raised. Never resolves if every handle is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Result of draining a pool.
#[derive(Debug)]
pub struct Drained {
    pub aggregate: Aggregate,
    pub cancelled: bool,
}

/// A running pool of `W` workers.
pub struct WorkerPool {
    queue: Option<mpsc::UnboundedSender<Batch>>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancelHandle,
    submitted: usize,
}

impl WorkerPool {
    /// Spawn `workers` workers running `pipeline`.
    pub fn start<F: Fetcher>(
        pipeline: Arc<FetchClassifyStore<F>>,
        workers: usize,
        cancel: CancelHandle,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(HarvestError::config("worker pool needs at least one worker"));
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<Batch>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<WorkerEvent>();
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&pipeline),
                    Arc::clone(&queue_rx),
                    event_tx.clone(),
                    cancel.subscribe(),
                ))
            })
            .collect();

        info!(workers, "worker pool started");

        Ok(Self {
            queue: Some(queue_tx),
            events: event_rx,
            handles,
            cancel,
            submitted: 0,
        })
    }

    /// Queue a batch for the next free worker.
    pub fn submit(&mut self, batch: Batch) -> Result<()> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| HarvestError::Worker("input already closed".into()))?;
        if let Err(mpsc::error::SendError(batch)) = queue.send(batch) {
            if self.cancel.is_cancelled() {
                debug!(batch = batch.id, "workers stopped after cancel, batch dropped");
                return Ok(());
            }
            return Err(HarvestError::Worker("all workers have exited".into()));
        }
        self.submitted += 1;
        Ok(())
    }

    /// Signal end of input. Workers exit once the queue is empty.
    pub fn close(&mut self) {
        if self.queue.take().is_some() {
            debug!(batches = self.submitted, "input closed");
        }
    }

    /// Close input, wait for every worker's completion marker, and merge.
    #[instrument(skip_all, fields(workers = self.handles.len(), batches = self.submitted))]
    pub async fn drain(mut self, progress: &dyn ProgressReporter) -> Result<Drained> {
        self.close();

        let aggregator = ResultAggregator::new(0..self.handles.len());
        let aggregate = aggregator
            .collect(&mut self.events, self.submitted, progress)
            .await?;

        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }

        Ok(Drained {
            aggregate,
            cancelled: self.cancel.is_cancelled(),
        })
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

async fn run_worker<F: Fetcher>(
    worker: WorkerId,
    pipeline: Arc<FetchClassifyStore<F>>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Batch>>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        if *cancel.borrow() {
            debug!(worker, "cancelled, not taking more batches");
            break;
        }

        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => None,
                batch = rx.recv() => batch,
            }
        };

        let Some(batch) = next else {
            break;
        };

        let batch_id = batch.id;
        debug!(worker, batch = batch_id, size = batch.len(), "batch taken");
        let results = process_batch(&pipeline, batch).await;

        if events
            .send(WorkerEvent::BatchDone {
                worker,
                batch: batch_id,
                results,
            })
            .is_err()
        {
            warn!(worker, "aggregator gone, stopping");
            return;
        }
    }

    debug!(worker, "worker finished");
    let _ = events.send(WorkerEvent::Finished { worker });
}

/// Run the pipeline over a batch, one candidate at a time.
///
/// Each candidate runs in its own task so a panic costs that candidate only.
async fn process_batch<F: Fetcher>(
    pipeline: &Arc<FetchClassifyStore<F>>,
    batch: Batch,
) -> ResultMap {
    let mut results = ResultMap::new();

    for candidate in batch.candidates {
        let index = candidate.index;
        let url = candidate.url.clone();
        let pipeline = Arc::clone(pipeline);

        let task = tokio::spawn(async move { pipeline.process(&candidate).await });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(index, %url, error = %e, "candidate task failed");
                FetchResult::skipped(derive_filename(&url), url, Note::WorkerError(e.to_string()))
            }
        };

        results.insert(index, result);
    }

    results
}
