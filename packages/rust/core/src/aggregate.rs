//! Merging per-batch results into the run's final mapping.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use macroharvest_shared::{HarvestError, ResultMap, Result};

use crate::harvest::ProgressReporter;
use crate::pool::{WorkerEvent, WorkerId};

/// Merged output of a drained pool.
#[derive(Debug, Default)]
pub struct Aggregate {
    pub results: ResultMap,
    /// Batch results received.
    pub batches: usize,
    /// Distinct workers that sent a completion marker.
    pub finished_workers: usize,
}

/// Collects worker events until every expected worker has reported done.
#[derive(Debug)]
pub struct ResultAggregator {
    expected: BTreeSet<WorkerId>,
    finished: BTreeSet<WorkerId>,
    results: ResultMap,
    batches: usize,
}

impl ResultAggregator {
    pub fn new(workers: impl IntoIterator<Item = WorkerId>) -> Self {
        Self {
            expected: workers.into_iter().collect(),
            finished: BTreeSet::new(),
            results: ResultMap::new(),
            batches: 0,
        }
    }

    /// Complete once every expected worker has sent its marker.
    pub fn is_complete(&self) -> bool {
        self.expected.is_subset(&self.finished)
    }

    fn batches_seen(&self) -> usize {
        self.batches
    }

    /// Fold one event into the aggregate.
    pub fn observe(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::BatchDone {
                worker,
                batch,
                results,
            } => {
                debug!(worker, batch, items = results.len(), "batch merged");
                self.batches += 1;
                for (index, result) in results {
                    if self.results.contains_key(&index) {
                        warn!(index, worker, batch, "duplicate result ignored");
                        continue;
                    }
                    self.results.insert(index, result);
                }
            }
            WorkerEvent::Finished { worker } => {
                if !self.expected.contains(&worker) {
                    warn!(worker, "completion marker from unknown worker");
                    return;
                }
                if !self.finished.insert(worker) {
                    warn!(worker, "repeated completion marker");
                }
            }
        }
    }

    /// Read events until complete.
    ///
    /// Fails if the channel closes while workers are still unaccounted for.
    pub async fn collect(
        mut self,
        events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
        total_batches: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Aggregate> {
        while !self.is_complete() {
            let Some(event) = events.recv().await else {
                let missing = self.expected.difference(&self.finished).count();
                return Err(HarvestError::Worker(format!(
                    "event channel closed with {missing} worker(s) unaccounted for"
                )));
            };

            if let WorkerEvent::BatchDone {
                worker, ref results, ..
            } = event
            {
                progress.batch_completed(worker, self.batches_seen() + 1, total_batches, results.len());
            }
            self.observe(event);
        }

        Ok(self.into_aggregate())
    }

    pub fn into_aggregate(self) -> Aggregate {
        Aggregate {
            results: self.results,
            batches: self.batches,
            finished_workers: self.finished.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::SilentProgress;
    use macroharvest_shared::{FetchResult, Note};

    fn batch(worker: WorkerId, batch: usize, indices: &[usize]) -> WorkerEvent {
        let results = indices
            .iter()
            .map(|&i| {
                (
                    i,
                    FetchResult::skipped(format!("{i}.doc"), format!("https://x/{i}.doc"), Note::NoMacros),
                )
            })
            .collect();
        WorkerEvent::BatchDone {
            worker,
            batch,
            results,
        }
    }

    #[test]
    fn empty_batch_is_not_completion() {
        let mut agg = ResultAggregator::new(0..2);
        agg.observe(batch(0, 0, &[]));
        agg.observe(batch(1, 1, &[]));
        assert!(!agg.is_complete());
        assert_eq!(agg.batches_seen(), 2);

        agg.observe(WorkerEvent::Finished { worker: 0 });
        agg.observe(WorkerEvent::Finished { worker: 0 });
        assert!(!agg.is_complete());
        agg.observe(WorkerEvent::Finished { worker: 1 });
        assert!(agg.is_complete());
    }

    #[test]
    fn unknown_worker_marker_is_ignored() {
        let mut agg = ResultAggregator::new(0..1);
        agg.observe(WorkerEvent::Finished { worker: 7 });
        assert!(!agg.is_complete());
    }

    #[test]
    fn union_in_any_order() {
        let orders: [&[usize]; 3] = [&[0, 1, 2], &[2, 0, 1], &[1, 2, 0]];
        for order in orders {
            let mut agg = ResultAggregator::new(0..3);
            for &b in order {
                let start = b * 4;
                let indices: Vec<_> = (start..start + 4).collect();
                agg.observe(batch(b, b, &indices));
            }
            for w in 0..3 {
                agg.observe(WorkerEvent::Finished { worker: w });
            }
            let out = agg.into_aggregate();
            assert_eq!(out.results.len(), 12);
            assert_eq!(out.batches, 3);
            assert_eq!(out.finished_workers, 3);
            assert_eq!(out.results.keys().copied().collect::<Vec<_>>(), (0..12).collect::<Vec<_>>());
        }
    }

    #[test]
    fn first_write_wins_on_collision() {
        let mut agg = ResultAggregator::new(0..1);
        agg.observe(batch(0, 0, &[5]));
        agg.observe(WorkerEvent::BatchDone {
            worker: 0,
            batch: 1,
            results: [(5, FetchResult::skipped("other", "https://y", Note::NotAContainer))]
                .into_iter()
                .collect(),
        });
        let out = agg.into_aggregate();
        assert_eq!(out.results[&5].note, Note::NoMacros);
    }

    #[tokio::test]
    async fn collect_waits_for_every_marker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(batch(1, 0, &[0, 1])).unwrap();
        tx.send(WorkerEvent::Finished { worker: 1 }).unwrap();
        tx.send(batch(0, 1, &[2])).unwrap();
        tx.send(WorkerEvent::Finished { worker: 0 }).unwrap();
        // Sent after completion; must not be required.
        tx.send(batch(0, 2, &[3])).unwrap();

        let out = ResultAggregator::new(0..2)
            .collect(&mut rx, 2, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(out.results.len(), 3);
        assert_eq!(out.finished_workers, 2);
    }

    #[tokio::test]
    async fn collect_fails_when_workers_vanish() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(WorkerEvent::Finished { worker: 0 }).unwrap();
        drop(tx);

        let err = ResultAggregator::new(0..3)
            .collect(&mut rx, 0, &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2 worker(s)"));
    }
}
