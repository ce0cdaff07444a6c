//! Parallel fetch-classify-store engine for macroharvest.
//!
//! This crate ties together fetching, classification and the content store
//! into an end-to-end run (`harvest`):
//! - [`partition`]: contiguous, index-preserving batches
//! - [`pipeline`]: the per-candidate decision pipeline
//! - [`pool`]: fixed-size worker pool with explicit completion markers
//! - [`aggregate`]: merging per-batch results
//! - [`report`]: JSON export of a finished run

pub mod aggregate;
pub mod fetch;
pub mod harvest;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod report;

pub use aggregate::{Aggregate, ResultAggregator};
pub use fetch::{Fetcher, HttpFetcher};
pub use harvest::{HarvestOutcome, ProgressReporter, SilentProgress, harvest};
pub use partition::{candidates_from_urls, partition};
pub use pipeline::{FALLBACK_FILENAME, FetchClassifyStore, decide, derive_filename};
pub use pool::{CancelHandle, Drained, WorkerEvent, WorkerId, WorkerPool};
