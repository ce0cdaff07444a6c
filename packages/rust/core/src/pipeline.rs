//! Per-candidate pipeline: fetch → digest → container check → macro check → dedup & store.
//!
//! Every step that can fail is folded into the candidate's [`Note`]; nothing
//! raised here escapes to the worker.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use macroharvest_classify::DocumentClassifier;
use macroharvest_shared::{Candidate, FetchResult, HarvestError, Note};
use macroharvest_store::ContentStore;

use crate::fetch::Fetcher;

/// File name used when the URL has no usable last path segment.
pub const FALLBACK_FILENAME: &str = "no_name";

/// Longest file name, in bytes, common filesystems accept.
const MAX_FILENAME_BYTES: usize = 255;

/// Outcome for a candidate whose bytes were fetched, as a pure function of
/// the three classification answers.
pub fn decide(is_container: bool, has_macro: bool, is_new_digest: bool) -> Note {
    match (is_container, has_macro, is_new_digest) {
        (false, _, _) => Note::NotAContainer,
        (true, false, _) => Note::NoMacros,
        (true, true, true) => Note::Stored,
        (true, true, false) => Note::AlreadyStored,
    }
}

/// Name a stored payload after the URL's last path segment.
///
/// Segments that are empty, `.`/`..`, or too long to be a file name fall
/// back to [`FALLBACK_FILENAME`].
pub fn derive_filename(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .unwrap_or("")
            .to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or("")
            .to_string(),
    };

    match segment.as_str() {
        "" | "." | ".." => FALLBACK_FILENAME.to_string(),
        _ if segment.len() > MAX_FILENAME_BYTES => FALLBACK_FILENAME.to_string(),
        _ => segment,
    }
}

/// The fetch-classify-store pipeline, shared by every worker.
pub struct FetchClassifyStore<F> {
    fetcher: F,
    classifier: Arc<dyn DocumentClassifier>,
    store: ContentStore,
}

impl<F: Fetcher> FetchClassifyStore<F> {
    pub fn new(fetcher: F, classifier: Arc<dyn DocumentClassifier>, store: ContentStore) -> Self {
        Self {
            fetcher,
            classifier,
            store,
        }
    }

    /// Run the pipeline for one candidate. Always produces a result.
    #[instrument(skip_all, fields(index = candidate.index, url = %candidate.url))]
    pub async fn process(&self, candidate: &Candidate) -> FetchResult {
        let url = candidate.url.as_str();
        let filename = derive_filename(url);

        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "fetch failed");
                return FetchResult::skipped(filename, url, Note::FetchError(describe(e)));
            }
        };

        let digest = macroharvest_store::digest(&bytes);

        let is_container = self.classifier.classify(&bytes).is_container;
        let has_macro = is_container && self.classifier.has_macro(&bytes);
        if !(is_container && has_macro) {
            let note = decide(is_container, has_macro, false);
            debug!(%digest, %note, "filtered out");
            return FetchResult::skipped(filename, url, note);
        }

        let (created, entry_dir) = match self.store.create_exclusive(&digest).await {
            Ok(claim) => claim,
            Err(e) => {
                warn!(%digest, error = %e, "store claim failed");
                return FetchResult::skipped(filename, url, Note::StoreError(describe(e)));
            }
        };

        if !created {
            debug!(%digest, "duplicate sample");
            return FetchResult::skipped(filename, url, decide(true, true, false));
        }

        match self.store.write_payload(&entry_dir, &filename, &bytes).await {
            Ok(path) => {
                info!(%digest, path = %path.display(), "stored new sample");
                FetchResult::stored(digest, path, filename, url)
            }
            Err(e) => {
                warn!(%digest, error = %e, "payload write failed, releasing entry");
                self.store.discard_entry(&entry_dir).await;
                FetchResult::skipped(filename, url, Note::StoreError(describe(e)))
            }
        }
    }
}

/// Note text for an error, without the taxonomy prefix the note already carries.
fn describe(err: HarvestError) -> String {
    match err {
        HarvestError::Network(msg) | HarvestError::Storage(msg) => msg,
        other => other.to_string(),
    }
}
