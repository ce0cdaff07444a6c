//! Content-addressed sample store.
//!
//! Layout on disk:
//! ```text
//! <root>/
//! ├── 3f7a…e1/          (sha256 of the payload, lower-case hex)
//! │   └── invoice.docm  (original payload, named after the URL)
//! └── 9b02…4c/
//!     └── no_name
//! ```
//!
//! A digest directory is claimed with a single `create_dir` call, which the
//! filesystem performs atomically: among any number of concurrent callers
//! exactly one sees `created = true`. Everyone else gets `created = false`
//! and must treat it as a duplicate. Entries are never overwritten.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use macroharvest_shared::{HarvestError, Result};

/// Compute the store key (SHA-256, lower-case hex) for a payload.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Handle to a content-addressed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) the store at `root`.
    ///
    /// Fails with a config error if the root cannot be created or is not a
    /// directory; callers treat that as fatal before any work starts.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            HarvestError::config(format!(
                "storage root {} is unreachable: {e}",
                root.display()
            ))
        })?;

        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|e| HarvestError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(HarvestError::config(format!(
                "storage root {} is not a directory",
                root.display()
            )));
        }

        debug!(root = %root.display(), "content store opened");
        Ok(Self { root })
    }

    #[cfg(test)]
    fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an entry for `digest` lives in (whether or not it exists).
    fn entry_dir(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// Atomically claim the directory for `digest`.
    ///
    /// Returns `(true, dir)` if this call created it, `(false, dir)` if it
    /// already existed. Any other filesystem failure is an error.
    #[instrument(skip(self))]
    pub async fn create_exclusive(&self, digest: &str) -> Result<(bool, PathBuf)> {
        validate_digest(digest)?;
        let dir = self.entry_dir(digest);

        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {
                debug!(dir = %dir.display(), "claimed new entry");
                Ok((true, dir))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(dir = %dir.display(), "entry already present");
                Ok((false, dir))
            }
            Err(e) => Err(HarvestError::Storage(format!(
                "cannot claim {}: {e}",
                dir.display()
            ))),
        }
    }

    /// Write the payload into a freshly claimed entry directory.
    ///
    /// The file is opened with create-new semantics, so an existing payload
    /// is never replaced.
    pub async fn write_payload(
        &self,
        entry_dir: &Path,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = entry_dir.join(filename);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| HarvestError::io(&path, e))?;

        file.write_all(bytes)
            .await
            .map_err(|e| HarvestError::io(&path, e))?;
        file.flush().await.map_err(|e| HarvestError::io(&path, e))?;

        Ok(path)
    }

    /// Release an entry whose payload could not be written, so a later run
    /// can store the sample. Failures are logged, not returned.
    pub async fn discard_entry(&self, entry_dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(entry_dir).await {
            warn!(dir = %entry_dir.display(), error = %e, "failed to discard partial entry");
        }
    }

    /// Whether an entry for `digest` exists.
    #[cfg(test)]
    async fn contains(&self, digest: &str) -> bool {
        tokio::fs::metadata(self.entry_dir(digest))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Number of entry directories currently in the store.
    #[cfg(test)]
    async fn sample_count(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| HarvestError::io(&self.root, e))?;

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HarvestError::io(&self.root, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && is_digest(&entry.file_name().to_string_lossy()) {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn is_digest(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn validate_digest(digest: &str) -> Result<()> {
    if is_digest(digest) {
        Ok(())
    } else {
        Err(HarvestError::validation(format!(
            "invalid digest {digest:?}: expected lower-case hex"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mh-store-{tag}-{}", Uuid::now_v7()))
    }

    #[test]
    fn test_digest() {
        let hash = digest(b"hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn open_creates_root() {
        let root = temp_root("open");
        let store = ContentStore::open(&root).await.unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
        assert_eq!(store.sample_count().await.unwrap(), 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn open_rejects_file_root() {
        let root = temp_root("file");
        std::fs::create_dir_all(&root).unwrap();
        let file_root = root.join("not-a-dir");
        std::fs::write(&file_root, b"x").unwrap();

        let err = ContentStore::open(&file_root).await.unwrap_err();
        assert!(matches!(err, HarvestError::Config { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn second_create_is_duplicate() {
        let root = temp_root("twice");
        let store = ContentStore::open(&root).await.unwrap();
        let key = digest(b"payload");

        let (created, dir) = store.create_exclusive(&key).await.unwrap();
        assert!(created);
        store.write_payload(&dir, "a.doc", b"payload").await.unwrap();

        let (created_again, dir_again) = store.create_exclusive(&key).await.unwrap();
        assert!(!created_again);
        assert_eq!(dir, dir_again);

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(store.contains(&key).await);
        assert_eq!(store.sample_count().await.unwrap(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let root = temp_root("race");
        let store = Arc::new(ContentStore::open(&root).await.unwrap());
        let key = digest(b"contended");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store.create_exclusive(&key).await.unwrap().0
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn payload_is_never_overwritten() {
        let root = temp_root("nooverwrite");
        let store = ContentStore::open(&root).await.unwrap();
        let key = digest(b"first");
        let (_, dir) = store.create_exclusive(&key).await.unwrap();

        store.write_payload(&dir, "a.doc", b"first").await.unwrap();
        let err = store.write_payload(&dir, "a.doc", b"second").await;
        assert!(matches!(err, Err(HarvestError::Io { .. })));
        assert_eq!(std::fs::read(dir.join("a.doc")).unwrap(), b"first");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn discard_releases_entry() {
        let root = temp_root("discard");
        let store = ContentStore::open(&root).await.unwrap();
        let key = digest(b"partial");
        let (_, dir) = store.create_exclusive(&key).await.unwrap();

        store.discard_entry(&dir).await;
        assert!(!store.contains(&key).await);
        let (created, _) = store.create_exclusive(&key).await.unwrap();
        assert!(created);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn claim_failure_is_not_duplicate() {
        let root = temp_root("claimfail");
        let store = ContentStore::open(&root).await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();
        std::fs::write(&root, b"gone").unwrap();

        let err = store.create_exclusive(&digest(b"x")).await.unwrap_err();
        assert!(matches!(err, HarvestError::Storage(_)));
        let _ = std::fs::remove_file(&root);
    }

    #[tokio::test]
    async fn rejects_non_hex_digest() {
        let root = temp_root("badkey");
        let store = ContentStore::open(&root).await.unwrap();

        for bad in ["", "../escape", "ABCDEF", "abc/def"] {
            let err = store.create_exclusive(bad).await.unwrap_err();
            assert!(matches!(err, HarvestError::Validation { .. }), "{bad}");
        }
        let _ = std::fs::remove_dir_all(&root);
    }
}
