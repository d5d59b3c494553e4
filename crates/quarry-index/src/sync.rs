//! Content-addressed file synchronizer.
//!
//! Keeps one snapshot per codebase mapping relative path → blake3
//! content hash, and derives add/modify/remove deltas by comparing the
//! snapshot to the current tree. Snapshot writes go through a temp
//! file, fsync, and rename, so a crash mid-write leaves the previous
//! snapshot authoritative. An advisory file lock forbids concurrent
//! deltas on the same codebase.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collection::collection_name;
use crate::error::{IndexError, Result};
use crate::ignore::{IgnoreEngine, enumerate_files};

const SNAPSHOT_VERSION: u32 = 1;

/// Persisted per-codebase state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub paths: BTreeMap<String, String>,
    pub version: u32,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            paths: BTreeMap::new(),
            version: SNAPSHOT_VERSION,
        }
    }
}

/// Relative paths that changed since the last snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl FileDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Holds the advisory lock for the duration of a delta.
struct LockGuard {
    file: std::fs::File,
}

impl LockGuard {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        match file.try_lock() {
            Ok(()) => Ok(Self { file }),
            Err(std::fs::TryLockError::WouldBlock) => Err(IndexError::Locked(format!(
                "another delta is running for {}",
                path.display()
            ))),
            Err(std::fs::TryLockError::Error(e)) => Err(IndexError::Io(e)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Computes incremental deltas for one codebase.
pub struct FileSynchronizer {
    root: PathBuf,
    snapshot_path: PathBuf,
    lock_path: PathBuf,
    engine: IgnoreEngine,
    extensions: BTreeSet<String>,
}

impl FileSynchronizer {
    /// Create a synchronizer for the codebase at `root`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if `root` does not resolve.
    pub fn new(
        root: &Path,
        snapshot_dir: &Path,
        engine: IgnoreEngine,
        extensions: BTreeSet<String>,
    ) -> Result<Self> {
        let root = std::fs::canonicalize(root)?;
        let collection = collection_name(&root);
        Ok(Self {
            snapshot_path: snapshot_dir.join(format!("{collection}.json")),
            lock_path: snapshot_dir.join(format!("{collection}.lock")),
            root,
            engine,
            extensions,
        })
    }

    /// Compute the delta and atomically persist the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Locked` when another delta holds the lock, or an IO /
    /// snapshot error.
    pub async fn delta(&self) -> Result<FileDelta> {
        let _lock = LockGuard::acquire(&self.lock_path)?;
        let (delta, snapshot) = self.compute_locked().await?;
        self.persist(&snapshot).await?;
        Ok(delta)
    }

    /// Compute the delta without persisting. The caller runs the
    /// pipeline and then [`commit`](Self::commit)s the returned
    /// snapshot, so an aborted run re-detects the same delta.
    ///
    /// # Errors
    ///
    /// Returns `Locked` when another delta holds the lock, or an IO
    /// error from scanning.
    pub async fn compute_delta(&self) -> Result<(FileDelta, Snapshot)> {
        let _lock = LockGuard::acquire(&self.lock_path)?;
        self.compute_locked().await
    }

    /// Atomically persist a snapshot produced by
    /// [`compute_delta`](Self::compute_delta).
    ///
    /// # Errors
    ///
    /// Returns a snapshot error if the write or rename fails.
    pub async fn commit(&self, snapshot: &Snapshot) -> Result<()> {
        self.persist(snapshot).await
    }

    /// Load the current snapshot; missing file yields an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        if !self.snapshot_path.exists() {
            return Ok(Snapshot::default());
        }
        let content = std::fs::read_to_string(&self.snapshot_path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                version = snapshot.version,
                "unknown snapshot version, treating as empty"
            );
            return Ok(Snapshot::default());
        }
        Ok(snapshot)
    }

    /// Delete the snapshot and lock files. Used by `clear_index`.
    ///
    /// # Errors
    ///
    /// Returns an IO error other than not-found.
    pub async fn remove_snapshot(&self) -> Result<()> {
        for path in [&self.snapshot_path, &self.lock_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Canonical codebase root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn compute_locked(&self) -> Result<(FileDelta, Snapshot)> {
        let previous = self.load_snapshot()?;
        let current = self.scan().await?;

        let mut delta = FileDelta::default();
        for (path, hash) in &current {
            match previous.paths.get(path) {
                None => delta.added.push(path.clone()),
                Some(old) if old != hash => delta.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in previous.paths.keys() {
            if !current.contains_key(path) {
                delta.removed.push(path.clone());
            }
        }

        let snapshot = Snapshot {
            paths: current,
            version: SNAPSHOT_VERSION,
        };
        Ok((delta, snapshot))
    }

    /// Hash every indexable file under the root.
    async fn scan(&self) -> Result<BTreeMap<String, String>> {
        let mut hashes = BTreeMap::new();
        for path in enumerate_files(&self.root, &self.engine, &self.extensions) {
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    hashes.insert(relative, blake3::hash(&bytes).to_hex().to_string());
                }
                Err(e) => {
                    tracing::warn!(file = %relative, "skipping unreadable file: {e}");
                }
            }
        }
        Ok(hashes)
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path.clone();
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| IndexError::Snapshot(e.to_string()))?
    }
}

/// Write-to-temp, fsync, rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = path
        .parent()
        .ok_or_else(|| IndexError::Snapshot(format!("no parent dir for {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| IndexError::Snapshot(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> BTreeSet<String> {
        [".rs", ".txt"].iter().map(|e| (*e).to_string()).collect()
    }

    fn synchronizer(root: &Path, snapshots: &Path) -> FileSynchronizer {
        let engine = IgnoreEngine::new(root, &[]).unwrap();
        FileSynchronizer::new(root, snapshots, engine, extensions()).unwrap()
    }

    #[tokio::test]
    async fn first_delta_reports_everything_added() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(repo.path().join("b.rs"), "fn b() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        let delta = sync.delta().await.unwrap();
        assert_eq!(delta.added, vec!["a.rs".to_string(), "b.rs".to_string()]);
        assert!(delta.removed.is_empty());
        assert!(delta.modified.is_empty());
    }

    #[tokio::test]
    async fn unchanged_tree_yields_empty_delta() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn a() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        sync.delta().await.unwrap();
        let delta = sync.delta().await.unwrap();
        assert!(delta.is_empty());
    }

    #[tokio::test]
    async fn modify_and_remove_are_detected() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("x.txt"), "one").unwrap();
        std::fs::write(repo.path().join("gone.rs"), "fn g() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        sync.delta().await.unwrap();

        std::fs::write(repo.path().join("x.txt"), "two").unwrap();
        std::fs::remove_file(repo.path().join("gone.rs")).unwrap();

        let delta = sync.delta().await.unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(delta.modified, vec!["x.txt".to_string()]);
        assert_eq!(delta.removed, vec!["gone.rs".to_string()]);
    }

    #[tokio::test]
    async fn ignored_files_are_never_hashed() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("build")).unwrap();
        std::fs::write(repo.path().join("build/out.rs"), "x").unwrap();
        std::fs::write(repo.path().join("keep.rs"), "fn k() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        let delta = sync.delta().await.unwrap();
        assert_eq!(delta.added, vec!["keep.rs".to_string()]);
    }

    #[tokio::test]
    async fn snapshot_file_matches_contract() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn a() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        sync.delta().await.unwrap();

        let root = std::fs::canonicalize(repo.path()).unwrap();
        let expected = snaps
            .path()
            .join(format!("{}.json", collection_name(&root)));
        let raw = std::fs::read_to_string(expected).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], serde_json::json!(1));
        assert!(value["paths"]["a.rs"].is_string());
    }

    #[tokio::test]
    async fn compute_delta_does_not_persist_until_commit() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn a() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        let (first, snapshot) = sync.compute_delta().await.unwrap();
        assert_eq!(first.added.len(), 1);

        // Not committed: the same delta comes back.
        let (second, _) = sync.compute_delta().await.unwrap();
        assert_eq!(second, first);

        sync.commit(&snapshot).await.unwrap();
        let (third, _) = sync.compute_delta().await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn concurrent_delta_is_refused() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn a() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        let root = std::fs::canonicalize(repo.path()).unwrap();
        let lock_path = snaps
            .path()
            .join(format!("{}.lock", collection_name(&root)));

        // Simulate another process holding the lock.
        let holder = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .unwrap();
        holder.try_lock().unwrap();

        let result = sync.delta().await;
        assert!(matches!(result, Err(IndexError::Locked(_))));
        holder.unlock().unwrap();

        sync.delta().await.unwrap();
    }

    #[test]
    fn unknown_snapshot_version_is_ignored() {
        let repo = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn a() {}").unwrap();

        let sync = synchronizer(repo.path(), snaps.path());
        let root = std::fs::canonicalize(repo.path()).unwrap();
        let snapshot_path = snaps
            .path()
            .join(format!("{}.json", collection_name(&root)));
        std::fs::write(&snapshot_path, r#"{"paths":{"a.rs":"h"},"version":9}"#).unwrap();

        let snapshot = sync.load_snapshot().unwrap();
        assert!(snapshot.paths.is_empty());
    }
}
