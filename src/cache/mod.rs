// On-disk cache for the index and the dependency graph

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::graph::GraphArtifact;
use crate::index::{ProjectIndex, INDEX_VERSION};
use crate::indexer::discovery;

pub const INDEX_FILE: &str = "symbols-index.json";
pub const GRAPH_FILE: &str = "dependency-graph.json";
pub const META_FILE: &str = "cache-meta.json";

/// Files outside the source set whose changes invalidate every artifact
const TRACKED_CONFIG_FILES: &[&str] = &["tsconfig.json", "jsconfig.json", CONFIG_FILE];

type LockKey = (PathBuf, &'static str);

/// One async mutex per (cache directory, key), shared by every store in the
/// process. Entries are removed when their last holder releases them.
static LOCKS: Lazy<DashMap<LockKey, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

/// Held lock on one cache key
struct KeyGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // waiters hold their own clone, so a count of one means nobody else needs it
        LOCKS.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

async fn lock_key(dir: &Path, name: &'static str) -> KeyGuard {
    let key = (dir.to_path_buf(), name);
    let lock = LOCKS
        .entry(key.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    KeyGuard {
        key,
        guard: Some(lock.lock_owned().await),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Index,
    Graph,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Index => "index",
            CacheKind::Graph => "graph",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            CacheKind::Index => INDEX_FILE,
            CacheKind::Graph => GRAPH_FILE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMeta {
    pub built_at: chrono::DateTime<chrono::Utc>,
    pub source_fingerprint: String,
}

/// Contents of `cache-meta.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<CacheMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<CacheMeta>,
}

impl MetaFile {
    pub fn get(&self, kind: CacheKind) -> Option<&CacheMeta> {
        match kind {
            CacheKind::Index => self.index.as_ref(),
            CacheKind::Graph => self.graph.as_ref(),
        }
    }

    fn set(&mut self, kind: CacheKind, meta: CacheMeta) {
        match kind {
            CacheKind::Index => self.index = Some(meta),
            CacheKind::Graph => self.graph = Some(meta),
        }
    }
}

/// A value the cache can persist
pub trait Artifact: Serialize + DeserializeOwned + Send + Sync {
    const KIND: CacheKind;

    /// Structural check run after loading; `Err` marks the artifact corrupt
    fn validate(&self) -> std::result::Result<(), String>;
}

impl Artifact for ProjectIndex {
    const KIND: CacheKind = CacheKind::Index;

    fn validate(&self) -> std::result::Result<(), String> {
        if self.version != INDEX_VERSION {
            return Err(format!("index version {} (expected {})", self.version, INDEX_VERSION));
        }
        if !self.is_consistent() {
            return Err("symbol table does not match file records".to_string());
        }
        Ok(())
    }
}

impl Artifact for GraphArtifact {
    const KIND: CacheKind = CacheKind::Graph;

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.graph.is_well_formed() {
            return Err("graph adjacency is not normalized".to_string());
        }
        Ok(())
    }
}

/// Cache rooted at `<project>/<cache.dir>`
pub struct CacheStore {
    root: PathBuf,
    dir: PathBuf,
    config: Config,
}

impl CacheStore {
    pub fn new(root: &Path, config: &Config) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: root.join(&config.cache.dir),
            config: config.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fingerprint of the tracked source tree
    pub async fn fingerprint(&self) -> Result<String> {
        let root = self.root.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || compute_fingerprint(&root, &config))
            .await
            .map_err(|e| Error::io(&self.root, std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    /// Return the cached artifact if it is still valid, otherwise build,
    /// persist and return a fresh one.
    ///
    /// Callers for the same artifact and project are serialized from the
    /// validity check through the write. With `use_cache` false the read
    /// is skipped but the result is still written back.
    pub async fn get_or_build<T, F, Fut>(&self, use_cache: bool, build: F) -> Result<T>
    where
        T: Artifact,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.config.cache.enabled {
            return build().await;
        }

        let _guard = lock_key(&self.dir, T::KIND.as_str()).await;

        let fingerprint = self.fingerprint().await?;
        if use_cache {
            match self.load::<T>(&fingerprint).await {
                Ok(Some(artifact)) => {
                    debug!("Using cached {} for {}", T::KIND.as_str(), self.root.display());
                    return Ok(artifact);
                }
                Ok(None) => debug!("No valid cached {}, rebuilding", T::KIND.as_str()),
                Err(e) => warn!("{}, rebuilding", e),
            }
        }

        let artifact = build().await?;
        self.store(&artifact, fingerprint).await?;
        Ok(artifact)
    }

    /// Delete the whole cache directory
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!("Cleared cache at {}", self.dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.dir, e)),
        }
    }

    /// Persisted metadata; missing file reads as empty
    pub async fn meta(&self) -> Result<MetaFile> {
        let path = self.dir.join(META_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| corrupt(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MetaFile::default()),
            Err(e) => Err(corrupt(&path, e)),
        }
    }

    async fn load<T: Artifact>(&self, fingerprint: &str) -> Result<Option<T>> {
        let meta = self.meta().await?;
        match meta.get(T::KIND) {
            Some(m) if m.source_fingerprint == fingerprint => {}
            _ => return Ok(None),
        }

        let path = self.dir.join(T::KIND.file_name());
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(&path, e)),
        };
        let artifact: T = serde_json::from_str(&content).map_err(|e| corrupt(&path, e))?;
        artifact.validate().map_err(|reason| corrupt(&path, reason))?;
        Ok(Some(artifact))
    }

    /// Write the artifact, then its meta entry
    async fn store<T: Artifact>(&self, artifact: &T, fingerprint: String) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(artifact)
            .map_err(|e| Error::io(&self.dir, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(&self.dir, e))?;
        self.write_file(T::KIND.file_name(), bytes).await?;

        let _guard = lock_key(&self.dir, "meta").await;

        let mut meta = self.meta().await.unwrap_or_else(|e| {
            warn!("{}, starting fresh metadata", e);
            MetaFile::default()
        });
        meta.set(
            T::KIND,
            CacheMeta {
                built_at: chrono::Utc::now(),
                source_fingerprint: fingerprint,
            },
        );
        let bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| Error::io(&self.dir, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        self.write_file(META_FILE, bytes).await?;

        debug!("Cached {} at {}", T::KIND.as_str(), self.dir.display());
        Ok(())
    }

    async fn write_file(&self, name: &'static str, bytes: Vec<u8>) -> Result<()> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, name, &bytes))
            .await
            .map_err(|e| Error::io(&self.dir, std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

/// Stage `bytes` in a temp file inside `dir`, then rename it over `dir/name`
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let target = dir.join(name);
    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    staged.write_all(bytes).map_err(|e| Error::io(staged.path(), e))?;
    staged.as_file().sync_all().map_err(|e| Error::io(staged.path(), e))?;
    staged.persist(&target).map_err(|e| Error::io(&target, e.error))?;
    Ok(())
}

fn corrupt(path: &Path, reason: impl ToString) -> Error {
    Error::CacheReadCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// `count-maxMtime-digest` over the sorted `(path, size, mtime)` of every
/// tracked file. Nothing is parsed.
pub fn compute_fingerprint(root: &Path, config: &Config) -> Result<String> {
    let mut entries: Vec<(String, u64, u128)> = Vec::new();

    let stat = |path: &Path| -> Option<(u64, u128)> {
        let metadata = std::fs::metadata(path).ok()?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Some((metadata.len(), mtime))
    };

    for file in discovery::discover(root, config)? {
        if let Some((size, mtime)) = stat(&file.absolute) {
            entries.push((file.path, size, mtime));
        }
    }
    for name in TRACKED_CONFIG_FILES {
        if let Some((size, mtime)) = stat(&root.join(name)) {
            entries.push((name.to_string(), size, mtime));
        }
    }
    entries.sort();

    let mut hasher = blake3::Hasher::new();
    for (path, size, mtime) in &entries {
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&size.to_le_bytes());
        hasher.update(&mtime.to_le_bytes());
    }
    let max_mtime_ms = entries.iter().map(|(_, _, m)| m / 1_000_000).max().unwrap_or(0);
    let digest = hasher.finalize().to_hex();

    Ok(format!("{}-{}-{}", entries.len(), max_mtime_ms, &digest.as_str()[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.ts"), "export const a = 1;\n").unwrap();
        dir
    }

    #[test]
    fn test_fingerprint_tracks_size_and_membership() {
        let dir = project();
        let config = Config::default();
        let first = compute_fingerprint(dir.path(), &config).unwrap();
        assert_eq!(first, compute_fingerprint(dir.path(), &config).unwrap());
        assert!(first.starts_with("1-"));

        fs::write(dir.path().join("src/a.ts"), "export const a = 12345;\n").unwrap();
        let modified = compute_fingerprint(dir.path(), &config).unwrap();
        assert_ne!(first, modified);

        fs::write(dir.path().join("src/b.ts"), "").unwrap();
        let added = compute_fingerprint(dir.path(), &config).unwrap();
        assert!(added.starts_with("2-"));
    }

    #[tokio::test]
    async fn test_get_or_build_reuses_until_stale() {
        let dir = project();
        let store = CacheStore::new(dir.path(), &Config::default());
        let builds = AtomicUsize::new(0);
        let counter = &builds;
        let build = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ProjectIndex::new())
        };

        store.get_or_build::<ProjectIndex, _, _>(true, build).await.unwrap();
        store.get_or_build::<ProjectIndex, _, _>(true, build).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(store.dir().join(INDEX_FILE).exists());

        store.get_or_build::<ProjectIndex, _, _>(false, build).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);

        fs::write(dir.path().join("src/a.ts"), "export const a = 'changed';\n").unwrap();
        store.get_or_build::<ProjectIndex, _, _>(true, build).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 3);

        let meta = store.meta().await.unwrap();
        assert!(meta.index.is_some());
        assert!(meta.graph.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_builds_are_serialized() {
        let dir = project();
        let store = Arc::new(CacheStore::new(dir.path(), &Config::default()));
        let builds = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let builds = Arc::clone(&builds);
                tokio::spawn(async move {
                    store
                        .get_or_build::<ProjectIndex, _, _>(true, move || async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(ProjectIndex::new())
                        })
                        .await
                })
            })
            .collect();

        let mut built_at = Vec::new();
        for task in tasks {
            built_at.push(task.await.unwrap().unwrap().built_at);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(built_at.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let dir = project();
        let store = CacheStore::new(dir.path(), &Config::default());
        store
            .get_or_build::<ProjectIndex, _, _>(true, || async { Ok(ProjectIndex::new()) })
            .await
            .unwrap();

        for name in ["index", "meta"] {
            assert!(!LOCKS.contains_key(&(store.dir().to_path_buf(), name)));
        }

        let held = lock_key(store.dir(), "index").await;
        assert!(LOCKS.contains_key(&(store.dir().to_path_buf(), "index")));
        drop(held);
        assert!(!LOCKS.contains_key(&(store.dir().to_path_buf(), "index")));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_a_miss() {
        let dir = project();
        let store = CacheStore::new(dir.path(), &Config::default());
        store
            .get_or_build::<ProjectIndex, _, _>(true, || async { Ok(ProjectIndex::new()) })
            .await
            .unwrap();

        fs::write(store.dir().join(INDEX_FILE), "{ truncated").unwrap();
        let err = store.load::<ProjectIndex>(&store.fingerprint().await.unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::CacheReadCorrupt { .. }));

        let rebuilt = store
            .get_or_build::<ProjectIndex, _, _>(true, || async { Ok(ProjectIndex::new()) })
            .await;
        assert!(rebuilt.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_cache_writes_nothing() {
        let dir = project();
        let mut config = Config::default();
        config.cache.enabled = false;
        let store = CacheStore::new(dir.path(), &config);

        store
            .get_or_build::<ProjectIndex, _, _>(true, || async { Ok(ProjectIndex::new()) })
            .await
            .unwrap();
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn test_clear_removes_directory() {
        let dir = project();
        let store = CacheStore::new(dir.path(), &Config::default());
        store
            .get_or_build::<ProjectIndex, _, _>(true, || async { Ok(ProjectIndex::new()) })
            .await
            .unwrap();

        store.clear().await.unwrap();
        assert!(!store.dir().exists());
        store.clear().await.unwrap();
    }
}
