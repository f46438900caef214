//! SD-card backed key/value byte store with LRU eviction.
//!
//! Entries live as plain files under the cache root, at the relative path
//! their [`CacheKey`] dictates, so the tree survives reboots and stays
//! directly consumable by external tooling. An in-memory index (rebuilt by
//! scanning at open) carries size and recency metadata.
//!
//! Writes are atomic: payloads land in a staging file in the final
//! directory and are renamed into place, so readers never observe a
//! truncated entry. After every commit the store evicts entries in
//! ascending last-access order until the byte (and optional count) budget
//! holds again.
//!
//! Absence of the storage medium surfaces as `Error::StorageUnavailable`
//! from every operation; the store itself stays usable once the medium
//! returns.

mod scan;

use crate::error::Error;
use crate::key::CacheKey;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Per-entry bookkeeping held by the index.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub size_bytes: u64,
    pub fetched_at: DateTime<Utc>,
    /// Monotonic access counter; wall-clock timestamps are too coarse to
    /// order back-to-back accesses.
    pub last_access: u64,
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<CacheKey, EntryMeta>,
    total_bytes: u64,
}

impl Index {
    fn insert(&mut self, key: CacheKey, meta: EntryMeta) {
        if let Some(old) = self.entries.insert(key, meta.clone()) {
            self.total_bytes -= old.size_bytes;
        }
        self.total_bytes += meta.size_bytes;
    }

    fn remove(&mut self, key: &CacheKey) -> Option<EntryMeta> {
        let meta = self.entries.remove(key)?;
        self.total_bytes -= meta.size_bytes;
        Some(meta)
    }

    /// Key with the smallest last-access counter.
    fn lru_key(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by_key(|(_, meta)| meta.last_access)
            .map(|(key, _)| key.clone())
    }
}

/// Durable key/value byte store over the storage mount.
#[derive(Debug)]
pub struct LocalAssetStore {
    root: PathBuf,
    max_bytes: u64,
    max_entries: Option<usize>,
    index: Mutex<Index>,
    tick: AtomicU64,
}

impl LocalAssetStore {
    /// Open the store at `root`, creating the directory layout and
    /// rebuilding the index from whatever already survives on the medium.
    ///
    /// An absent medium is not fatal here: the store opens empty and every
    /// operation reports `StorageUnavailable` until the mount appears.
    pub async fn open(root: impl Into<PathBuf>, max_bytes: u64, max_entries: Option<usize>) -> Self {
        let root = root.into();
        let mut index = Index::default();
        let tick = AtomicU64::new(1);

        match scan::prepare_layout(&root).await {
            Ok(()) => {
                let entries = scan::scan(&root);
                for (key, size_bytes, fetched_at) in entries {
                    let last_access = tick.fetch_add(1, Ordering::Relaxed);
                    index.insert(key, EntryMeta { size_bytes, fetched_at, last_access });
                }
                tracing::info!(
                    root = %root.display(),
                    entries = index.entries.len(),
                    bytes = index.total_bytes,
                    "asset store opened"
                );
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "storage unavailable at open");
            }
        }

        Self { root, max_bytes, max_entries, index: Mutex::new(index), tick }
    }

    /// Whether the storage medium is currently reachable.
    pub fn available(&self) -> bool {
        self.root.is_dir()
    }

    fn ensure_available(&self) -> Result<(), Error> {
        if self.available() {
            Ok(())
        } else {
            Err(Error::StorageUnavailable(format!("{} is not mounted", self.root.display())))
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn abs_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Read an entry. A hit refreshes its recency; a miss has no effect.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, Error> {
        self.ensure_available()?;

        let known = { self.index.lock().await.entries.contains_key(key) };
        if !known {
            return Ok(None);
        }

        let path = self.abs_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let mut index = self.index.lock().await;
                if let Some(meta) = index.entries.get_mut(key) {
                    meta.last_access = self.next_tick();
                }
                tracing::debug!(%key, bytes = data.len(), "cache hit");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Index and tree disagree (external deletion); heal the index.
                self.index.lock().await.remove(key);
                Ok(None)
            }
            Err(e) => Err(Error::storage("read entry", e)),
        }
    }

    /// Write an entry atomically, then enforce the budgets.
    ///
    /// An existing entry under the same key is overwritten with fresh
    /// `fetched_at`/`last_access` metadata.
    pub async fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), Error> {
        let staged = self.stage(key).await?;
        if let Err(e) = tokio::fs::write(&staged, bytes).await {
            self.discard(&staged).await;
            return Err(Error::storage("write staging file", e));
        }
        self.commit_file(key, &staged).await?;
        Ok(())
    }

    /// Reserve a staging path for `key` in its final directory, so the
    /// later rename is a same-filesystem atomic commit.
    pub async fn stage(&self, key: &CacheKey) -> Result<PathBuf, Error> {
        self.ensure_available()?;
        let path = self.abs_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage("create entry directory", e))?;
        }
        let mut staged = path.into_os_string();
        staged.push(format!(".part-{}", self.next_tick()));
        Ok(PathBuf::from(staged))
    }

    /// Rename a fully written staging file into place and index it.
    ///
    /// Returns the committed entry size. Only after this returns is the
    /// entry discoverable by `get`/`exists`.
    pub async fn commit_file(&self, key: &CacheKey, staged: &Path) -> Result<u64, Error> {
        self.ensure_available()?;

        let size_bytes = tokio::fs::metadata(staged)
            .await
            .map_err(|e| Error::storage("stat staging file", e))?
            .len();

        let path = self.abs_path(key);
        tokio::fs::rename(staged, &path)
            .await
            .map_err(|e| Error::storage("commit entry", e))?;

        let mut index = self.index.lock().await;
        let meta = EntryMeta { size_bytes, fetched_at: Utc::now(), last_access: self.next_tick() };
        index.insert(key.clone(), meta);
        tracing::debug!(%key, bytes = size_bytes, "entry committed");

        self.evict_locked(&mut index).await;
        Ok(size_bytes)
    }

    /// Remove a staging file that will not be committed.
    pub async fn discard(&self, staged: &Path) {
        if let Err(e) = tokio::fs::remove_file(staged).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::debug!(path = %staged.display(), error = %e, "failed to remove staging file");
        }
    }

    /// Absolute path and size of a committed entry, refreshing its
    /// recency. Used to stream large entries without buffering them.
    pub async fn entry_file(&self, key: &CacheKey) -> Result<Option<(PathBuf, u64)>, Error> {
        self.ensure_available()?;
        let mut index = self.index.lock().await;
        match index.entries.get_mut(key) {
            Some(meta) => {
                meta.last_access = self.next_tick();
                Ok(Some((self.abs_path(key), meta.size_bytes)))
            }
            None => Ok(None),
        }
    }

    pub async fn exists(&self, key: &CacheKey) -> Result<bool, Error> {
        self.ensure_available()?;
        Ok(self.index.lock().await.entries.contains_key(key))
    }

    /// Explicitly invalidate an entry. Returns whether it existed.
    pub async fn remove(&self, key: &CacheKey) -> Result<bool, Error> {
        self.ensure_available()?;
        let mut index = self.index.lock().await;
        if index.remove(key).is_none() {
            return Ok(false);
        }
        let path = self.abs_path(key);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(Error::storage("remove entry", e));
        }
        Ok(true)
    }

    pub async fn size_bytes(&self) -> Result<u64, Error> {
        self.ensure_available()?;
        Ok(self.index.lock().await.total_bytes)
    }

    pub async fn count(&self) -> Result<usize, Error> {
        self.ensure_available()?;
        Ok(self.index.lock().await.entries.len())
    }

    fn over_budget(&self, index: &Index) -> bool {
        if index.total_bytes > self.max_bytes {
            return true;
        }
        matches!(self.max_entries, Some(max) if index.entries.len() > max)
    }

    /// Evict in ascending last-access order until both budgets hold.
    ///
    /// The entry just committed carries the newest access counter, so it is
    /// only ever selected once everything older is already gone.
    async fn evict_locked(&self, index: &mut Index) {
        while self.over_budget(index) {
            let Some(victim) = index.lru_key() else { break };
            let meta = index.remove(&victim);
            let path = self.abs_path(&victim);
            if let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(key = %victim, error = %e, "failed to delete evicted entry");
            }
            tracing::debug!(
                key = %victim,
                bytes = meta.map(|m| m.size_bytes).unwrap_or(0),
                "evicted"
            );
        }
    }
}
