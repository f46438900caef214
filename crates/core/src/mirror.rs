//! Mirror-sync: keep the flasher directory in step with newly fetched
//! binaries without redundant writes.
//!
//! The external flashing tool polls a descriptor file (`device.json`) for
//! freshness and reads the canonical binary beside it. Two rules follow:
//!
//! 1. Identical candidate bytes are a no-op. Rewriting the same content
//!    would bump the descriptor and falsely signal a new version.
//! 2. On a real change, the binary is committed before the descriptor is
//!    rewritten, so a poller never pairs a fresh timestamp with stale
//!    content.

use crate::error::Error;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

const DESCRIPTOR_FILE: &str = "device.json";
const COMPARE_CHUNK: usize = 64 * 1024;

/// Freshness descriptor persisted beside the mirrored binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// UTC, second precision, ISO-8601 with `Z` suffix.
    pub modified_at: String,
}

impl DeviceDescriptor {
    pub fn now() -> Self {
        Self { modified_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true) }
    }
}

/// Handle on the secondary mirror directory.
#[derive(Debug, Clone)]
pub struct MirrorSync {
    root: PathBuf,
}

impl MirrorSync {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_FILE)
    }

    /// Sync `candidate` into the mirror under `name`.
    ///
    /// Returns `true` when the mirrored copy (and descriptor) were
    /// updated, `false` when the candidate was byte-identical and nothing
    /// was written.
    pub async fn sync(&self, name: &str, candidate: &Path) -> Result<bool, Error> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::storage("create mirror root", e))?;

        let target = self.root.join(name);
        if files_identical(candidate, &target).await? {
            tracing::debug!(name, "mirror already current, skipping write");
            return Ok(false);
        }

        let staged = self.root.join(format!("{name}.part"));
        tokio::fs::copy(candidate, &staged)
            .await
            .map_err(|e| Error::storage("stage mirror binary", e))?;
        tokio::fs::rename(&staged, &target)
            .await
            .map_err(|e| Error::storage("commit mirror binary", e))?;

        // Content is durable; only now may the freshness signal move.
        self.write_descriptor(&DeviceDescriptor::now()).await?;

        tracing::info!(name, "mirror updated");
        Ok(true)
    }

    async fn write_descriptor(&self, descriptor: &DeviceDescriptor) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| Error::StorageUnavailable(format!("encode descriptor: {e}")))?;
        let path = self.descriptor_path();
        let staged = self.root.join(format!("{DESCRIPTOR_FILE}.part"));
        tokio::fs::write(&staged, &json)
            .await
            .map_err(|e| Error::storage("write descriptor", e))?;
        tokio::fs::rename(&staged, &path)
            .await
            .map_err(|e| Error::storage("commit descriptor", e))?;
        Ok(())
    }

    /// Read the current descriptor; `None` before the first sync.
    pub async fn read_descriptor(&self) -> Result<Option<DeviceDescriptor>, Error> {
        let bytes = match tokio::fs::read(self.descriptor_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage("read descriptor", e)),
        };
        let descriptor = serde_json::from_slice(&bytes)
            .map_err(|e| Error::StorageUnavailable(format!("parse descriptor: {e}")))?;
        Ok(Some(descriptor))
    }
}

/// Chunked byte-for-byte comparison; a missing `existing` file is simply
/// not identical.
async fn files_identical(candidate: &Path, existing: &Path) -> Result<bool, Error> {
    let existing_meta = match tokio::fs::metadata(existing).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::storage("stat mirrored binary", e)),
    };
    let candidate_meta = tokio::fs::metadata(candidate)
        .await
        .map_err(|e| Error::storage("stat candidate binary", e))?;
    if existing_meta.len() != candidate_meta.len() {
        return Ok(false);
    }

    let mut a = tokio::fs::File::open(candidate)
        .await
        .map_err(|e| Error::storage("open candidate binary", e))?;
    let mut b = tokio::fs::File::open(existing)
        .await
        .map_err(|e| Error::storage("open mirrored binary", e))?;

    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];
    loop {
        let n = a.read(&mut buf_a).await.map_err(|e| Error::storage("read candidate binary", e))?;
        if n == 0 {
            return Ok(true);
        }
        b.read_exact(&mut buf_b[..n])
            .await
            .map_err(|e| Error::storage("read mirrored binary", e))?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}
