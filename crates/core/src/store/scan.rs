//! Startup scan: rebuild the store index from the on-disk tree.

use crate::key::{CacheKey, TileLayer};
use chrono::{DateTime, Utc};
use std::path::Path;
use walkdir::WalkDir;

/// Create the directory layout the key model expects.
pub(super) async fn prepare_layout(root: &Path) -> std::io::Result<()> {
    for sub in ["tiles/standard", "tiles/satellite", "updates"] {
        tokio::fs::create_dir_all(root.join(sub)).await?;
    }
    Ok(())
}

/// Walk the cache tree and recover every committed entry.
///
/// Leftover staging files from an interrupted download are deleted rather
/// than indexed; they were never visible as entries.
pub(super) fn scan(root: &Path) -> Vec<(CacheKey, u64, DateTime<Utc>)> {
    let mut entries = Vec::new();

    for result in WalkDir::new(root).min_depth(1) {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path during scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.starts_with("part-"))
        {
            tracing::debug!(path = %path.display(), "removing leftover staging file");
            let _ = std::fs::remove_file(path);
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else { continue };
        let Some(key) = key_from_relative(relative) else {
            tracing::debug!(path = %path.display(), "unrecognized file in cache tree");
            continue;
        };

        let Ok(meta) = entry.metadata() else { continue };
        let fetched_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        entries.push((key, meta.len(), fetched_at));
    }

    entries
}

/// Parse a relative cache path back into its key, or None for strays.
fn key_from_relative(relative: &Path) -> Option<CacheKey> {
    let parts: Vec<&str> = relative.iter().map(|c| c.to_str().unwrap_or("")).collect();

    match parts.as_slice() {
        ["tiles", layer, z, x, y_png] => {
            let layer = match *layer {
                "standard" => TileLayer::Standard,
                "satellite" => TileLayer::Satellite,
                _ => return None,
            };
            let zoom: u8 = z.parse().ok()?;
            let x: u32 = x.parse().ok()?;
            let y: u32 = y_png.strip_suffix(".png")?.parse().ok()?;
            Some(CacheKey::tile(zoom, x, y, layer))
        }
        ["updates", version, filename] => Some(CacheKey::asset(*version, *filename)),
        _ => None,
    }
}
