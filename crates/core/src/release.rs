//! Release data model for the update mirror.
//!
//! A `Release` is the process-wide snapshot of the latest known software
//! release. The background refresh task replaces it atomically; request
//! handlers only ever read it. It is also persisted as `release.json`
//! under the cache root so a rebooted station serves updates before the
//! upstream link comes back.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classification of a release asset by filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    AndroidApk,
    AndroidAab,
    LinuxDesktop,
    LinuxCli,
    WindowsDesktop,
    MacosDesktop,
    IosUnsigned,
    Web,
    Unknown,
}

impl AssetKind {
    /// Classify an asset from its filename.
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".apk") {
            AssetKind::AndroidApk
        } else if lower.ends_with(".aab") {
            AssetKind::AndroidAab
        } else if lower.contains("linux") && lower.contains(".tar.gz") {
            if lower.contains("cli") { AssetKind::LinuxCli } else { AssetKind::LinuxDesktop }
        } else if lower.contains("windows") || lower.ends_with(".exe") || (lower.ends_with(".zip") && lower.contains("win")) {
            AssetKind::WindowsDesktop
        } else if lower.contains("macos") || lower.contains("darwin") || lower.ends_with(".dmg") {
            AssetKind::MacosDesktop
        } else if lower.ends_with(".ipa") {
            AssetKind::IosUnsigned
        } else if lower.contains("web") {
            AssetKind::Web
        } else {
            AssetKind::Unknown
        }
    }
}

/// State of the update mirror as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Available,
    NoUpdatesCached,
    Unknown,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub filename: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(rename = "sizeBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// The latest known software release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    #[serde(rename = "tagName")]
    pub tag_name: String,
    pub name: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    #[serde(rename = "htmlUrl", default)]
    pub html_url: String,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Find an asset by exact version + filename match.
    pub fn find_asset(&self, version: &str, filename: &str) -> Option<&ReleaseAsset> {
        if self.version != version {
            return None;
        }
        self.assets.iter().find(|a| a.filename == filename)
    }

    /// Device-local download path for one of this release's assets.
    pub fn local_url(&self, asset: &ReleaseAsset) -> String {
        format!("/updates/{}/{}", self.version, asset.filename)
    }

    /// Persist the snapshot beside the mirrored assets.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::StorageUnavailable(format!("encode release snapshot: {e}")))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage("create snapshot directory", e))?;
        }
        let staged = path.with_extension("json.part");
        tokio::fs::write(&staged, &json)
            .await
            .map_err(|e| Error::storage("write release snapshot", e))?;
        tokio::fs::rename(&staged, path)
            .await
            .map_err(|e| Error::storage("commit release snapshot", e))?;
        Ok(())
    }

    /// Load a previously persisted snapshot; `None` when absent.
    pub async fn load(path: &Path) -> Result<Option<Release>, Error> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage("read release snapshot", e)),
        };
        let release = serde_json::from_slice(&bytes)
            .map_err(|e| Error::StorageUnavailable(format!("parse release snapshot: {e}")))?;
        Ok(Some(release))
    }
}

/// Wire shape of `GET /api/updates/latest`.
///
/// With no cached release only `status` is present; otherwise the asset
/// `url`s point at this station, not at the upstream host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestRelease {
    pub status: UpdateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "tagName", skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "publishedAt", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(rename = "htmlUrl", skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<LatestAsset>>,
}

/// One asset entry in the `LatestRelease` wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestAsset {
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub filename: String,
    pub url: String,
    #[serde(rename = "sizeBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl LatestRelease {
    pub fn from_snapshot(snapshot: Option<&Release>) -> Self {
        match snapshot {
            None => LatestRelease {
                status: UpdateStatus::NoUpdatesCached,
                version: None,
                tag_name: None,
                name: None,
                published_at: None,
                html_url: None,
                assets: None,
            },
            Some(release) => {
                let assets = release
                    .assets
                    .iter()
                    .map(|a| LatestAsset {
                        kind: a.kind,
                        filename: a.filename.clone(),
                        url: release.local_url(a),
                        size_bytes: a.size_bytes,
                    })
                    .collect();
                LatestRelease {
                    status: UpdateStatus::Available,
                    version: Some(release.version.clone()),
                    tag_name: Some(release.tag_name.clone()),
                    name: Some(release.name.clone()),
                    published_at: Some(release.published_at.clone()),
                    html_url: Some(release.html_url.clone()),
                    assets: Some(assets),
                }
            }
        }
    }
}

/// Content type served for an asset download, by filename.
pub fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".apk") {
        "application/vnd.android.package-archive"
    } else if lower.ends_with(".zip") {
        "application/zip"
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        "application/gzip"
    } else if lower.ends_with(".dmg") {
        "application/x-apple-diskimage"
    } else {
        "application/octet-stream"
    }
}
