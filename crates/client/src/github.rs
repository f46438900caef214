//! Mapping from the GitHub `releases/latest` payload to the station's
//! release model.
//!
//! Only the handful of fields the station needs are deserialized. Assets
//! the classifier cannot place (checksum lists, signatures, source
//! tarballs) are dropped here so the rest of the service never sees them.

use fieldpost_core::{AssetKind, Error, Release, ReleaseAsset};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ApiRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<ApiAsset>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Parse a `releases/latest` response body.
pub fn parse_release(body: &[u8]) -> Result<Release, Error> {
    let api: ApiRelease = serde_json::from_slice(body)
        .map_err(|e| Error::UpstreamUnavailable(format!("parse release metadata: {e}")))?;

    let version = api.tag_name.strip_prefix('v').unwrap_or(&api.tag_name).to_string();

    let assets = api
        .assets
        .into_iter()
        .filter_map(|asset| {
            let kind = AssetKind::from_filename(&asset.name);
            if kind == AssetKind::Unknown {
                tracing::debug!(filename = %asset.name, "skipping unclassified release asset");
                return None;
            }
            Some(ReleaseAsset {
                kind,
                filename: asset.name,
                download_url: asset.browser_download_url,
                size_bytes: asset.size,
            })
        })
        .collect();

    let name = api.name.unwrap_or_else(|| api.tag_name.clone());

    Ok(Release {
        version,
        tag_name: api.tag_name,
        name,
        published_at: api.published_at.unwrap_or_default(),
        html_url: api.html_url.unwrap_or_default(),
        assets,
    })
}
