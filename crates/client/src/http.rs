//! HTTP implementation of [`UpstreamFetcher`] over reqwest.
//!
//! Each call gets a bounded number of attempts with linearly increasing
//! backoff. Transient failures (timeout, connect error, reset, upstream
//! 5xx) are retried; anything the upstream answered deliberately (4xx) is
//! permanent and fails immediately.

use crate::{ByteStream, UpstreamFetcher, github};
use async_trait::async_trait;
use bytes::Bytes;
use fieldpost_core::{AppConfig, Error, Release, TileLayer};
use futures_util::TryStreamExt;
use std::time::Duration;

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub tile_timeout: Duration,
    pub metadata_timeout: Duration,
    pub asset_timeout: Duration,
    /// Total attempts per call, first try included.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    pub max_tile_bytes: usize,
    pub standard_tile_url: String,
    pub satellite_tile_url: String,
    pub release_api_url: String,
}

impl From<&AppConfig> for FetcherConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            tile_timeout: config.tile_timeout(),
            metadata_timeout: config.metadata_timeout(),
            asset_timeout: config.asset_timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            max_tile_bytes: config.max_tile_bytes,
            standard_tile_url: config.standard_tile_url.clone(),
            satellite_tile_url: config.satellite_tile_url.clone(),
            release_api_url: config.release_api_url.clone(),
        }
    }
}

/// Outcome classification driving the retry loop.
enum Attempt {
    Transient(Error),
    Permanent(Error),
}

/// Upstream HTTP client.
pub struct HttpFetcher {
    http: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn tile_url(&self, zoom: u8, x: u32, y: u32, layer: TileLayer) -> String {
        let template = match layer {
            TileLayer::Standard => &self.config.standard_tile_url,
            TileLayer::Satellite => &self.config.satellite_tile_url,
        };
        template
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    async fn try_get(
        &self,
        url: &str,
        timeout: Duration,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, Attempt> {
        let mut request = self.http.get(url).timeout(timeout);
        if let Some(accept) = accept {
            request = request.header("Accept", accept);
        }
        let response = request
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Attempt::Transient(Error::UpstreamTimeout(format!("{url}: {e}")))
                } else {
                    Attempt::Transient(Error::UpstreamUnavailable(format!("{url}: {e}")))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Attempt::Transient(Error::UpstreamUnavailable(format!(
                "{url}: status {}",
                status.as_u16()
            ))));
        }
        if !status.is_success() {
            return Err(Attempt::Permanent(Error::UpstreamUnavailable(format!(
                "{url}: status {}",
                status.as_u16()
            ))));
        }
        Ok(response)
    }

    /// GET with bounded retries; returns the last error once attempts are
    /// exhausted.
    async fn get_with_retry(
        &self,
        url: &str,
        timeout: Duration,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_get(url, timeout, accept).await {
                Ok(response) => return Ok(response),
                Err(Attempt::Permanent(e)) => return Err(e),
                Err(Attempt::Transient(e)) => {
                    if attempt >= self.config.max_retries {
                        tracing::debug!(url, attempt, error = %e, "upstream attempts exhausted");
                        return Err(e);
                    }
                    let backoff = self.config.retry_backoff * attempt;
                    tracing::debug!(url, attempt, backoff_ms = backoff.as_millis() as u64, "retrying upstream fetch");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch_tile(&self, zoom: u8, x: u32, y: u32, layer: TileLayer) -> Result<Bytes, Error> {
        let url = self.tile_url(zoom, x, y, layer);
        tracing::debug!(%url, "fetching tile");

        let response = self.get_with_retry(&url, self.config.tile_timeout, None).await?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_tile_bytes
        {
            return Err(Error::ValidationFailed(format!(
                "tile {zoom}/{x}/{y}: {len} bytes exceeds {}",
                self.config.max_tile_bytes
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{url}: read body: {e}")))?;

        if bytes.len() > self.config.max_tile_bytes {
            return Err(Error::ValidationFailed(format!(
                "tile {zoom}/{x}/{y}: {} bytes exceeds {}",
                bytes.len(),
                self.config.max_tile_bytes
            )));
        }

        tracing::debug!(zoom, x, y, layer = %layer, bytes = bytes.len(), "tile downloaded");
        Ok(bytes)
    }

    async fn fetch_release_metadata(&self) -> Result<Release, Error> {
        let url = &self.config.release_api_url;
        tracing::debug!(%url, "fetching release metadata");

        let response = self
            .get_with_retry(url, self.config.metadata_timeout, Some("application/vnd.github+json"))
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{url}: read body: {e}")))?;

        github::parse_release(&bytes)
    }

    async fn fetch_asset(&self, url: &str) -> Result<ByteStream, Error> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::UpstreamUnavailable(format!("bad asset url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::UpstreamUnavailable(format!("unsupported asset url scheme: {url}")));
        }

        tracing::info!(%url, "downloading asset");
        let response = self.get_with_retry(url, self.config.asset_timeout, None).await?;

        let owned = url.to_string();
        let stream = response
            .bytes_stream()
            .map_err(move |e| Error::UpstreamUnavailable(format!("{owned}: stream body: {e}")));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config() -> FetcherConfig {
        FetcherConfig::from(&AppConfig::default())
    }

    /// Minimal upstream that answers each connection with the next
    /// scripted status, counting the requests it sees.
    async fn scripted_upstream(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (base, hits)
    }

    fn local_config(base: &str) -> FetcherConfig {
        let mut config = config();
        config.retry_backoff = Duration::from_millis(10);
        config.standard_tile_url = format!("{base}/{{z}}/{{x}}/{{y}}.png");
        config.release_api_url = format!("{base}/releases/latest");
        config
    }

    #[tokio::test]
    async fn test_transient_5xx_is_retried_until_success() {
        let (base, hits) =
            scripted_upstream(vec![(500, ""), (200, "tile-bytes")]).await;
        let fetcher = HttpFetcher::new(local_config(&base)).unwrap();

        let bytes = fetcher.fetch_tile(1, 0, 0, TileLayer::Standard).await.unwrap();
        assert_eq!(&bytes[..], b"tile-bytes");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_release_metadata_retries_transient_failures() {
        let (base, hits) =
            scripted_upstream(vec![(500, ""), (200, r#"{"tag_name": "v1.0.0"}"#)]).await;
        let fetcher = HttpFetcher::new(local_config(&base)).unwrap();

        let release = fetcher.fetch_release_metadata().await.unwrap();
        assert_eq!(release.version, "1.0.0");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_4xx_fails_without_retry() {
        let (base, hits) = scripted_upstream(vec![(404, "gone")]).await;
        let fetcher = HttpFetcher::new(local_config(&base)).unwrap();

        let result = fetcher.fetch_tile(1, 0, 0, TileLayer::Standard).await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_stop_at_max_retries() {
        let (base, hits) = scripted_upstream(vec![(503, ""), (503, ""), (503, ""), (503, "")]).await;
        let fetcher = HttpFetcher::new(local_config(&base)).unwrap();

        let result = fetcher.fetch_tile(1, 0, 0, TileLayer::Standard).await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fetcher_config_from_app_config() {
        let config = config();
        assert_eq!(config.user_agent, "Fieldpost-Station/1.0");
        assert_eq!(config.tile_timeout, Duration::from_millis(15_000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_tile_bytes, 128 * 1024);
    }

    #[test]
    fn test_tile_url_standard_order() {
        let fetcher = HttpFetcher::new(config()).unwrap();
        let url = fetcher.tile_url(5, 16, 11, TileLayer::Standard);
        assert_eq!(url, "https://tile.openstreetmap.org/5/16/11.png");
    }

    #[test]
    fn test_tile_url_satellite_order() {
        // Esri swaps to z/y/x.
        let fetcher = HttpFetcher::new(config()).unwrap();
        let url = fetcher.tile_url(5, 16, 11, TileLayer::Satellite);
        assert!(url.ends_with("/tile/5/11/16"));
    }

    #[tokio::test]
    async fn test_fetch_asset_rejects_non_http_url() {
        let fetcher = HttpFetcher::new(config()).unwrap();
        let result = fetcher.fetch_asset("file:///etc/passwd").await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }
}
