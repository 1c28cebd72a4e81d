//! Tile retrieval.
//!
//! The streamer only knows tile locators; how bytes are retrieved is behind
//! the [`TileFetcher`] trait so hosts can plug in their own transport and
//! tests can use mocks.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use super::error::TileFetchError;

/// Boxed future type for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default HTTP request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of encoded tile bytes.
///
/// Implementations must be cheap to share: one instance serves every
/// concurrent fetch of a scene.
pub trait TileFetcher: Send + Sync {
    /// Retrieve the encoded bytes at `locator`.
    fn fetch(&self, locator: &str) -> BoxFuture<'_, Result<Bytes, TileFetchError>>;
}

/// Fetches tiles over HTTP(S).
///
/// Absolute `http://` and `https://` locators are requested as-is; relative
/// locators are resolved against the optional base URL.
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
    auth_token: Option<String>,
}

impl HttpTileFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self, TileFetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TileFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TileFetchError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
            auth_token: None,
        }
    }

    /// Resolve relative locators against `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Attach a bearer token to every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Full URL for a locator.
    pub fn resolve_url(&self, locator: &str) -> String {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return locator.to_string();
        }
        match &self.base_url {
            Some(base) => crate::manifest::join_locator(base, locator),
            None => locator.to_string(),
        }
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, locator: &str) -> BoxFuture<'_, Result<Bytes, TileFetchError>> {
        let url = self.resolve_url(locator);
        Box::pin(async move {
            let mut request = self.client.get(&url);
            if let Some(token) = &self.auth_token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| TileFetchError::Network(format!("Request to {} failed: {}", url, e)))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(TileFetchError::NotFound(url));
            }
            if !status.is_success() {
                return Err(TileFetchError::Network(format!("HTTP {} from {}", status, url)));
            }

            response
                .bytes()
                .await
                .map_err(|e| TileFetchError::Network(format!("Failed to read {}: {}", url, e)))
        })
    }
}

/// Fetches tiles from a local directory.
///
/// Locators are interpreted relative to the root; a leading `/` or
/// `file://` is ignored and parent components are rejected.
#[derive(Debug, Clone)]
pub struct FileTileFetcher {
    root: PathBuf,
}

impl FileTileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path on disk for a locator, or `None` if it would leave the root.
    pub fn resolve_path(&self, locator: &str) -> Option<PathBuf> {
        let relative = locator.trim_start_matches("file://").trim_start_matches('/');
        let relative = Path::new(relative);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl TileFetcher for FileTileFetcher {
    fn fetch(&self, locator: &str) -> BoxFuture<'_, Result<Bytes, TileFetchError>> {
        let locator = locator.to_string();
        Box::pin(async move {
            let path = self
                .resolve_path(&locator)
                .ok_or_else(|| TileFetchError::NotFound(format!("{} is outside the tile root", locator)))?;

            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(TileFetchError::NotFound(path.display().to_string()))
                }
                Err(e) => Err(TileFetchError::Network(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))),
            }
        })
    }
}
