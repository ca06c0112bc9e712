//! [`Fetcher`] implementations.
//!
//! - [`HttpFetcher`]: plain HTTP(S) over `reqwest` with a per-request timeout
//! - [`MemoryFetcher`]: URL → body map, for offline mirrors and fixtures

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::traits::{FetchError, Fetcher};

/// Fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests fail once `timeout` elapses.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nvd-feed-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(url, "GET");
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        debug!(url, bytes = body.len(), "Fetched");
        Ok(body.to_vec())
    }
}

/// Serves bodies from memory instead of the network.
///
/// Bodies can be replaced at any time, which makes it possible to simulate an
/// upstream publishing a new revision between two calls. Every request is
/// counted, found or not.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the body served for `url`.
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), body.into());
    }

    /// Stops serving `url`; later requests fail with [`FetchError::NotFound`].
    pub fn remove(&self, url: &str) {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Number of requests made for `url` so far.
    pub fn hits(&self, url: &str) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self
            .hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_insert(0) += 1;

        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}
