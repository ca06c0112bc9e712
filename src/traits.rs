use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },
    #[error("No resource available at {0}")]
    NotFound(String),
}

impl FetchError {
    /// URL of the request that failed.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. } | FetchError::Status { url, .. } => url,
            FetchError::NotFound(url) => url,
        }
    }
}

/// Retrieves raw resources (index page, descriptors, archives) by URL.
///
/// Implementations must treat any non-success outcome, including a timeout,
/// as an error. Nothing is retried by the callers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the full body behind `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetches `url` and decodes the body as UTF-8, replacing invalid sequences.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
