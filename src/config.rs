//! Scraper configuration.
//!
//! All fields have defaults, so an empty document deserializes to
//! [`ScraperConfig::default`]:
//!
//! | field                  | default                                  |
//! |------------------------|------------------------------------------|
//! | `index_url`            | `https://nvd.nist.gov/vuln/data-feeds`   |
//! | `storage_location`     | the OS temporary directory               |
//! | `request_timeout_secs` | 120                                      |
//! | `concurrency`          | 4                                        |
//! | `archive_kind`         | `gz`                                     |
//! | `auto_pull`            | `true`                                   |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NvdError;
use crate::model::ArchiveKind;

/// Page listing every published feed.
pub const DEFAULT_INDEX_URL: &str = "https://nvd.nist.gov/vuln/data-feeds";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Index page scraped by [`NvdFeedScraper::scrape`](crate::NvdFeedScraper::scrape)
    pub index_url: String,

    /// Directory receiving downloaded archives and decompressed JSON files
    pub storage_location: PathBuf,

    /// Upper bound for any single network call
    pub request_timeout_secs: u64,

    /// Maximum number of feeds processed at once by batch operations
    pub concurrency: usize,

    /// Encoding downloaded by `json_pull`
    pub archive_kind: ArchiveKind,

    /// Whether catalog-level CVE lookups pull feeds that are not loaded yet
    pub auto_pull: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            storage_location: std::env::temp_dir(),
            request_timeout_secs: 120,
            concurrency: 4,
            archive_kind: ArchiveKind::Gz,
            auto_pull: true,
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    pub fn with_storage_location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_location = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    pub fn with_archive_kind(mut self, kind: ArchiveKind) -> Self {
        self.archive_kind = kind;
        self
    }

    pub fn with_auto_pull(mut self, auto_pull: bool) -> Self {
        self.auto_pull = auto_pull;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Rejects settings no operation could work with.
    pub fn validate(&self) -> Result<(), NvdError> {
        if self.index_url.trim().is_empty() {
            return Err(NvdError::Configuration("index_url is empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(NvdError::Configuration(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(NvdError::Configuration(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.storage_location.as_os_str().is_empty() {
            return Err(NvdError::Configuration(
                "storage_location is empty".to_string(),
            ));
        }
        Ok(())
    }
}
