//! Error type shared by the scraper, feeds and query engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::traits::FetchError;

/// Everything that can go wrong while scraping, pulling or querying feeds.
#[derive(Error, Debug)]
pub enum NvdError {
    /// The index page does not have the expected feed table layout
    #[error("Scrape failed: {0}")]
    Scrape(String),

    /// A descriptor field is missing or does not match its pattern
    #[error("{message}")]
    DescriptorFormat { field: &'static str, message: String },

    /// Operation attempted without a required URL or setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Downloaded content disagrees with its descriptor
    #[error("Integrity check failed on {field}: expected {expected}, got {actual}")]
    Integrity {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("bad CVE name: {0}")]
    MalformedIdentifier(String),

    /// Identifiers whose year has no feed in the catalog
    #[error("bad CVE year in {ids:?}")]
    UnknownYear { ids: Vec<String> },

    /// Identifiers that passed validation but are absent from their feed
    #[error("{} are unexisting CVEs in this feed", .ids.join(", "))]
    UnknownCve { ids: Vec<String> },

    /// Query made before the data it needs was pulled
    #[error("{0} is not loaded yet")]
    NotLoaded(String),

    #[error("the provided argument ({0}) is neither a string nor an array of strings")]
    InvalidArgument(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Archive could not be decompressed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Decompressed JSON does not have the feed layout
    #[error("Unexpected feed payload: {0}")]
    Payload(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A background task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),

    /// Some items of a batch update failed; the others completed.
    ///
    /// `changed` is aligned with the input: `Some(flag)` for every feed that
    /// was checked (its fresh descriptor is already recorded), `None` for the
    /// ones listed in `failures`.
    #[error("Update failed for {}", format_failures(.failures))]
    UpdateFailed {
        failures: Vec<(String, String)>,
        changed: Vec<Option<bool>>,
    },
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(feed, reason)| format!("{feed} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl NvdError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NvdError::Io {
            path: path.into(),
            source,
        }
    }
}
