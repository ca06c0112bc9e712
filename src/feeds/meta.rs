//! Feed descriptors (`.meta` files).
//!
//! A descriptor is a handful of whitespace separated `key:value` tokens:
//!
//! ```text
//! lastModifiedDate:2017-10-19T03:27:02-04:00
//! size:29443314
//! zipSize:2008493
//! gzSize:2008357
//! sha256:33ED52D451692596D644F23742ED42B4E350258B11ACB900F969F148FCE3777B
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::error::NvdError;
use crate::model::Descriptor;
use crate::traits::Fetcher;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid regex"));
static SHA256: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-F]{64}").expect("valid regex"));

impl Descriptor {
    /// Parses and validates descriptor text.
    ///
    /// Tokens are split on their first colon; a later duplicate key wins and
    /// tokens without a colon are ignored. Size fields only need to contain a
    /// digit run somewhere, and `sha256` a run of 64 uppercase hex digits.
    ///
    /// # Errors
    ///
    /// [`NvdError::DescriptorFormat`] naming the first field, in the order
    /// `lastModifiedDate`, `size`, `zipSize`, `gzSize`, `sha256`, that is
    /// missing or invalid.
    pub fn from_text(text: &str) -> Result<Self, NvdError> {
        let fields: HashMap<&str, &str> = text
            .split_whitespace()
            .filter_map(|token| token.split_once(':'))
            .collect();

        let last_modified_date = fields
            .get("lastModifiedDate")
            .filter(|value| !value.is_empty())
            .ok_or_else(|| NvdError::DescriptorFormat {
                field: "lastModifiedDate",
                message: "no lastModifiedDate attribute found".to_string(),
            })?;
        let size = matching(&fields, "size", &DIGITS)?;
        let zip_size = matching(&fields, "zipSize", &DIGITS)?;
        let gz_size = matching(&fields, "gzSize", &DIGITS)?;
        let sha256 = matching(&fields, "sha256", &SHA256)?;

        Ok(Self {
            last_modified_date: last_modified_date.to_string(),
            size: size.to_string(),
            zip_size: zip_size.to_string(),
            gz_size: gz_size.to_string(),
            sha256: sha256.to_string(),
        })
    }
}

fn matching<'a>(
    fields: &HashMap<&str, &'a str>,
    field: &'static str,
    pattern: &Regex,
) -> Result<&'a str, NvdError> {
    fields
        .get(field)
        .copied()
        .filter(|value| pattern.is_match(value))
        .ok_or_else(|| NvdError::DescriptorFormat {
            field,
            message: format!("no valid {field} attribute found"),
        })
}

/// A descriptor bound to the URL it is fetched from.
///
/// The parsed fields are either all present or all absent. Pointing the
/// descriptor at another URL clears them until the next successful parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    url: Option<String>,
    descriptor: Option<Descriptor>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            descriptor: None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Points the descriptor at `url` and forgets previously parsed fields.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
        self.reset();
    }

    /// Forgets the parsed fields, keeping the URL.
    pub fn reset(&mut self) {
        self.descriptor = None;
    }

    /// Fetches and parses the descriptor at the current URL.
    ///
    /// On failure the previously parsed fields are kept.
    ///
    /// # Errors
    ///
    /// - [`NvdError::Configuration`] if no URL is set
    /// - [`NvdError::Fetch`] on transport failure
    /// - [`NvdError::DescriptorFormat`] on invalid content
    #[instrument(skip(self, fetcher), fields(url = ?self.url))]
    pub async fn parse(&mut self, fetcher: &dyn Fetcher) -> Result<(), NvdError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| NvdError::Configuration("can't parse if the URL is empty".into()))?;

        let text = fetcher.fetch_text(url).await?;
        let descriptor = Descriptor::from_text(&text)?;
        debug!(sha256 = %descriptor.sha256, size = %descriptor.size, "Descriptor parsed");

        self.descriptor = Some(descriptor);
        Ok(())
    }

    /// Sets the URL, then fetches and parses it.
    pub async fn parse_url(
        &mut self,
        fetcher: &dyn Fetcher,
        url: impl Into<String>,
    ) -> Result<(), NvdError> {
        self.set_url(url);
        self.parse(fetcher).await
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_parsed(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn last_modified_date(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.last_modified_date.as_str())
    }

    pub fn size(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.size.as_str())
    }

    pub fn zip_size(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.zip_size.as_str())
    }

    pub fn gz_size(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.gz_size.as_str())
    }

    pub fn sha256(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.sha256.as_str())
    }
}
