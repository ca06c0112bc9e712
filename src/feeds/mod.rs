//! Feed discovery, synchronization and CVE lookups.
//!
//! - **Scraper**: catalog of feeds read from the index page via [`NvdFeedScraper`]
//! - **Feed**: download, verify and index one feed via [`Feed`]
//! - **Descriptors**: `.meta` integrity records via [`Meta`]
//! - **Queries**: identifier validation and lookups via [`CveId`], [`CveQuery`], [`CveIndex`]
//! - **Formats**: gzip/zip decompression and integrity checks in [`formats`]

pub mod feed;
pub mod formats;
pub mod meta;
pub mod query;
pub mod scraper;

#[cfg(test)]
pub(crate) mod testing;

pub use feed::Feed;
pub use meta::Meta;
pub use query::{CveAnswer, CveId, CveIndex, CveQuery};
pub use scraper::{parse_index, NvdFeedScraper};
