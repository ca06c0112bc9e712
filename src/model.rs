use serde::{Deserialize, Serialize};

/// One raw vulnerability entry of a feed (`CVE_Items[n]`), kept opaque.
pub type CveRecord = serde_json::Value;

/// Integrity attributes published in a feed's `.meta` file.
///
/// Sizes are kept exactly as published (digit-bearing strings); use the
/// `*_bytes` helpers for arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// e.g. `2017-10-19T03:27:02-04:00`
    pub last_modified_date: String,
    /// Size of the uncompressed JSON document
    pub size: String,
    pub zip_size: String,
    pub gz_size: String,
    /// SHA-256 of the uncompressed JSON document, uppercase hex
    pub sha256: String,
}

impl Descriptor {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.parse().ok()
    }

    pub fn gz_size_bytes(&self) -> Option<u64> {
        self.gz_size.parse().ok()
    }

    pub fn zip_size_bytes(&self) -> Option<u64> {
        self.zip_size.parse().ok()
    }

    /// Published size of the archive in the given encoding.
    pub fn archive_size(&self, kind: ArchiveKind) -> &str {
        match kind {
            ArchiveKind::Gz => &self.gz_size,
            ArchiveKind::Zip => &self.zip_size,
        }
    }

    /// Whether both descriptors describe the same content (hash and sizes).
    /// The modification date is ignored.
    pub fn same_content(&self, other: &Descriptor) -> bool {
        self.sha256 == other.sha256
            && self.size == other.size
            && self.gz_size == other.gz_size
            && self.zip_size == other.zip_size
    }
}

/// The two archive encodings each feed is published in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// `.json.gz`, the smaller one
    #[default]
    Gz,
    /// `.json.zip`
    Zip,
}

impl ArchiveKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Gz => ".gz",
            ArchiveKind::Zip => ".zip",
        }
    }
}

/// A feed row as read from the index page, before it becomes a [`Feed`](crate::Feed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub name: String, // e.g. "CVE-2010", "CVE-Modified"
    pub updated: String,
    pub meta_url: String,
    pub gz_url: String,
    pub zip_url: String,
}
