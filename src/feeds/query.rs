//! CVE identifiers, lookup requests and the per-feed CVE index.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::NvdError;
use crate::model::CveRecord;

static CVE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^CVE-[0-9]{4}-[0-9]{4,}$").expect("valid regex"));

/// A syntactically valid CVE identifier, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CveId(String);

impl CveId {
    /// Validates `raw` against `CVE-YYYY-NNNN[N...]`, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, NvdError> {
        if !CVE_ID.is_match(raw) {
            return Err(NvdError::MalformedIdentifier(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// Validates every identifier, failing on the first malformed one.
    pub fn parse_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<Self>, NvdError> {
        raws.iter().map(|raw| Self::parse(raw.as_ref())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The four-digit year embedded in the identifier.
    pub fn year(&self) -> &str {
        &self.0[4..8]
    }

    /// Name of the yearly feed this identifier belongs to, e.g. `CVE-2014`.
    pub fn feed_name(&self) -> String {
        format!("CVE-{}", self.year())
    }
}

impl FromStr for CveId {
    type Err = NvdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CveId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A lookup request whose shape is only known at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CveQuery {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for CveQuery {
    fn from(id: &str) -> Self {
        CveQuery::One(id.to_string())
    }
}

impl From<String> for CveQuery {
    fn from(id: String) -> Self {
        CveQuery::One(id)
    }
}

impl From<Vec<String>> for CveQuery {
    fn from(ids: Vec<String>) -> Self {
        CveQuery::Many(ids)
    }
}

impl From<&[&str]> for CveQuery {
    fn from(ids: &[&str]) -> Self {
        CveQuery::Many(ids.iter().map(|id| id.to_string()).collect())
    }
}

impl TryFrom<&Value> for CveQuery {
    type Error = NvdError;

    /// Accepts a string or an array of strings.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(id) => Ok(CveQuery::One(id.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(CveQuery::Many)
                .ok_or_else(|| NvdError::InvalidArgument(value.to_string())),
            other => Err(NvdError::InvalidArgument(other.to_string())),
        }
    }
}

/// Result of a [`CveQuery`], mirroring its shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CveAnswer {
    One(Option<CveRecord>),
    Many(Vec<CveRecord>),
}

impl CveAnswer {
    pub fn into_vec(self) -> Vec<CveRecord> {
        match self {
            CveAnswer::One(record) => record.into_iter().collect(),
            CveAnswer::Many(records) => records,
        }
    }
}

/// Records of one feed keyed by their identifier, in document order.
#[derive(Debug, Clone, Default)]
pub struct CveIndex {
    ids: Vec<String>,
    records: HashMap<String, CveRecord>,
}

impl CveIndex {
    /// Builds the index from a decompressed feed document.
    ///
    /// Each entry of `CVE_Items` is keyed by `cve.CVE_data_meta.ID`, uppercased.
    /// Entries without an identifier are skipped. When an identifier occurs
    /// more than once, the first item is kept both in order and in content.
    pub fn from_document(document: Value) -> Result<Self, NvdError> {
        let Value::Object(mut root) = document else {
            return Err(NvdError::Payload("document is not a JSON object".to_string()));
        };
        let Some(Value::Array(items)) = root.remove("CVE_Items") else {
            return Err(NvdError::Payload("no CVE_Items array".to_string()));
        };

        let mut index = Self::default();
        let mut skipped = 0usize;
        for item in items {
            let Some(id) = item
                .pointer("/cve/CVE_data_meta/ID")
                .and_then(Value::as_str)
                .map(str::to_ascii_uppercase)
            else {
                skipped += 1;
                continue;
            };
            match index.records.entry(id) {
                Entry::Occupied(taken) => {
                    warn!(id = %taken.key(), "Duplicate CVE item, keeping the first one");
                }
                Entry::Vacant(slot) => {
                    index.ids.push(slot.key().clone());
                    slot.insert(item);
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, "CVE items without CVE_data_meta.ID");
        }
        Ok(index)
    }

    pub fn from_slice(json: &[u8]) -> Result<Self, NvdError> {
        Self::from_document(serde_json::from_slice(json)?)
    }

    pub fn get(&self, id: &CveId) -> Option<&CveRecord> {
        self.records.get(id.as_str())
    }

    /// Identifiers in document order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Looks up one identifier; a valid but unknown one yields `None`.
    pub fn lookup(&self, raw: &str) -> Result<Option<CveRecord>, NvdError> {
        let id = CveId::parse(raw)?;
        Ok(self.get(&id).cloned())
    }

    /// Looks up several identifiers, keeping input order.
    ///
    /// # Errors
    ///
    /// - [`NvdError::MalformedIdentifier`] for the first malformed identifier
    /// - [`NvdError::UnknownCve`] listing every identifier not in the index
    pub fn lookup_many<S: AsRef<str>>(&self, raws: &[S]) -> Result<Vec<CveRecord>, NvdError> {
        let ids = CveId::parse_all(raws)?;
        let (found, missing) = self.partition(&ids);
        if !missing.is_empty() {
            return Err(NvdError::UnknownCve { ids: missing });
        }
        Ok(found)
    }

    pub(crate) fn partition(&self, ids: &[CveId]) -> (Vec<CveRecord>, Vec<String>) {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.get(id) {
                Some(record) => found.push(record.clone()),
                None => missing.push(id.to_string()),
            }
        }
        (found, missing)
    }
}
