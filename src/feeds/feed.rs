//! One downloadable feed and its local state.
//!
//! A [`Feed`] starts as a bare set of URLs scraped from the index page.
//! Pulling it fills in, one step at a time:
//! 1. the last recorded descriptor ([`Feed::meta_pull`], [`Feed::check_for_update`])
//! 2. the downloaded archive ([`Feed::download_gz`], [`Feed::download_zip`])
//! 3. the decompressed JSON file and the CVE index ([`Feed::json_pull`])
//!
//! # Concurrency
//!
//! Mutating operations on the same feed are serialized by an internal lock,
//! so at most one of them is in flight. Readers never wait on a download:
//! the new state is computed first and swapped in with a single write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::NvdError;
use crate::feeds::formats;
use crate::feeds::meta::Meta;
use crate::feeds::query::{CveAnswer, CveId, CveIndex, CveQuery};
use crate::model::{ArchiveKind, CveRecord, FeedEntry};
use crate::traits::Fetcher;

#[derive(Debug, Default)]
struct FeedState {
    meta: Option<Meta>,
    archive_file: Option<PathBuf>,
    json_file: Option<PathBuf>,
    index: Option<Arc<CveIndex>>,
}

pub struct Feed {
    name: String,
    updated: String,
    meta_url: String,
    gz_url: String,
    zip_url: String,

    /// Default directory for downloads (per-call overrides via `*_in`)
    storage_location: PathBuf,

    /// Encoding fetched by `json_pull`
    archive_kind: ArchiveKind,

    fetcher: Arc<dyn Fetcher>,
    op_lock: Mutex<()>,
    state: RwLock<FeedState>,
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("name", &self.name)
            .field("updated", &self.updated)
            .field("meta_url", &self.meta_url)
            .field("gz_url", &self.gz_url)
            .field("zip_url", &self.zip_url)
            .field("storage_location", &self.storage_location)
            .finish_non_exhaustive()
    }
}

impl Feed {
    pub(crate) fn from_entry(
        entry: FeedEntry,
        storage_location: PathBuf,
        archive_kind: ArchiveKind,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            name: entry.name,
            updated: entry.updated,
            meta_url: entry.meta_url,
            gz_url: entry.gz_url,
            zip_url: entry.zip_url,
            storage_location,
            archive_kind,
            fetcher,
            op_lock: Mutex::new(()),
            state: RwLock::new(FeedState::default()),
        }
    }

    /// Feed name as published, e.g. `CVE-2010` or `CVE-Modified`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// "Last updated" label as published; not parsed.
    pub fn updated(&self) -> &str {
        &self.updated
    }

    pub fn meta_url(&self) -> &str {
        &self.meta_url
    }

    pub fn gz_url(&self) -> &str {
        &self.gz_url
    }

    pub fn zip_url(&self) -> &str {
        &self.zip_url
    }

    pub fn storage_location(&self) -> &Path {
        &self.storage_location
    }

    pub fn archive_url(&self, kind: ArchiveKind) -> &str {
        match kind {
            ArchiveKind::Gz => &self.gz_url,
            ArchiveKind::Zip => &self.zip_url,
        }
    }

    /// Last recorded descriptor.
    pub async fn meta(&self) -> Option<Meta> {
        self.state.read().await.meta.clone()
    }

    /// Path of the last downloaded archive.
    pub async fn archive_file(&self) -> Option<PathBuf> {
        self.state.read().await.archive_file.clone()
    }

    /// Path of the last decompressed JSON document.
    pub async fn json_file(&self) -> Option<PathBuf> {
        self.state.read().await.json_file.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.index.is_some()
    }

    /// The CVE index built by the last successful [`Feed::json_pull`].
    pub async fn index(&self) -> Option<Arc<CveIndex>> {
        self.state.read().await.index.clone()
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    pub async fn download_gz(&self) -> Result<PathBuf, NvdError> {
        self.download_in(ArchiveKind::Gz, None).await
    }

    pub async fn download_zip(&self) -> Result<PathBuf, NvdError> {
        self.download_in(ArchiveKind::Zip, None).await
    }

    /// Downloads an archive into `dir` (or the storage location), replacing
    /// any file of the same name, and returns its path.
    #[instrument(skip(self), fields(feed = %self.name))]
    pub async fn download_in(
        &self,
        kind: ArchiveKind,
        dir: Option<&Path>,
    ) -> Result<PathBuf, NvdError> {
        let _guard = self.op_lock.lock().await;
        let url = self.archive_url(kind);
        let dir = dir.unwrap_or(&self.storage_location);

        let archive = self.fetcher.fetch(url).await?;
        let path = StagedFile::write(dir, &file_name(url)?, &archive)
            .await?
            .commit()
            .await?;
        info!(path = %path.display(), bytes = archive.len(), "Archive downloaded");

        self.state.write().await.archive_file = Some(path.clone());
        Ok(path)
    }

    // ========================================================================
    // Descriptor
    // ========================================================================

    async fn fetch_meta(&self) -> Result<Meta, NvdError> {
        let mut meta = Meta::with_url(self.meta_url.clone());
        meta.parse(self.fetcher.as_ref()).await?;
        Ok(meta)
    }

    /// Fetches the feed descriptor, records it and returns it.
    #[instrument(skip(self), fields(feed = %self.name))]
    pub async fn meta_pull(&self) -> Result<Meta, NvdError> {
        let _guard = self.op_lock.lock().await;
        let meta = self.fetch_meta().await?;
        self.state.write().await.meta = Some(meta.clone());
        Ok(meta)
    }

    /// Fetches the descriptor and compares it with the recorded one.
    ///
    /// Returns `true` when the content changed (hash or sizes) or when no
    /// descriptor was recorded yet. The fresh descriptor is recorded either
    /// way, so a second call without upstream change returns `false`.
    #[instrument(skip(self), fields(feed = %self.name))]
    pub async fn check_for_update(&self) -> Result<bool, NvdError> {
        let _guard = self.op_lock.lock().await;
        let fresh = self.fetch_meta().await?;

        let mut state = self.state.write().await;
        let previous = state.meta.as_ref().and_then(Meta::descriptor);
        let changed = match (previous, fresh.descriptor()) {
            (Some(old), Some(new)) => !old.same_content(new),
            _ => true,
        };
        debug!(changed, last_modified = ?fresh.last_modified_date(), "Descriptor compared");
        state.meta = Some(fresh);
        Ok(changed)
    }

    // ========================================================================
    // JSON pull
    // ========================================================================

    /// Downloads, verifies, decompresses and indexes the feed.
    ///
    /// Returns the path of the decompressed JSON file. See [`Feed::json_pull_in`].
    pub async fn json_pull(&self) -> Result<PathBuf, NvdError> {
        self.json_pull_in(None).await
    }

    /// Same as [`Feed::json_pull`], storing files in `dir` when given.
    ///
    /// Steps, each of which leaves the previous state untouched on failure:
    /// 1. fetch a fresh descriptor
    /// 2. fetch the archive and check its size
    /// 3. decompress and check the document size and SHA-256
    /// 4. parse the document and build the index
    /// 5. write the archive and JSON files
    ///
    /// # Errors
    ///
    /// [`NvdError::Integrity`] names the first field that disagrees with the
    /// descriptor. Transport, decompression and JSON failures propagate.
    #[instrument(skip(self), fields(feed = %self.name))]
    pub async fn json_pull_in(&self, dir: Option<&Path>) -> Result<PathBuf, NvdError> {
        let _guard = self.op_lock.lock().await;
        let kind = self.archive_kind;
        let url = self.archive_url(kind);
        let dir = dir.unwrap_or(&self.storage_location);

        let meta = self.fetch_meta().await?;
        let descriptor = meta
            .descriptor()
            .cloned()
            .ok_or_else(|| NvdError::NotLoaded(format!("descriptor of {}", self.name)))?;

        let archive = self.fetcher.fetch(url).await?;
        debug!(bytes = archive.len(), "Archive fetched");

        let (archive, payload, index) = tokio::task::spawn_blocking(move || {
            formats::verify_archive(&descriptor, kind, &archive)?;
            let payload = formats::decompress(kind, &archive)?;
            formats::verify_payload(&descriptor, &payload)?;
            let index = CveIndex::from_slice(&payload)?;
            Ok::<_, NvdError>((archive, payload, index))
        })
        .await
        .map_err(|e| NvdError::Task(format!("Task join error: {}", e)))??;

        let archive_name = file_name(url)?;
        let json_name = match archive_name.strip_suffix(kind.extension()) {
            Some(stem) => stem.to_string(),
            None => format!("{archive_name}.json"),
        };
        // Both files are staged before either replaces its predecessor
        let staged_archive = StagedFile::write(dir, &archive_name, &archive).await?;
        let staged_json = match StagedFile::write(dir, &json_name, &payload).await {
            Ok(staged) => staged,
            Err(e) => {
                staged_archive.discard().await;
                return Err(e);
            }
        };
        let archive_file = staged_archive.commit().await?;
        let json_file = staged_json.commit().await?;

        info!(
            cves = index.len(),
            json = %json_file.display(),
            "Feed indexed"
        );

        let mut state = self.state.write().await;
        state.meta = Some(meta);
        state.archive_file = Some(archive_file);
        state.json_file = Some(json_file.clone());
        state.index = Some(Arc::new(index));
        Ok(json_file)
    }

    /// Returns the index, pulling the feed first if it was never pulled.
    pub(crate) async fn ensure_loaded(&self) -> Result<Arc<CveIndex>, NvdError> {
        if let Some(index) = self.index().await {
            return Ok(index);
        }
        self.json_pull().await?;
        self.loaded_index().await
    }

    async fn loaded_index(&self) -> Result<Arc<CveIndex>, NvdError> {
        self.index()
            .await
            .ok_or_else(|| NvdError::NotLoaded(format!("feed {}", self.name)))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Identifiers of this feed in document order.
    pub async fn available_cves(&self) -> Result<Vec<String>, NvdError> {
        Ok(self.loaded_index().await?.ids().to_vec())
    }

    /// Looks up one identifier in this feed only.
    ///
    /// A well-formed identifier absent from the feed (including one from
    /// another year) yields `Ok(None)`.
    pub async fn cve(&self, id: &str) -> Result<Option<CveRecord>, NvdError> {
        let id = CveId::parse(id)?;
        Ok(self.loaded_index().await?.get(&id).cloned())
    }

    /// Looks up several identifiers in this feed; see [`CveIndex::lookup_many`].
    pub async fn cves<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<CveRecord>, NvdError> {
        let ids = CveId::parse_all(ids)?;
        let index = self.loaded_index().await?;
        let (found, missing) = index.partition(&ids);
        if !missing.is_empty() {
            return Err(NvdError::UnknownCve { ids: missing });
        }
        Ok(found)
    }

    pub async fn query(&self, query: &CveQuery) -> Result<CveAnswer, NvdError> {
        match query {
            CveQuery::One(id) => self.cve(id).await.map(CveAnswer::One),
            CveQuery::Many(ids) => self.cves(ids).await.map(CveAnswer::Many),
        }
    }
}

/// Last path segment of `url`, used as the local file name.
fn file_name(url: &str) -> Result<String, NvdError> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments()?.last().map(str::to_string))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| NvdError::Configuration(format!("no file name in URL {url}")))
}

/// A file written next to its final location as `<name>.part`.
///
/// Nothing under the final name changes until [`StagedFile::commit`].
struct StagedFile {
    partial: PathBuf,
    path: PathBuf,
}

impl StagedFile {
    async fn write(dir: &Path, name: &str, bytes: &[u8]) -> Result<Self, NvdError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| NvdError::io(dir, e))?;

        let staged = Self {
            partial: dir.join(format!("{name}.part")),
            path: dir.join(name),
        };
        if let Err(e) = tokio::fs::write(&staged.partial, bytes).await {
            let err = NvdError::io(&staged.partial, e);
            staged.discard().await;
            return Err(err);
        }
        Ok(staged)
    }

    /// Moves the staged file over the final name.
    async fn commit(self) -> Result<PathBuf, NvdError> {
        tokio::fs::rename(&self.partial, &self.path)
            .await
            .map_err(|e| NvdError::io(&self.path, e))?;
        Ok(self.path)
    }

    /// Best-effort removal of the staged file.
    async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.partial).await {
            debug!(path = %self.partial.display(), error = %e, "Staged file not removed");
        }
    }
}
