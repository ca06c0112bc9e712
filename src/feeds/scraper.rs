//! The feed catalog, read from the NVD data-feeds index page.
//!
//! [`NvdFeedScraper`] owns the catalog and answers catalog-wide questions:
//! - which feeds exist ([`NvdFeedScraper::feeds`], [`NvdFeedScraper::feed`])
//! - whether they changed upstream ([`NvdFeedScraper::update_feeds`])
//! - where a CVE lives and what it says ([`NvdFeedScraper::cve`], [`NvdFeedScraper::cves`])

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::NvdError;
use crate::executor::FeedExecutor;
use crate::feeds::feed::Feed;
use crate::feeds::query::{CveAnswer, CveId, CveIndex, CveQuery};
use crate::fetch::HttpFetcher;
use crate::model::{CveRecord, FeedEntry};
use crate::traits::{FetchError, Fetcher};

/// Description rows of the JSON feed table; each is followed by its gz and zip rows.
const FEED_ROWS: &str =
    "h3#JSON_FEED ~ div.row:first-of-type table.xml-feed-table > tbody > tr[data-testid$=desc]";

// ============================================================================
// Index page parsing
// ============================================================================

/// Extracts the feed rows of an index page, in document order.
///
/// Relative links are resolved against `base`.
///
/// # Errors
///
/// [`NvdError::Scrape`] when no feed row matches or a row group lacks a
/// name or one of its three links.
pub fn parse_index(html: &str, base: &Url) -> Result<Vec<FeedEntry>, NvdError> {
    let document = Html::parse_document(html);
    let rows = selector(FEED_ROWS)?;
    let cells = selector("td")?;
    let links = selector("a[href]")?;

    let link_in = |row: ElementRef<'_>| -> Option<String> {
        row.select(&links)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
    };
    let resolve = |href: String| -> Result<String, NvdError> {
        base.join(&href)
            .map(String::from)
            .map_err(|e| NvdError::Scrape(format!("bad link {href}: {e}")))
    };

    let mut entries = Vec::new();
    for row in document.select(&rows) {
        let tds: Vec<ElementRef<'_>> = row.select(&cells).collect();
        let text = |i: usize| {
            tds.get(i)
                .map(|td| td.text().collect::<String>().trim().to_string())
                .unwrap_or_default()
        };

        let name = text(0);
        if name.is_empty() {
            return Err(NvdError::Scrape("feed row without a name".to_string()));
        }
        let missing = |what: &str| NvdError::Scrape(format!("no {what} link for feed {name}"));

        let meta_href = tds.get(2).and_then(|td| link_in(*td)).ok_or_else(|| missing("meta"))?;

        let mut following = row
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "tr");
        let gz_href = following.next().and_then(link_in).ok_or_else(|| missing("gz"))?;
        let zip_href = following.next().and_then(link_in).ok_or_else(|| missing("zip"))?;

        entries.push(FeedEntry {
            updated: text(1),
            meta_url: resolve(meta_href)?,
            gz_url: resolve(gz_href)?,
            zip_url: resolve(zip_href)?,
            name,
        });
    }

    if entries.is_empty() {
        return Err(NvdError::Scrape(
            "no JSON feed found on the index page".to_string(),
        ));
    }
    Ok(entries)
}

fn selector(css: &str) -> Result<Selector, NvdError> {
    Selector::parse(css).map_err(|e| NvdError::Scrape(format!("invalid selector {css}: {e}")))
}

fn is_yearly(name: &str) -> bool {
    name.strip_prefix("CVE-")
        .is_some_and(|year| year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()))
}

async fn load_index(feed: Arc<Feed>, auto_pull: bool) -> Result<Arc<CveIndex>, NvdError> {
    match feed.index().await {
        Some(index) => Ok(index),
        None if auto_pull => feed.ensure_loaded().await,
        None => Err(NvdError::NotLoaded(format!("feed {}", feed.name()))),
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog of the published feeds.
///
/// Empty until [`NvdFeedScraper::scrape`] succeeds; every lookup before that
/// fails with [`NvdError::NotLoaded`].
///
/// ```no_run
/// use nvd_feed_api::NvdFeedScraper;
///
/// # async fn run() -> Result<(), nvd_feed_api::NvdError> {
/// let mut scraper = NvdFeedScraper::new()?;
/// scraper.scrape().await?;
/// let heartbleed = scraper.cve("CVE-2014-0160").await?;
/// # Ok(())
/// # }
/// ```
pub struct NvdFeedScraper {
    config: ScraperConfig,
    fetcher: Arc<dyn Fetcher>,
    executor: FeedExecutor,
    catalog: Option<Vec<Arc<Feed>>>,
}

impl fmt::Debug for NvdFeedScraper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvdFeedScraper")
            .field("config", &self.config)
            .field("feeds", &self.catalog.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl NvdFeedScraper {
    /// Scraper over HTTP with the default configuration.
    pub fn new() -> Result<Self, NvdError> {
        Self::with_config(ScraperConfig::default())
    }

    /// Scraper over HTTP; requests time out after `config.request_timeout()`.
    pub fn with_config(config: ScraperConfig) -> Result<Self, NvdError> {
        config.validate()?;
        let fetcher = HttpFetcher::new(config.request_timeout())?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Scraper reading every URL through `fetcher`.
    pub fn with_fetcher(config: ScraperConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, NvdError> {
        config.validate()?;
        Ok(Self {
            executor: FeedExecutor::new(config.concurrency),
            config,
            fetcher,
            catalog: None,
        })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn index_url(&self) -> &str {
        &self.config.index_url
    }

    /// Reads the index page and replaces the catalog with its feeds.
    ///
    /// Returns the number of feeds found. On failure the previous catalog,
    /// if any, is kept.
    #[instrument(skip(self), fields(url = %self.config.index_url))]
    pub async fn scrape(&mut self) -> Result<usize, NvdError> {
        let base = Url::parse(&self.config.index_url)
            .map_err(|e| NvdError::Configuration(format!("invalid index_url: {e}")))?;

        let limit = self.config.request_timeout();
        let html = timeout(limit, self.fetcher.fetch_text(&self.config.index_url))
            .await
            .map_err(|_| FetchError::Transport {
                url: self.config.index_url.clone(),
                reason: format!("timed out after {}s", limit.as_secs()),
            })??;

        let mut seen = HashSet::new();
        let mut catalog = Vec::new();
        for entry in parse_index(&html, &base)? {
            if !seen.insert(entry.name.clone()) {
                warn!(feed = %entry.name, "Duplicate feed name, keeping the first one");
                continue;
            }
            catalog.push(Arc::new(Feed::from_entry(
                entry,
                self.config.storage_location.clone(),
                self.config.archive_kind,
                Arc::clone(&self.fetcher),
            )));
        }

        info!(feeds = catalog.len(), "Catalog scraped");
        let count = catalog.len();
        self.catalog = Some(catalog);
        Ok(count)
    }

    /// The whole catalog, in index page order.
    pub fn feeds(&self) -> Result<&[Arc<Feed>], NvdError> {
        self.catalog
            .as_deref()
            .ok_or_else(|| NvdError::NotLoaded("feed catalog".to_string()))
    }

    /// The feed called `name`, if the catalog has one.
    pub fn feed(&self, name: &str) -> Result<Option<Arc<Feed>>, NvdError> {
        Ok(self.feeds()?.iter().find(|f| f.name() == name).cloned())
    }

    /// Feeds whose name is in `names`, in catalog order. Unknown names are skipped.
    pub fn feeds_named<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<Feed>>, NvdError> {
        let wanted: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        Ok(self
            .feeds()?
            .iter()
            .filter(|f| wanted.contains(f.name()))
            .cloned()
            .collect())
    }

    pub fn available_feeds(&self) -> Result<Vec<String>, NvdError> {
        Ok(self.feeds()?.iter().map(|f| f.name().to_string()).collect())
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    /// Re-fetches the descriptor of `feed` and reports whether it changed.
    ///
    /// `true` when no descriptor was recorded yet. Archives are not touched.
    pub async fn update_feed(&self, feed: &Feed) -> Result<bool, NvdError> {
        feed.check_for_update().await
    }

    /// [`update_feed`](Self::update_feed) over several feeds at once.
    ///
    /// The result is aligned with `feeds`. Every feed is checked even when a
    /// sibling fails.
    ///
    /// # Errors
    ///
    /// [`NvdError::UpdateFailed`] naming every feed that could not be checked.
    /// The others still recorded their new descriptor, and their flags are
    /// carried in the error's `changed` field so no change is lost.
    #[instrument(skip(self, feeds), fields(feeds = feeds.len()))]
    pub async fn update_feeds(&self, feeds: &[Arc<Feed>]) -> Result<Vec<bool>, NvdError> {
        if feeds.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = self
            .executor
            .run_all(feeds.to_vec(), |feed| async move {
                feed.check_for_update().await
            })
            .await;

        let mut changed = Vec::with_capacity(feeds.len());
        let mut failures = Vec::new();
        for (feed, outcome) in feeds.iter().zip(outcomes) {
            match outcome {
                Ok(flag) => changed.push(Some(flag)),
                Err(e) => {
                    warn!(feed = %feed.name(), error = %e, "Descriptor check failed");
                    failures.push((feed.name().to_string(), e.to_string()));
                    changed.push(None);
                }
            }
        }

        if !failures.is_empty() {
            return Err(NvdError::UpdateFailed { failures, changed });
        }
        let changed: Vec<bool> = changed.into_iter().flatten().collect();
        debug!(changed = changed.iter().filter(|c| **c).count(), "Descriptors checked");
        Ok(changed)
    }

    // ========================================================================
    // CVE lookups
    // ========================================================================

    /// Yearly feed for each identifier.
    ///
    /// # Errors
    ///
    /// [`NvdError::UnknownYear`] listing every identifier whose year has no feed.
    fn feeds_for(&self, ids: &[CveId]) -> Result<Vec<Arc<Feed>>, NvdError> {
        let by_name: HashMap<&str, &Arc<Feed>> =
            self.feeds()?.iter().map(|f| (f.name(), f)).collect();

        let mut found = Vec::with_capacity(ids.len());
        let mut unknown = Vec::new();
        for id in ids {
            match by_name.get(id.feed_name().as_str()) {
                Some(feed) => found.push(Arc::clone(feed)),
                None => unknown.push(id.to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(NvdError::UnknownYear { ids: unknown });
        }
        Ok(found)
    }

    /// Loads each distinct feed once, concurrently.
    async fn indexes_of(
        &self,
        feeds: Vec<Arc<Feed>>,
    ) -> Result<HashMap<String, Arc<CveIndex>>, NvdError> {
        let mut distinct = Vec::new();
        let mut seen = HashSet::new();
        for feed in feeds {
            if seen.insert(feed.name().to_string()) {
                distinct.push(feed);
            }
        }

        let names: Vec<String> = distinct.iter().map(|f| f.name().to_string()).collect();
        let auto_pull = self.config.auto_pull;
        let outcomes = self
            .executor
            .run_all(distinct, move |feed| load_index(feed, auto_pull))
            .await;

        names
            .into_iter()
            .zip(outcomes)
            .map(|(name, outcome)| outcome.map(|index| (name, index)))
            .collect()
    }

    /// Looks up one identifier in the feed of its year, pulling that feed
    /// first when needed.
    ///
    /// # Errors
    ///
    /// - [`NvdError::MalformedIdentifier`] when `id` is not `CVE-YYYY-NNNN...`
    /// - [`NvdError::UnknownYear`] when the catalog has no feed for its year
    /// - [`NvdError::NotLoaded`] when the feed is not pulled and `auto_pull` is off
    #[instrument(skip(self))]
    pub async fn cve(&self, id: &str) -> Result<Option<CveRecord>, NvdError> {
        let id = CveId::parse(id)?;
        let feeds = self.feeds_for(std::slice::from_ref(&id))?;
        let feed = feeds
            .into_iter()
            .next()
            .ok_or_else(|| NvdError::UnknownYear { ids: vec![id.to_string()] })?;

        let index = load_index(feed, self.config.auto_pull).await?;
        Ok(index.get(&id).cloned())
    }

    /// Looks up several identifiers, returning records in input order.
    ///
    /// Identifiers are checked in three passes, each reporting every offender
    /// at once: syntax (first malformed one), year, then presence in the feed
    /// ([`NvdError::UnknownCve`]).
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub async fn cves<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<CveRecord>, NvdError> {
        let ids = CveId::parse_all(ids)?;
        let feeds = self.feeds_for(&ids)?;
        let indexes = self.indexes_of(feeds).await?;

        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in &ids {
            match indexes.get(&id.feed_name()).and_then(|index| index.get(id)) {
                Some(record) => found.push(record.clone()),
                None => missing.push(id.to_string()),
            }
        }
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

    /// Identifiers of every yearly feed (`CVE-YYYY`), in catalog then
    /// document order. Rolling feeds such as `CVE-Modified` are left out.
    #[instrument(skip(self))]
    pub async fn available_cves(&self) -> Result<Vec<String>, NvdError> {
        let yearly: Vec<Arc<Feed>> = self
            .feeds()?
            .iter()
            .filter(|f| is_yearly(f.name()))
            .cloned()
            .collect();

        let auto_pull = self.config.auto_pull;
        let outcomes = self
            .executor
            .run_all(yearly, move |feed| load_index(feed, auto_pull))
            .await;

        let mut ids = Vec::new();
        for outcome in outcomes {
            ids.extend_from_slice(outcome?.ids());
        }
        Ok(ids)
    }
}
