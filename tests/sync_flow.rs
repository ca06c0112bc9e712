// End-to-end: scrape the index, pull feeds, query CVEs, check for updates.

mod fixtures;

use std::sync::Arc;

use fixtures::{Site, INDEX_URL};
use nvd_feed_api::{
    CveAnswer, CveQuery, Fetcher, Meta, NvdError, NvdFeedScraper, ScraperConfig,
};
use serde_json::json;
use tempfile::TempDir;

const FEEDS: &[(&str, &[&str])] = &[
    ("CVE-Modified", &["CVE-2017-9805"]),
    ("CVE-2004", &["CVE-2004-0001", "CVE-2004-0002"]),
    ("CVE-2014", &["CVE-2014-0160", "CVE-2014-6271"]),
    ("CVE-2015", &["CVE-2015-0235"]),
];

async fn scraped(site: &Site) -> (NvdFeedScraper, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ScraperConfig::new()
        .with_index_url(INDEX_URL)
        .with_storage_location(dir.path());
    let mut scraper = NvdFeedScraper::with_fetcher(config, site.fetcher.clone()).unwrap();
    scraper.scrape().await.unwrap();
    (scraper, dir)
}

#[tokio::test]
async fn test_catalog_matches_index_page() {
    let site = Site::new(FEEDS);
    let (scraper, dir) = scraped(&site).await;

    let names = scraper.available_feeds().unwrap();
    assert_eq!(names, ["CVE-Modified", "CVE-2004", "CVE-2014", "CVE-2015"]);
    let from_feeds: Vec<_> = scraper.feeds().unwrap().iter().map(|f| f.name().to_string()).collect();
    assert_eq!(from_feeds, names);

    let feed = scraper.feed("CVE-2014").unwrap().unwrap();
    assert_eq!(feed.meta_url(), site.entries[2].meta_url);
    assert_eq!(feed.gz_url(), site.entries[2].gz_url);
    assert_eq!(feed.zip_url(), site.entries[2].zip_url);
    assert_eq!(feed.storage_location(), dir.path());

    assert!(scraper.feed("CVE-1999").unwrap().is_none());
    let subset = scraper.feeds_named(&["CVE-2015", "CVE-2004"]).unwrap();
    let subset: Vec<_> = subset.iter().map(|f| f.name()).collect();
    assert_eq!(subset, ["CVE-2004", "CVE-2015"]);
}

#[tokio::test]
async fn test_pull_then_resolve_every_cve() {
    let site = Site::new(FEEDS);
    let (scraper, dir) = scraped(&site).await;
    let feed = scraper.feed("CVE-2014").unwrap().unwrap();

    let meta = feed.meta_pull().await.unwrap();
    assert_eq!(meta.url(), Some(feed.meta_url()));

    let json = feed.json_pull().await.unwrap();
    assert!(json.starts_with(dir.path()));
    assert!(json.is_file());

    let ids = feed.available_cves().await.unwrap();
    assert!(!ids.is_empty());
    for id in &ids {
        assert!(feed.cve(id).await.unwrap().is_some());
        assert!(scraper.cve(id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_identifier_validation() {
    let site = Site::new(FEEDS);
    let (scraper, _dir) = scraped(&site).await;

    assert!(matches!(
        scraper.cve("e").await,
        Err(NvdError::MalformedIdentifier(_))
    ));
    assert!(matches!(
        scraper.cve("CVE-2001-31337").await,
        Err(NvdError::UnknownYear { .. })
    ));
    assert_eq!(scraper.cve("CVE-2004-31337").await.unwrap(), None);
    assert!(matches!(
        CveQuery::try_from(&json!(1)),
        Err(NvdError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_batch_lookup_errors_name_only_offenders() {
    let site = Site::new(FEEDS);
    let (scraper, _dir) = scraped(&site).await;

    match scraper.cves(&["CVE-2014-0160", "CVE-9999-0001"]).await {
        Err(NvdError::UnknownYear { ids }) => assert_eq!(ids, ["CVE-9999-0001"]),
        other => panic!("unexpected outcome: {other:?}"),
    }
    match scraper.cves(&["CVE-2014-0160", "CVE-2015-0001"]).await {
        Err(NvdError::UnknownCve { ids }) => assert_eq!(ids, ["CVE-2015-0001"]),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let query = CveQuery::try_from(&json!(["cve-2015-0235", "CVE-2004-0002"])).unwrap();
    let records = scraper.query(&query).await.unwrap().into_vec();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["cve"]["CVE_data_meta"]["ID"], "CVE-2015-0235");
}

#[tokio::test]
async fn test_update_feeds_tracks_upstream() {
    let site = Site::new(FEEDS);
    let (scraper, _dir) = scraped(&site).await;
    let feeds = scraper.feeds_named(&["CVE-2004", "CVE-2014"]).unwrap();

    assert!(scraper.update_feeds(&[]).await.unwrap().is_empty());
    assert!(scraper.update_feed(&feeds[0]).await.unwrap());
    assert!(!scraper.update_feed(&feeds[0]).await.unwrap());
    assert_eq!(scraper.update_feeds(&feeds).await.unwrap(), [false, true]);

    site.publish("CVE-2014", &["CVE-2014-0160", "CVE-2014-6271", "CVE-2014-7169"]);
    assert_eq!(scraper.update_feeds(&feeds).await.unwrap(), [false, true]);
    assert_eq!(scraper.update_feeds(&feeds).await.unwrap(), [false, false]);

    // Staleness checks never download archives
    for feed in &feeds {
        assert_eq!(site.fetcher.hits(feed.gz_url()), 0);
        assert!(feed.archive_file().await.is_none());
    }
}

#[tokio::test]
async fn test_new_revision_is_picked_up_by_pull() {
    let site = Site::new(FEEDS);
    let (scraper, _dir) = scraped(&site).await;

    assert_eq!(
        scraper.query(&CveQuery::from("CVE-2014-7169")).await.unwrap(),
        CveAnswer::One(None)
    );

    site.publish("CVE-2014", &["CVE-2014-0160", "CVE-2014-7169"]);
    let feed = scraper.feed("CVE-2014").unwrap().unwrap();
    assert!(scraper.update_feed(&feed).await.unwrap());
    feed.json_pull().await.unwrap();

    assert!(scraper.cve("CVE-2014-7169").await.unwrap().is_some());
    assert_eq!(scraper.cve("CVE-2014-6271").await.unwrap(), None);
}

#[tokio::test]
async fn test_available_cves_across_yearly_feeds() {
    let site = Site::new(FEEDS);
    let (scraper, _dir) = scraped(&site).await;

    let ids = scraper.available_cves().await.unwrap();
    assert_eq!(
        ids,
        ["CVE-2004-0001", "CVE-2004-0002", "CVE-2014-0160", "CVE-2014-6271", "CVE-2015-0235"]
    );
}

#[tokio::test]
async fn test_standalone_meta() {
    let site = Site::new(FEEDS);
    let fetcher: Arc<dyn Fetcher> = site.fetcher.clone();

    let mut meta = Meta::new();
    meta.parse_url(fetcher.as_ref(), site.entries[1].meta_url.clone())
        .await
        .unwrap();
    assert_eq!(meta.last_modified_date(), Some("2017-10-19T03:27:02-04:00"));
    assert_eq!(meta.sha256().map(str::len), Some(64));
}
