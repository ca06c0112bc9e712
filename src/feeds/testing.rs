//! Fixtures shared by the unit tests: a fake NVD site served by [`MemoryFetcher`].
//!
//! `tests/fixtures/mod.rs` carries the same routines for the integration tests.

use std::io::{Cursor, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::feeds::formats::sha256_hex;
use crate::fetch::MemoryFetcher;
use crate::model::FeedEntry;

pub(crate) const INDEX_URL: &str = "https://nvd.test/vuln/data-feeds";

pub(crate) fn entry(name: &str) -> FeedEntry {
    let slug = name.trim_start_matches("CVE-").to_lowercase();
    let base = format!("https://static.nvd.test/feeds/json/cve/1.0/nvdcve-1.0-{slug}");
    FeedEntry {
        name: name.to_string(),
        updated: "10/19/2017 3:27:02 AM -04:00".to_string(),
        meta_url: format!("{base}.meta"),
        gz_url: format!("{base}.json.gz"),
        zip_url: format!("{base}.json.zip"),
    }
}

pub(crate) fn document(ids: &[&str]) -> Vec<u8> {
    let items: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "cve": { "CVE_data_meta": { "ID": id, "ASSIGNER": "cve@mitre.org" } },
                "publishedDate": "2017-01-01T00:00Z"
            })
        })
        .collect();
    serde_json::to_vec(&json!({
        "CVE_data_type": "CVE",
        "CVE_data_format": "MITRE",
        "CVE_Items": items
    }))
    .unwrap()
}

pub(crate) fn gzip(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn zipped(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, SimpleFileOptions::default()).unwrap();
    writer.write_all(payload).unwrap();
    writer.finish().unwrap().into_inner()
}

pub(crate) fn meta_text(payload: &[u8], gz_len: usize, zip_len: usize) -> String {
    format!(
        "lastModifiedDate:2017-10-19T03:27:02-04:00\r\nsize:{}\r\nzipSize:{}\r\ngzSize:{}\r\nsha256:{}\r\n",
        payload.len(),
        zip_len,
        gz_len,
        sha256_hex(payload)
    )
}

/// Serves descriptor and both archives of `entry`, containing `ids`.
pub(crate) fn publish(fetcher: &MemoryFetcher, entry: &FeedEntry, ids: &[&str]) {
    let payload = document(ids);
    let gz = gzip(&payload);
    let zip_archive = zipped(&format!("{}.json", entry.name), &payload);
    fetcher.insert(&entry.meta_url, meta_text(&payload, gz.len(), zip_archive.len()));
    fetcher.insert(&entry.gz_url, gz);
    fetcher.insert(&entry.zip_url, zip_archive);
}

/// Index page with the JSON feed table followed by an unrelated XML table.
pub(crate) fn index_page(entries: &[FeedEntry]) -> String {
    let mut rows = String::from(r#"<tr data-testid="vuln-json-feed-header"><th>Name</th></tr>"#);
    for (i, e) in entries.iter().enumerate() {
        rows.push_str(&format!(
            r#"
<tr data-testid="vuln-json-feed-{i}-desc"><td>{name}</td><td>{updated}</td><td><a href="{meta}">META</a></td></tr>
<tr data-testid="vuln-json-feed-{i}-gz"><td colspan="2"></td><td><a href="{gz}">GZ</a></td></tr>
<tr data-testid="vuln-json-feed-{i}-zip"><td colspan="2"></td><td><a href="{zip}">ZIP</a></td></tr>"#,
            name = e.name,
            updated = e.updated,
            meta = e.meta_url,
            gz = e.gz_url,
            zip = e.zip_url,
        ));
    }
    format!(
        r#"<!DOCTYPE html>
<html><body><div class="container">
<h3 id="JSON_FEED">JSON Vulnerability Feeds</h3>
<div class="row"><table class="xml-feed-table"><tbody>{rows}
</tbody></table></div>
<h3 id="XML_FEED">XML Vulnerability Feeds</h3>
<div class="row"><table class="xml-feed-table"><tbody>
<tr data-testid="vuln-xml-feed-0-desc"><td>nvdcve-2.0-2017</td><td>old</td><td><a href="/feeds/xml/2017.meta">META</a></td></tr>
<tr><td></td><td></td><td><a href="/feeds/xml/2017.xml.gz">GZ</a></td></tr>
<tr><td></td><td></td><td><a href="/feeds/xml/2017.xml.zip">ZIP</a></td></tr>
</tbody></table></div>
</div></body></html>"#
    )
}
