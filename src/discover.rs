//! Chapter image discovery.
//!
//! Chapter pages reference their images through numbered storage folders
//! (`/storage/media/<id>/conversions/`). The folder listing itself is not
//! exposed, so each folder is enumerated by probing `NN-optimized.webp` and
//! `N-optimized.webp` for a bounded range of sequence numbers.
//!
//! Folder ids are looked up in three tiers:
//! 1. the raw markup, anywhere (scripts and data blobs included);
//! 2. the source attributes of `<img>` elements;
//! 3. none found: the `<img>` sources themselves are returned unprobed.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use url::Url;

use crate::config::CrawlConfig;
use crate::extract::first_attr;
use crate::fetch::{CrawlError, SiteClient};
use crate::models::{ImageCandidate, Padding};

// ── Constants ────────────────────────────────────────────────────────────────

const IMAGE_SUFFIX: &str = "-optimized.webp";
const STORAGE_MARKER: &str = "storage/media";
const FOLDER_ATTRS: &[&str] = &["src", "data-src"];
const DIRECT_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];

// ── Lazy statics ─────────────────────────────────────────────────────────────

static FOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/storage/media/(\d+)/conversions/").unwrap());

static IMG_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

// ── Public API ───────────────────────────────────────────────────────────────

/// Fetch a chapter page and return its images in reading order.
///
/// Only the page fetch can fail; probe failures just mean "not there". An
/// empty `Ok` means nothing could be determined for this chapter.
pub async fn discover_chapter_images(
    client: &SiteClient,
    config: &CrawlConfig,
    chapter_url: &str,
) -> Result<Vec<String>, CrawlError> {
    let html = client.get_text(chapter_url).await?;
    let plan = plan_discovery(&html, &config.media_origin);

    match plan {
        DiscoveryPlan::Probe(folders) => {
            tracing::info!(folders = ?folders, "detected conversion folders");
            let images = probe_folders(client, config, &folders).await;
            tracing::info!(
                count = images.len(),
                first = images.first().map(String::as_str).unwrap_or("-"),
                last = images.last().map(String::as_str).unwrap_or("-"),
                "numbered images found"
            );
            Ok(images)
        }
        DiscoveryPlan::Direct(images) => {
            tracing::warn!(
                count = images.len(),
                "no conversion folders found, using image sources directly"
            );
            Ok(images)
        }
    }
}

// ── Folder detection ─────────────────────────────────────────────────────────

/// What to do with a chapter page, decided from its markup alone.
#[derive(Debug, PartialEq)]
pub enum DiscoveryPlan {
    /// Folder ids to enumerate, ascending.
    Probe(Vec<String>),
    /// Image URLs taken straight from the page.
    Direct(Vec<String>),
}

pub fn plan_discovery(html: &str, media_origin: &str) -> DiscoveryPlan {
    let mut folders = folder_ids_in_markup(html);

    let document = Html::parse_document(html);
    let img_count = document.select(&IMG_SEL).count();
    tracing::debug!(img_count, folders = folders.len(), "scanned chapter markup");

    if folders.is_empty() {
        folders = folder_ids_in_img_attrs(&document);
    }

    if folders.is_empty() {
        return DiscoveryPlan::Direct(direct_image_urls(&document, media_origin));
    }

    sort_numeric(&mut folders);
    DiscoveryPlan::Probe(folders)
}

fn folder_ids_in_markup(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    FOLDER_RE
        .captures_iter(html)
        .map(|cap| cap[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn folder_ids_in_img_attrs(document: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    document
        .select(&IMG_SEL)
        .filter_map(|img| first_attr(img, FOLDER_ATTRS))
        .filter_map(|src| FOLDER_RE.captures(src).map(|cap| cap[1].to_string()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Orders decimal strings by value, whatever their length.
fn sort_numeric(ids: &mut [String]) {
    ids.sort_by(|a, b| {
        let (a_trim, b_trim) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
        a_trim
            .len()
            .cmp(&b_trim.len())
            .then_with(|| a_trim.cmp(b_trim))
            .then_with(|| a.cmp(b))
    });
}

// ── Direct fallback ──────────────────────────────────────────────────────────

fn direct_image_urls(document: &Html, media_origin: &str) -> Vec<String> {
    let media_host = Url::parse(media_origin)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let scheme = media_origin.split("://").next().unwrap_or("https");

    let raw = document
        .select(&IMG_SEL)
        .filter_map(|img| first_attr(img, DIRECT_ATTRS))
        .filter(|src| {
            src.contains(STORAGE_MARKER) || (!media_host.is_empty() && src.contains(&*media_host))
        })
        .map(|src| {
            if src.starts_with("//") {
                format!("{scheme}:{src}")
            } else if src.starts_with('/') {
                format!("{media_origin}{src}")
            } else if !src.starts_with("http") {
                format!("{media_origin}/{src}")
            } else {
                src.to_string()
            }
        });

    dedup_preserving_order(raw)
}

// ── Probing ──────────────────────────────────────────────────────────────────

pub fn folder_base_url(media_origin: &str, folder_id: &str) -> String {
    format!("{media_origin}/storage/media/{folder_id}/conversions/")
}

/// All padded names first, then all unpadded ones.
pub fn candidates_for_folder(base_url: &str, max_sequence: u32) -> Vec<ImageCandidate> {
    let padded = (1..=max_sequence).map(|seq| ImageCandidate {
        url: format!("{base_url}{seq:02}{IMAGE_SUFFIX}"),
        sequence: seq,
        padding: Padding::TwoDigit,
    });
    let unpadded = (1..=max_sequence).map(|seq| ImageCandidate {
        url: format!("{base_url}{seq}{IMAGE_SUFFIX}"),
        sequence: seq,
        padding: Padding::Unpadded,
    });
    padded.chain(unpadded).collect()
}

async fn probe_folders(
    client: &SiteClient,
    config: &CrawlConfig,
    folders: &[String],
) -> Vec<String> {
    let mut found = Vec::new();
    for folder in folders {
        let base_url = folder_base_url(&config.media_origin, folder);
        tracing::info!(folder = %folder, base = %base_url, "enumerating");
        let candidates = candidates_for_folder(&base_url, config.max_sequence_per_folder);
        found.extend(probe_all(client, candidates, config.probe_concurrency).await);
    }
    dedup_preserving_order(found)
}

/// Probe every candidate with at most `concurrency` requests in flight and
/// return the ones that exist, in candidate order. Waits for all probes.
async fn probe_all(
    client: &SiteClient,
    candidates: Vec<ImageCandidate>,
    concurrency: usize,
) -> Vec<String> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));

    let probes = candidates.into_iter().map(|candidate| {
        let permits = Arc::clone(&permits);
        async move {
            let _permit = permits.acquire_owned().await.ok()?;
            match client.probe(&candidate.url).await {
                Ok(()) => Some(candidate.url),
                Err(e) => {
                    tracing::debug!(
                        url = %candidate.url,
                        sequence = candidate.sequence,
                        padding = ?candidate.padding,
                        error = %e,
                        "probe missed"
                    );
                    None
                }
            }
        }
    });

    join_all(probes).await.into_iter().flatten().collect()
}

fn dedup_preserving_order<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}
