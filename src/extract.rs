use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::clean::{clean_chapter_name, clean_title};
use crate::models::{ChapterRecord, SeriesRecord};

// ── Constants ────────────────────────────────────────────────────────────────

const SERIES_MARKER: &str = "series/";
const CHAPTER_MARKER: &str = "chapter/";
const COVER_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src"];

// ── Lazy statics ─────────────────────────────────────────────────────────────

static GRID_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[class*='grid'] a").unwrap());

static IMG_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

static CHAPTER_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='chapter/']").unwrap());

static SERIES_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/series/([^/]+)").unwrap());

static CHAPTER_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/chapter/(\d+)").unwrap());

// ── Listing page ─────────────────────────────────────────────────────────────

/// Parse the series grid into records, in document order. Duplicates are kept.
pub fn extract_series_list(document: &Html, origin: &str) -> Vec<SeriesRecord> {
    let mut series = Vec::new();

    for anchor in document.select(&GRID_LINK_SEL) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(SERIES_MARKER) {
            continue;
        }

        let title = clean_title(&stripped_text(anchor));
        if title.is_empty() {
            continue;
        }

        let cover_image = anchor
            .select(&IMG_SEL)
            .next()
            .and_then(|img| first_attr(img, COVER_ATTRS))
            .map(str::to_string);

        series.push(SeriesRecord {
            title,
            detail_link: resolve_series_href(href, origin),
            cover_image,
        });
    }

    tracing::info!(count = series.len(), "extracted series");
    series
}

fn resolve_series_href(href: &str, origin: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{origin}{href}")
    } else if href.starts_with(SERIES_MARKER) {
        format!("{origin}/{href}")
    } else {
        format!("{origin}/series/{href}")
    }
}

// ── Series page ──────────────────────────────────────────────────────────────

/// Collect the chapter links of a series page, deduplicated by URL, sorted by
/// chapter number (stable) and capped at `limit`.
pub fn extract_chapters(
    document: &Html,
    series_url: &str,
    origin: &str,
    limit: usize,
) -> Vec<ChapterRecord> {
    let slug = SERIES_SLUG_RE
        .captures(series_url)
        .map(|cap| cap[1].to_string());

    let mut seen: HashSet<String> = HashSet::new();
    let mut chapters = Vec::new();
    let mut anchors = 0usize;

    for anchor in document.select(&CHAPTER_LINK_SEL) {
        anchors += 1;
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(CHAPTER_MARKER) {
            continue;
        }

        let url = resolve_chapter_href(href, origin, slug.as_deref());
        if !seen.insert(url.clone()) {
            continue;
        }

        let name = clean_chapter_name(&stripped_text(anchor));
        if name.is_empty() {
            continue;
        }

        chapters.push(ChapterRecord {
            chapter_number: chapter_number(&url),
            name,
            url,
        });
    }

    if anchors == 0 {
        tracing::warn!(url = series_url, "no chapter links found");
        return Vec::new();
    }

    // sort_by_key is stable: equal numbers keep discovery order.
    chapters.sort_by_key(|c| c.chapter_number);
    chapters.truncate(limit);

    tracing::info!(found = anchors, kept = chapters.len(), "extracted chapters");
    chapters
}

fn resolve_chapter_href(href: &str, origin: &str, slug: Option<&str>) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    if href.starts_with("/series/") {
        return format!("{origin}{href}");
    }

    if href.starts_with('/') {
        return match slug {
            Some(slug) if href.contains(slug) => format!("{origin}{href}"),
            Some(slug) => format!("{origin}/series/{slug}{href}"),
            None => format!("{origin}{href}"),
        };
    }

    match slug {
        Some(slug) if href.starts_with(slug) => format!("{origin}/series/{href}"),
        Some(slug) => format!("{origin}/series/{slug}/{href}"),
        None => format!("{origin}/series/{href}"),
    }
}

fn chapter_number(url: &str) -> u64 {
    CHAPTER_NUMBER_RE
        .captures(url)
        .and_then(|cap| cap[1].parse().ok())
        .unwrap_or(0)
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

/// Concatenate the element's text nodes, each trimmed, empty ones dropped.
pub fn stripped_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|t| !t.is_empty()).collect()
}

/// First non-empty value among `attrs`, in preference order.
pub fn first_attr<'a>(el: ElementRef<'a>, attrs: &[&str]) -> Option<&'a str> {
    attrs
        .iter()
        .filter_map(|a| el.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty())
}
