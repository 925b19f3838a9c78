use std::time::Duration;

use url::Url;

const ENV_PREFIX: &str = "COMIC_CRAWLER_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Invalid { key: String, value: String },
    #[error("{key}: {value:?} is not an absolute URL")]
    InvalidUrl { key: String, value: String },
}

/// Recognized options for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub site_origin: String,
    pub listing_path: String,
    /// Host serving the `/storage/media/<id>/conversions/` folders.
    pub media_origin: String,
    pub series_limit: usize,
    pub chapters_per_series_limit: usize,
    pub max_sequence_per_folder: u32,
    pub probe_concurrency: usize,
    pub inter_chapter_delay: Duration,
    pub inter_series_delay: Duration,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    pub manga_table_path: String,
    pub picture_table_path: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            site_origin: "https://asuracomic.net".to_string(),
            listing_path: "/series?page=1".to_string(),
            media_origin: "https://gg.asuracomic.net".to_string(),
            series_limit: 10,
            chapters_per_series_limit: 20,
            max_sequence_per_folder: 50,
            probe_concurrency: 20,
            inter_chapter_delay: Duration::from_secs(1),
            inter_series_delay: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(8),
            manga_table_path: "manga.csv".to_string(),
            picture_table_path: "MangaPicture.csv".to_string(),
        }
    }
}

impl CrawlConfig {
    /// Defaults overridden by `COMIC_CRAWLER_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("SITE_ORIGIN") {
            cfg.site_origin = parse_origin("SITE_ORIGIN", &v)?;
        }
        if let Some(v) = get("LISTING_PATH") {
            cfg.listing_path = v;
        }
        if let Some(v) = get("MEDIA_ORIGIN") {
            cfg.media_origin = parse_origin("MEDIA_ORIGIN", &v)?;
        }
        if let Some(v) = get("SERIES_LIMIT") {
            cfg.series_limit = parse_num("SERIES_LIMIT", &v)?;
        }
        if let Some(v) = get("CHAPTERS_PER_SERIES_LIMIT") {
            cfg.chapters_per_series_limit = parse_num("CHAPTERS_PER_SERIES_LIMIT", &v)?;
        }
        if let Some(v) = get("MAX_SEQUENCE_PER_FOLDER") {
            cfg.max_sequence_per_folder = parse_num("MAX_SEQUENCE_PER_FOLDER", &v)?;
        }
        if let Some(v) = get("PROBE_CONCURRENCY") {
            cfg.probe_concurrency = parse_num::<usize>("PROBE_CONCURRENCY", &v)?.max(1);
        }
        if let Some(v) = get("INTER_CHAPTER_DELAY_MS") {
            cfg.inter_chapter_delay = parse_millis("INTER_CHAPTER_DELAY_MS", &v)?;
        }
        if let Some(v) = get("INTER_SERIES_DELAY_MS") {
            cfg.inter_series_delay = parse_millis("INTER_SERIES_DELAY_MS", &v)?;
        }
        if let Some(v) = get("FETCH_TIMEOUT_MS") {
            cfg.fetch_timeout = parse_millis("FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("PROBE_TIMEOUT_MS") {
            cfg.probe_timeout = parse_millis("PROBE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("MANGA_TABLE_PATH") {
            cfg.manga_table_path = v;
        }
        if let Some(v) = get("PICTURE_TABLE_PATH") {
            cfg.picture_table_path = v;
        }

        Ok(cfg)
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", self.site_origin, self.listing_path)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_num::<u64>(key, value).map(Duration::from_millis)
}

/// Accepts an absolute http(s) URL and returns it without a trailing slash.
fn parse_origin(key: &str, value: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    };
    let parsed = Url::parse(value.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }
    Ok(value.trim().trim_end_matches('/').to_string())
}
