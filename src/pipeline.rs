use std::io::Write;

use scraper::Html;

use crate::config::CrawlConfig;
use crate::discover::discover_chapter_images;
use crate::extract::{extract_chapters, extract_series_list};
use crate::fetch::{CrawlError, SiteClient};
use crate::models::{ChapterRecord, MangaRow, PictureRow, SeriesRecord};
use crate::output::TableWriter;

/// Totals reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub series_seen: usize,
    pub series_written: usize,
    pub series_failed: usize,
    pub images_written: usize,
}

/// Crawl the listing, then each series and chapter in turn, writing rows as
/// they are discovered. Per-series failures are logged and skipped.
pub async fn run<W: Write>(
    client: &SiteClient,
    config: &CrawlConfig,
    writer: &mut TableWriter<W>,
) -> RunSummary {
    let mut summary = RunSummary::default();

    let series = match fetch_series_list(client, config).await {
        Ok(series) => series,
        Err(e) => {
            tracing::error!(error = %e, url = %config.listing_url(), "cannot fetch series list");
            return summary;
        }
    };
    if series.is_empty() {
        tracing::warn!("no series found");
        return summary;
    }

    let mut next_id: u32 = 1;

    for record in series.iter().take(config.series_limit) {
        summary.series_seen += 1;
        tracing::info!(
            manga_id = next_id,
            title = %record.title,
            url = %record.detail_link,
            "processing series"
        );

        let chapters = match fetch_chapters(client, config, &record.detail_link).await {
            Ok(chapters) if chapters.is_empty() => {
                tracing::warn!(title = %record.title, "no chapters found, skipping");
                continue;
            }
            Ok(chapters) => chapters,
            Err(e) => {
                summary.series_failed += 1;
                tracing::error!(title = %record.title, error = %e, "series failed");
                continue;
            }
        };

        // Spent from here on: a row may reach the output even if a later
        // write fails.
        let manga_id = next_id;
        next_id += 1;

        match write_series(client, config, writer, record, &chapters, manga_id).await {
            Ok(images) => {
                summary.series_written += 1;
                summary.images_written += images;
                tokio::time::sleep(config.inter_series_delay).await;
            }
            Err(e) => {
                summary.series_failed += 1;
                tracing::error!(manga_id, title = %record.title, error = %e, "series failed");
            }
        }

        if let Err(e) = writer.flush() {
            tracing::error!(error = %e, "flushing output failed");
        }
    }

    tracing::info!(
        seen = summary.series_seen,
        written = summary.series_written,
        failed = summary.series_failed,
        images = summary.images_written,
        "done"
    );
    summary
}

async fn fetch_series_list(
    client: &SiteClient,
    config: &CrawlConfig,
) -> Result<Vec<SeriesRecord>, CrawlError> {
    let html = client.get_text(&config.listing_url()).await?;
    let document = Html::parse_document(&html);
    Ok(extract_series_list(&document, &config.site_origin))
}

async fn fetch_chapters(
    client: &SiteClient,
    config: &CrawlConfig,
    series_url: &str,
) -> Result<Vec<ChapterRecord>, CrawlError> {
    let html = client.get_text(series_url).await?;
    let document = Html::parse_document(&html);
    Ok(extract_chapters(
        &document,
        series_url,
        &config.site_origin,
        config.chapters_per_series_limit,
    ))
}

/// Write the series row under `manga_id`, then discover and write each
/// chapter's pictures. Returns the number of picture rows.
async fn write_series<W: Write>(
    client: &SiteClient,
    config: &CrawlConfig,
    writer: &mut TableWriter<W>,
    record: &SeriesRecord,
    chapters: &[ChapterRecord],
    manga_id: u32,
) -> Result<usize, CrawlError> {
    let names: Vec<&str> = chapters.iter().map(|c| c.name.as_str()).collect();
    writer.write_manga(&MangaRow {
        manga_id,
        title: record.title.clone(),
        cover: record.cover_image.clone().unwrap_or_default(),
        chapters_json: serde_json::to_string(&names)?,
    })?;
    tracing::info!(manga_id, chapters = chapters.len(), "saved series");

    let mut total = 0usize;
    for chapter in chapters {
        tracing::info!(chapter = %chapter.name, url = %chapter.url, "processing chapter");

        let images = match discover_chapter_images(client, config, &chapter.url).await {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(url = %chapter.url, error = %e, "image discovery failed");
                Vec::new()
            }
        };

        if images.is_empty() {
            tracing::warn!(chapter = %chapter.name, "no images found");
        } else {
            for (idx, image_url) in images.iter().enumerate() {
                writer.write_picture(&PictureRow {
                    manga_id,
                    chapter_name: chapter.name.clone(),
                    chapter_url: chapter.url.clone(),
                    image_url: image_url.clone(),
                    image_order: idx + 1,
                })?;
            }
            total += images.len();
            tracing::info!(chapter = %chapter.name, count = images.len(), "saved images");
        }

        tokio::time::sleep(config.inter_chapter_delay).await;
    }

    tracing::info!(manga_id, images = total, "series complete");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::split_row;
    use crate::test_support::StubServer;
    use std::collections::HashMap;
    use std::time::Duration;

    fn listing(entries: &[(&str, &str)]) -> String {
        let anchors: String = entries
            .iter()
            .map(|(href, text)| format!(r#"<a href="{href}">{text}</a>"#))
            .collect();
        format!(r#"<html><body><div class="grid">{anchors}</div></body></html>"#)
    }

    fn config_for(server: &StubServer) -> CrawlConfig {
        CrawlConfig {
            site_origin: server.base_url().to_string(),
            media_origin: server.base_url().to_string(),
            max_sequence_per_folder: 5,
            inter_chapter_delay: Duration::ZERO,
            inter_series_delay: Duration::ZERO,
            fetch_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            ..CrawlConfig::default()
        }
    }

    fn route(routes: &mut HashMap<String, (u16, String)>, path: &str, body: &str) {
        routes.insert(path.to_string(), (200, body.to_string()));
    }

    fn rows(bytes: Vec<u8>) -> Vec<Vec<String>> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .skip(1)
            .map(split_row)
            .collect()
    }

    #[tokio::test]
    async fn full_run_skips_empty_series_without_using_an_id() {
        let mut routes = HashMap::new();
        route(
            &mut routes,
            "/series?page=1",
            &listing(&[
                ("/series/empty", "OngoingMANHWAEmpty One 9.1"),
                ("/series/alpha", "CompletedMANGAAlpha Chapter3 8.0"),
                ("/series/broken", "Broken"),
            ]),
        );
        route(&mut routes, "/series/empty", "<p>No chapters yet</p>");
        route(
            &mut routes,
            "/series/alpha",
            r#"<a href="/series/alpha/chapter/2">Chapter 2May 2 2024</a>
               <a href="/series/alpha/chapter/1">Chapter 1</a>"#,
        );
        route(
            &mut routes,
            "/series/alpha/chapter/1",
            "<script>'/storage/media/9/conversions/'</script>",
        );
        route(&mut routes, "/storage/media/9/conversions/01-optimized.webp", "");
        route(&mut routes, "/storage/media/9/conversions/2-optimized.webp", "");
        route(&mut routes, "/storage/media/9/conversions/3-optimized.webp", "");
        // chapter 2's page and the broken series page are left as 404s

        let server = StubServer::start_owned(routes);
        let config = config_for(&server);
        let client = SiteClient::new(&config).unwrap();
        let mut writer = TableWriter::new(Vec::new(), Vec::new()).unwrap();

        let summary = run(&client, &config, &mut writer).await;
        assert_eq!(
            summary,
            RunSummary {
                series_seen: 3,
                series_written: 1,
                series_failed: 1,
                images_written: 3,
            }
        );

        let (manga, pictures) = writer.into_inner();
        let manga = rows(manga);
        assert_eq!(manga.len(), 1);
        assert_eq!(manga[0][0], "1");
        assert_eq!(manga[0][1], "Alpha");
        assert_eq!(manga[0][2], "");
        assert_eq!(manga[0][3], r#"["Chapter 1","Chapter 2"]"#);

        let pictures = rows(pictures);
        let orders: Vec<&str> = pictures.iter().map(|r| r[4].as_str()).collect();
        assert_eq!(orders, vec!["1", "2", "3"]);
        assert!(pictures.iter().all(|r| r[0] == "1" && r[1] == "Chapter 1"));
        assert_eq!(
            pictures[0][3],
            server.url("/storage/media/9/conversions/01-optimized.webp")
        );
    }

    #[tokio::test]
    async fn series_limit_caps_the_run() {
        let mut routes = HashMap::new();
        route(
            &mut routes,
            "/series?page=1",
            &listing(&[("/series/one", "One"), ("/series/two", "Two"), ("/series/six", "Six")]),
        );
        for slug in ["one", "two", "six"] {
            route(
                &mut routes,
                &format!("/series/{slug}"),
                r#"<a href="chapter/1">Chapter 1</a>"#,
            );
        }

        let server = StubServer::start_owned(routes);
        let config = CrawlConfig {
            series_limit: 2,
            ..config_for(&server)
        };
        let client = SiteClient::new(&config).unwrap();
        let mut writer = TableWriter::new(Vec::new(), Vec::new()).unwrap();

        let summary = run(&client, &config, &mut writer).await;
        assert_eq!(summary.series_seen, 2);
        assert_eq!(summary.series_written, 2);

        let (manga, _) = writer.into_inner();
        let ids: Vec<String> = rows(manga).into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    /// Accepts `cap` bytes, then fails every write.
    struct CappedSink {
        buf: Vec<u8>,
        cap: usize,
    }

    impl CappedSink {
        fn new(cap: usize) -> Self {
            Self { buf: Vec::new(), cap }
        }
    }

    impl Write for CappedSink {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            if self.buf.len() + data.len() > self.cap {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "sink full"));
            }
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_picture_writes_do_not_reuse_the_id() {
        let mut routes = HashMap::new();
        route(
            &mut routes,
            "/series?page=1",
            &listing(&[("/series/one", "One"), ("/series/two", "Two")]),
        );
        for slug in ["one", "two"] {
            route(
                &mut routes,
                &format!("/series/{slug}"),
                &format!(r#"<a href="/series/{slug}/chapter/1">Chapter 1</a>"#),
            );
            route(
                &mut routes,
                &format!("/series/{slug}/chapter/1"),
                "<script>'/storage/media/9/conversions/'</script>",
            );
        }
        route(&mut routes, "/storage/media/9/conversions/01-optimized.webp", "");

        let server = StubServer::start_owned(routes);
        let config = config_for(&server);
        let client = SiteClient::new(&config).unwrap();
        let header_only = crate::output::PICTURE_HEADER.len() + 1;
        let mut writer =
            TableWriter::new(CappedSink::new(usize::MAX), CappedSink::new(header_only)).unwrap();

        let summary = run(&client, &config, &mut writer).await;
        assert_eq!(summary.series_written, 0);
        assert_eq!(summary.series_failed, 2);

        let (manga, pictures) = writer.into_inner();
        let ids: Vec<String> = rows(manga.buf).into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(rows(pictures.buf).is_empty());
    }

    #[tokio::test]
    async fn unreachable_listing_still_leaves_headers() {
        let server = StubServer::start(vec![]);
        let config = config_for(&server);
        let client = SiteClient::new(&config).unwrap();
        let mut writer = TableWriter::new(Vec::new(), Vec::new()).unwrap();

        let summary = run(&client, &config, &mut writer).await;
        assert_eq!(summary, RunSummary::default());

        let (manga, pictures) = writer.into_inner();
        assert_eq!(String::from_utf8(manga).unwrap().trim_end(), crate::output::MANGA_HEADER);
        assert_eq!(String::from_utf8(pictures).unwrap().trim_end(), crate::output::PICTURE_HEADER);
    }
}
