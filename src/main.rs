use std::process::ExitCode;

use comic_crawler::config::CrawlConfig;
use comic_crawler::fetch::SiteClient;
use comic_crawler::output::TableWriter;
use comic_crawler::pipeline;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match CrawlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut writer =
        match TableWriter::create(&config.manga_table_path, &config.picture_table_path) {
            Ok(writer) => writer,
            Err(e) => {
                tracing::error!(error = %e, "cannot open output tables");
                return ExitCode::FAILURE;
            }
        };

    let client = match SiteClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "cannot build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    pipeline::run(&client, &config, &mut writer).await;

    if let Err(e) = writer.flush() {
        tracing::error!(error = %e, "flushing output failed");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        manga = %config.manga_table_path,
        pictures = %config.picture_table_path,
        "tables written"
    );
    ExitCode::SUCCESS
}
