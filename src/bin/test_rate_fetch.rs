// src/bin/test_rate_fetch.rs
use dotenv::dotenv;
use log::info;

use rate_watch::config::AppConfig;
use rate_watch::services::ingestion::new_york_today;
use rate_watch::services::rate_parser;
use rate_watch::services::rate_source::{DocumentSource, HttpDocumentSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env();
    let source = HttpDocumentSource::new(config.rate_source_url.clone(), config.fetch_timeout)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let document = source.fetch_document().await.map_err(|e| anyhow::anyhow!("{}", e))?;
    info!("Fetched {} bytes", document.len());

    let quotes = rate_parser::parse(&document, new_york_today())?;
    for quote in quotes {
        println!("{} {:>2}y {:.4}%", quote.observed_date, quote.term_years, quote.rate_percent);
    }
    Ok(())
}
