// src/services/rate_source.rs
use std::future::Future;
use std::time::Duration;

use log::info;
use reqwest::Client;

use crate::BoxError;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Supplies the raw rate page handed to the parser.
pub trait DocumentSource: Send + Sync {
    fn fetch_document(&self) -> impl Future<Output = Result<String, BoxError>> + Send;
}

pub struct HttpDocumentSource {
    client: Client,
    url: String,
}

impl HttpDocumentSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BoxError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

impl DocumentSource for HttpDocumentSource {
    async fn fetch_document(&self) -> Result<String, BoxError> {
        info!("Fetching rate page from URL: {}", self.url);
        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}
