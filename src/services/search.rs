use async_trait::async_trait;
use color_eyre::Result;
use reqwest::Client;
use std::time::Duration;

use crate::agents::google::GoogleSearchClient;
use crate::config::SearchConfig;

pub use crate::agents::google::{VideoResult, WebResult};
pub use crate::services::scrape::ScrapedPage;

/// External lookups the dialogue engine can make on the user's behalf
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn web_search(&self, query: &str) -> Result<Vec<WebResult>>;

    async fn video_search(&self, query: &str) -> Result<Vec<VideoResult>>;

    /// Best-effort page fetch; failures come back as [`ScrapedPage::Failed`]
    async fn scrape_page(&self, url: &str) -> ScrapedPage;
}

/// Google Custom Search + YouTube + direct page scraping
pub struct GoogleWebSearch {
    google: GoogleSearchClient,
    http: Client,
    scrape_timeout: Duration,
}

impl GoogleWebSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            google: GoogleSearchClient::new(config)?,
            http,
            scrape_timeout: Duration::from_secs(config.scrape_timeout_secs),
        })
    }
}

#[async_trait]
impl SearchService for GoogleWebSearch {
    async fn web_search(&self, query: &str) -> Result<Vec<WebResult>> {
        let results = self.google.web_search(query).await?;
        tracing::debug!(query, count = results.len(), "web search");
        Ok(results)
    }

    async fn video_search(&self, query: &str) -> Result<Vec<VideoResult>> {
        let results = self.google.video_search(query).await?;
        tracing::debug!(query, count = results.len(), "video search");
        Ok(results)
    }

    async fn scrape_page(&self, url: &str) -> ScrapedPage {
        crate::services::scrape::scrape_page(&self.http, url, self.scrape_timeout).await
    }
}
