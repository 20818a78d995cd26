use color_eyre::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SearchConfig;

const GOOGLE_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const UNTITLED: &str = "بدون عنوان";

/// One organic result from Google Custom Search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// One YouTube video hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    #[serde(default)]
    items: Vec<GoogleSearchItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleSearchItem {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YoutubeSearchResponse {
    #[serde(default)]
    items: Vec<YoutubeItem>,
}

#[derive(Debug, Deserialize)]
struct YoutubeItem {
    id: YoutubeId,
    snippet: YoutubeSnippet,
}

#[derive(Debug, Deserialize)]
struct YoutubeId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YoutubeSnippet {
    title: String,
}

/// Thin client over the Custom Search and YouTube Data APIs
pub struct GoogleSearchClient {
    client: Client,
    api_key: String,
    cse_id: String,
    youtube_key: String,
    max_results: usize,
    search_url: String,
    youtube_url: String,
}

impl GoogleSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.google_api_key.clone(),
            cse_id: config.google_cse_id.clone(),
            youtube_key: config.youtube_api_key.clone(),
            max_results: config.max_results,
            search_url: GOOGLE_SEARCH_URL.to_string(),
            youtube_url: YOUTUBE_SEARCH_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_endpoints(mut self, search_url: String, youtube_url: String) -> Self {
        self.search_url = search_url;
        self.youtube_url = youtube_url;
        self
    }

    pub async fn web_search(&self, query: &str) -> Result<Vec<WebResult>> {
        if self.api_key.trim().is_empty() || self.cse_id.trim().is_empty() {
            return Err(color_eyre::eyre::eyre!("Google search key or CSE id not configured"));
        }
        let trimmed_query = query.trim();
        if trimmed_query.is_empty() {
            return Ok(Vec::new());
        }

        let num = self.max_results.to_string();
        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", trimmed_query),
                ("num", num.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: GoogleSearchResponse = response.json().await?;
        Ok(payload
            .items
            .into_iter()
            .map(|item| WebResult {
                title: item.title.unwrap_or_else(|| UNTITLED.to_string()),
                snippet: item.snippet.unwrap_or_default(),
                link: item.link.unwrap_or_else(|| "#".to_string()),
            })
            .collect())
    }

    pub async fn video_search(&self, query: &str) -> Result<Vec<VideoResult>> {
        if self.youtube_key.trim().is_empty() {
            return Err(color_eyre::eyre::eyre!("YouTube API key not configured"));
        }
        let trimmed_query = query.trim();
        if trimmed_query.is_empty() {
            return Ok(Vec::new());
        }

        let max_results = self.max_results.to_string();
        let response = self
            .client
            .get(&self.youtube_url)
            .query(&[
                ("key", self.youtube_key.as_str()),
                ("q", trimmed_query),
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: YoutubeSearchResponse = response.json().await?;
        Ok(payload
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                Some(VideoResult {
                    title: item.snippet.title,
                    url: format!("https://www.youtube.com/watch?v={}", video_id),
                })
            })
            .collect())
    }
}

/// Renders a numbered link list, the way results are shown in the chat log
pub fn format_link(index: usize, title: &str, url: &str) -> String {
    format!("{}. {}\n{}", index + 1, title.trim(), url.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> SearchConfig {
        SearchConfig {
            google_api_key: "g-key".to_string(),
            google_cse_id: "cse".to_string(),
            youtube_api_key: "yt-key".to_string(),
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_web_search_fills_missing_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("q", "مواعيد مطعم"))
            .and(query_param("num", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"title": "الأول", "snippet": "s1", "link": "https://a.example"},
                    {"snippet": "s2"}
                ]
            })))
            .mount(&server)
            .await;

        let client = GoogleSearchClient::new(&test_config()).unwrap().with_endpoints(
            format!("{}/customsearch/v1", server.uri()),
            format!("{}/youtube/v3/search", server.uri()),
        );
        let results = client.web_search("مواعيد مطعم").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].link, "https://a.example");
        assert_eq!(results[1].title, UNTITLED);
        assert_eq!(results[1].link, "#");
    }

    #[tokio::test]
    async fn test_video_search_builds_watch_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/search"))
            .and(query_param("type", "video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": {"videoId": "abc123"}, "snippet": {"title": "طريقة عمل الكشري"}},
                    {"id": {"channelId": "zzz"}, "snippet": {"title": "channel"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = GoogleSearchClient::new(&test_config()).unwrap().with_endpoints(
            format!("{}/customsearch/v1", server.uri()),
            format!("{}/youtube/v3/search", server.uri()),
        );
        let videos = client.video_search("كشري").await.unwrap();
        assert_eq!(
            videos,
            vec![VideoResult {
                title: "طريقة عمل الكشري".to_string(),
                url: "https://www.youtube.com/watch?v=abc123".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_keys_are_errors() {
        let client = GoogleSearchClient::new(&SearchConfig::default()).unwrap();
        assert!(client.web_search("x").await.is_err());
        assert!(client.video_search("x").await.is_err());
    }

    #[test]
    fn test_format_link() {
        assert_eq!(format_link(0, " كشري ", "https://x"), "1. كشري\nhttps://x");
    }
}
