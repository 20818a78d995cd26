use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingsConfig;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Generates embeddings using the configured Ollama model
pub struct EmbeddingClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/embed", config.ollama_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(color_eyre::eyre::eyre!(
                "Ollama embed failed ({}): {}",
                status,
                body
            ));
        }
        let response: EmbedResponse = serde_json::from_str(&body)?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| color_eyre::eyre::eyre!("No embedding returned"))
    }
}
