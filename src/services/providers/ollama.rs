//! Ollama embedding provider
//!
//! Talks to an Ollama-compatible server through `POST /api/embed`, which accepts a
//! batch of inputs and returns one vector per input.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::Embedding,
    services::providers::EmbeddingProvider,
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

#[derive(Clone)]
pub struct OllamaEmbedder {
    http_client: HttpClient,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Connects to the server and measures the model's output dimension
    pub async fn connect(base_url: &str, model: &str) -> AppResult<Self> {
        let mut embedder = Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions: 0,
        };

        let sample = embedder.request(&["test".to_string()]).await?;
        let dimensions = sample.first().map(Vec::len).unwrap_or(0);
        if dimensions == 0 {
            return Err(AppError::Embedding(format!(
                "model {} returned an empty sample vector",
                model
            )));
        }
        embedder.dimensions = dimensions;

        Ok(embedder)
    }

    async fn request(&self, batch: &[String]) -> AppResult<Vec<Embedding>> {
        let url = format!("{}/api/embed", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "embedding server returned status {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn encode(&self, batch: &[String]) -> AppResult<Vec<Embedding>> {
        // The server rejects empty strings
        let inputs: Vec<String> = batch
            .iter()
            .map(|text| if text.is_empty() { " ".to_string() } else { text.clone() })
            .collect();

        self.request(&inputs).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
