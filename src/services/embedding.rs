use std::{sync::Arc, time::Instant};

use crate::{
    error::{AppError, AppResult},
    models::Embedding,
    services::{
        providers::{ollama::OllamaEmbedder, EmbeddingProvider},
        RetryPolicy,
    },
};

enum ModelState {
    Ready(Arc<dyn EmbeddingProvider>),
    Unavailable(String),
}

/// Process-wide handle to the embedding model
///
/// Built once at startup and cloned into every component that needs it. A model
/// that failed to load stays unavailable for the life of the process.
#[derive(Clone)]
pub struct EmbeddingModel {
    state: Arc<ModelState>,
}

impl EmbeddingModel {
    /// Loads the configured model, recording failure instead of aborting startup
    pub async fn initialize(api_url: &str, model: &str) -> Self {
        let start = Instant::now();

        match OllamaEmbedder::connect(api_url, model).await {
            Ok(embedder) => {
                tracing::info!(
                    model = %model,
                    dimensions = embedder.dimensions(),
                    load_ms = start.elapsed().as_millis() as u64,
                    "Embedding model loaded"
                );
                Self::ready(Arc::new(embedder))
            }
            Err(e) => {
                tracing::error!(model = %model, error = %e, "Embedding model failed to load");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn ready(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            state: Arc::new(ModelState::Ready(provider)),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: Arc::new(ModelState::Unavailable(reason.into())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state, ModelState::Ready(_))
    }

    pub fn provider(&self) -> AppResult<&Arc<dyn EmbeddingProvider>> {
        match &*self.state {
            ModelState::Ready(provider) => Ok(provider),
            ModelState::Unavailable(reason) => Err(AppError::ModelNotReady(reason.clone())),
        }
    }
}

/// Batched embedding generation with per-batch retries
#[derive(Clone)]
pub struct EmbeddingGenerator {
    model: EmbeddingModel,
    retry: RetryPolicy,
}

impl EmbeddingGenerator {
    pub fn new(model: EmbeddingModel, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    /// Encodes `texts` in consecutive batches of `batch_size`
    ///
    /// Batches run strictly in order. When a batch still fails after its retries,
    /// generation stops and the vectors of the batches that already succeeded are
    /// returned: the result is always an ordered prefix of the input. Callers detect
    /// truncation by comparing lengths.
    pub async fn generate_embeddings(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> AppResult<Vec<Embedding>> {
        let provider = self.model.provider().map_err(|e| {
            tracing::error!(error = %e, "Cannot generate embeddings without a loaded model");
            e
        })?;

        if batch_size == 0 {
            return Err(AppError::InvalidInput(
                "Embedding batch size must be positive".to_string(),
            ));
        }

        if texts.is_empty() {
            tracing::warn!("Embedding requested for an empty text list");
            return Ok(Vec::new());
        }

        let mut embeddings: Vec<Embedding> = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let result = self
                .retry
                .run("embedding batch", |attempt| async move {
                    tracing::debug!(
                        batch_index,
                        attempt,
                        batch_len = batch.len(),
                        "Encoding batch"
                    );

                    let start = Instant::now();
                    let vectors = provider.encode(batch).await?;
                    check_batch(&vectors, batch.len(), provider.dimensions())?;

                    tracing::debug!(
                        batch_index,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Batch encoded"
                    );
                    Ok(vectors)
                })
                .await;

            match result {
                Ok(vectors) => embeddings.extend(vectors),
                Err(e) => {
                    tracing::error!(
                        batch_index,
                        attempts = self.retry.attempts(),
                        returned = embeddings.len(),
                        requested = texts.len(),
                        error = %e,
                        "Embedding batch exhausted retries, returning completed prefix"
                    );
                    return Ok(embeddings);
                }
            }
        }

        tracing::info!(count = embeddings.len(), "Embeddings generated");
        Ok(embeddings)
    }
}

/// Rejects provider answers that do not line up with the request
fn check_batch(vectors: &[Embedding], expected_len: usize, dimensions: usize) -> AppResult<()> {
    if vectors.len() != expected_len {
        return Err(AppError::Embedding(format!(
            "expected {} vectors, provider returned {}",
            expected_len,
            vectors.len()
        )));
    }

    if dimensions > 0 {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(AppError::Embedding(format!(
                "expected {}-dimensional vectors, provider returned {}",
                dimensions,
                bad.len()
            )));
        }
    }

    Ok(())
}
