use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::PeerId,
    services::{embedding::EmbeddingGenerator, providers::PeerVectorStore},
};

/// Result of a peer search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSearch {
    /// Peers ordered by similarity, possibly none
    Found(Vec<PeerId>),
    /// The query text could not be embedded; the store was not queried
    QueryNotEmbedded,
}

/// Finds stored profiles closest to a query text
#[derive(Clone)]
pub struct SimilarityRetriever {
    generator: EmbeddingGenerator,
    store: Arc<dyn PeerVectorStore>,
}

impl SimilarityRetriever {
    pub fn new(generator: EmbeddingGenerator, store: Arc<dyn PeerVectorStore>) -> Self {
        Self { generator, store }
    }

    /// Returns up to `k` peers, most similar first
    ///
    /// An empty list is returned without touching the store when the query text
    /// could not be embedded; use [`search`](Self::search) to tell that apart from
    /// a search that found nobody. Store failures surface as `AppError::Retrieval`
    /// and are not retried here.
    pub async fn find_similar_peers(&self, query_text: &str, k: usize) -> AppResult<Vec<PeerId>> {
        match self.search(query_text, k).await? {
            PeerSearch::Found(peers) => Ok(peers),
            PeerSearch::QueryNotEmbedded => Ok(Vec::new()),
        }
    }

    pub async fn search(&self, query_text: &str, k: usize) -> AppResult<PeerSearch> {
        if k == 0 {
            return Ok(PeerSearch::Found(Vec::new()));
        }

        let vectors = self
            .generator
            .generate_embeddings(&[query_text.to_string()], 1)
            .await?;

        let Some(query) = vectors.into_iter().next() else {
            tracing::warn!("Query embedding unavailable, skipping peer search");
            return Ok(PeerSearch::QueryNotEmbedded);
        };

        tracing::info!(k, "Searching for similar peers");

        let matches = self.store.top_k(&query, k).await.map_err(|e| match e {
            AppError::Retrieval(_) => e,
            other => AppError::Retrieval(other.to_string()),
        })?;

        let peers: Vec<PeerId> = matches.into_iter().take(k).map(|m| m.peer_id).collect();

        tracing::info!(found = peers.len(), "Similar peers retrieved");
        Ok(PeerSearch::Found(peers))
    }
}
