use std::sync::Arc;

use crate::services::{
    embedding::EmbeddingModel,
    fitness::FitnessEvaluator,
    providers::{CourseCatalog, HistoryStore},
    recommendations::RecommendationService,
};

/// Shared application state
///
/// Everything is built once at startup; handlers only read through it.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CourseCatalog>,
    pub history: Arc<dyn HistoryStore>,
    pub evaluator: Arc<FitnessEvaluator>,
    pub recommender: Arc<RecommendationService>,
    pub embedding: EmbeddingModel,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        history: Arc<dyn HistoryStore>,
        evaluator: FitnessEvaluator,
        recommender: RecommendationService,
        embedding: EmbeddingModel,
    ) -> Self {
        Self {
            catalog,
            history,
            evaluator: Arc::new(evaluator),
            recommender: Arc::new(recommender),
            embedding,
        }
    }
}
