//! External collaborators of the recommendation pipeline
//!
//! Every outside system the core talks to sits behind one of these traits: the
//! embedding model, the vector-capable peer store, the structured-generation
//! service, and the catalog/history store. Concrete HTTP providers live in the
//! submodules; the Postgres-backed stores live in `crate::db::postgres`.
use serde_json::Value;

use crate::{
    error::AppResult,
    models::{CourseInfo, CourseSummary, Embedding, PeerId, StudentRecord, UserCourseRecord},
};

pub mod gemini;
pub mod ollama;

/// Text encoder producing fixed-dimension vectors
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encodes a batch of texts, one vector per input in the same order
    async fn encode(&self, batch: &[String]) -> AppResult<Vec<Embedding>>;

    /// Dimensionality of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Model name for logging
    fn model_name(&self) -> String;
}

/// Nearest neighbour match returned by a vector store
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMatch {
    pub peer_id: PeerId,
    /// Cosine distance, smaller is more similar
    pub distance: f64,
}

/// Store holding one profile vector per user
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PeerVectorStore: Send + Sync {
    /// Inserts or replaces the vector owned by `peer_id`
    async fn upsert_embedding(&self, peer_id: PeerId, embedding: &[f32]) -> AppResult<()>;

    /// Returns up to `k` owners ordered by ascending cosine distance
    async fn top_k(&self, embedding: &[f32], k: usize) -> AppResult<Vec<PeerMatch>>;
}

/// Service that answers a prompt with JSON constrained to a response schema
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        response_schema: &Value,
    ) -> AppResult<String>;
}

/// Read access to the course catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn course_by_id(&self, id: i64) -> AppResult<Option<CourseInfo>>;

    async fn course_by_code(&self, code: &str) -> AppResult<Option<CourseInfo>>;

    async fn list_courses(&self, skip: i64, limit: i64) -> AppResult<Vec<CourseSummary>>;
}

/// Read access to students and their course histories
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn student_by_student_id(&self, student_id: &str) -> AppResult<Option<StudentRecord>>;

    async fn course_history(&self, user: PeerId) -> AppResult<Vec<UserCourseRecord>>;

    /// Course codes taken by each peer, returned in the order of `peers`
    ///
    /// Peers without any history are returned with an empty list.
    async fn peer_course_codes(&self, peers: &[PeerId]) -> AppResult<Vec<(PeerId, Vec<String>)>>;

    /// Students ordered by primary key, optionally capped at `limit`
    async fn list_students(&self, limit: Option<i64>) -> AppResult<Vec<StudentRecord>>;
}
