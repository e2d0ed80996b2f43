use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    services::{
        embedding::EmbeddingGenerator,
        profile::peer_profile_text,
        providers::{HistoryStore, PeerVectorStore},
    },
};

/// Outcome of a profile vector seeding run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Computes and stores a profile vector for every stored student
///
/// Students are embedded `batch_size` at a time. A batch whose generation fails
/// counts as failed and the run moves on to the next batch; only vectors that
/// were actually produced are written.
pub async fn seed_user_vectors(
    history: &dyn HistoryStore,
    store: &dyn PeerVectorStore,
    generator: &EmbeddingGenerator,
    batch_size: usize,
    limit: Option<i64>,
) -> AppResult<SeedReport> {
    if batch_size == 0 {
        return Err(AppError::InvalidInput(
            "Embedding batch size must be positive".to_string(),
        ));
    }

    let students = history.list_students(limit).await?;
    let mut report = SeedReport {
        total: students.len(),
        ..Default::default()
    };

    if students.is_empty() {
        tracing::warn!("No students to seed");
        return Ok(report);
    }

    tracing::info!(students = students.len(), batch_size, "Seeding profile vectors");

    for (batch_index, batch) in students.chunks(batch_size).enumerate() {
        let mut texts = Vec::with_capacity(batch.len());
        for student in batch {
            let courses = history.course_history(student.peer_id()).await?;
            texts.push(peer_profile_text(student, &courses));
        }

        let vectors = generator.generate_embeddings(&texts, batch_size).await?;
        if vectors.len() < batch.len() {
            tracing::warn!(
                batch_index,
                embedded = vectors.len(),
                requested = batch.len(),
                "Batch not embedded, continuing with the next one"
            );
            report.failed += batch.len() - vectors.len();
        }

        for (student, vector) in batch.iter().zip(&vectors) {
            match store.upsert_embedding(student.peer_id(), vector).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    tracing::error!(student_id = %student.student_id, error = %e, "Failed to store profile vector");
                    report.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        total = report.total,
        updated = report.updated,
        failed = report.failed,
        "Seeding finished"
    );

    Ok(report)
}
