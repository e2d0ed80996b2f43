use sqlx::{pool::PoolConnection, postgres::PgPoolOptions, PgPool, Postgres};
use std::collections::HashMap;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{CourseInfo, CourseSummary, PeerId, StudentRecord, UserCourseRecord},
    services::providers::{CourseCatalog, HistoryStore, PeerMatch, PeerVectorStore},
};

/// Creates a PostgreSQL connection pool
///
/// The pool is shared by every store operation; each operation checks out its own
/// connection and returns it when the guard drops.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const COURSE_COLUMNS: &str = r#"
    id::int8 AS id,
    COALESCE(course_code, '') AS course_code,
    COALESCE(course_name, '') AS course_name,
    year, semester, department, major, division,
    credits::float8 AS credits,
    class_time_room,
    hours::float8 AS hours,
    professor, capacity, english_lecture, chinese_lecture, approved_course, cu_course,
    odd_even, international_student, honors_course, engineering_certification,
    exam_date, target_students, recommended_year, remarks, description, note
"#;

const STUDENT_COLUMNS: &str = "id::int8 AS id, student_id, name, major, grade_level";

/// Renders a vector in pgvector's text input format, e.g. `[0.1,0.2]`
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Catalog, history and profile-vector access backed by Postgres with pgvector
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    cache: Cache,
    cache_ttl: u64,
}

impl PgRepository {
    pub fn new(pool: PgPool, cache: Cache, cache_ttl: u64) -> Self {
        Self {
            pool,
            cache,
            cache_ttl,
        }
    }

    async fn acquire(&self) -> AppResult<PoolConnection<Postgres>> {
        Ok(self.pool.acquire().await?)
    }
}

#[async_trait::async_trait]
impl CourseCatalog for PgRepository {
    async fn course_by_id(&self, id: i64) -> AppResult<Option<CourseInfo>> {
        cached!(self.cache, CacheKey::Course(id), self.cache_ttl, async move {
            let mut conn = self.acquire().await?;
            let course = sqlx::query_as::<_, CourseInfo>(&format!(
                "SELECT {} FROM courses WHERE id = $1",
                COURSE_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

            Ok::<_, AppError>(course)
        })
    }

    async fn course_by_code(&self, code: &str) -> AppResult<Option<CourseInfo>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }

        cached!(
            self.cache,
            CacheKey::CourseCode(code.to_string()),
            self.cache_ttl,
            async move {
                let mut conn = self.acquire().await?;
                // Codes repeat across semesters; prefer the most recent offering
                let course = sqlx::query_as::<_, CourseInfo>(&format!(
                    "SELECT {} FROM courses WHERE UPPER(course_code) = UPPER($1) \
                     ORDER BY year DESC NULLS LAST, semester DESC NULLS LAST, id DESC LIMIT 1",
                    COURSE_COLUMNS
                ))
                .bind(code)
                .fetch_optional(&mut *conn)
                .await?;

                Ok::<_, AppError>(course)
            }
        )
    }

    async fn list_courses(&self, skip: i64, limit: i64) -> AppResult<Vec<CourseSummary>> {
        let mut conn = self.acquire().await?;
        let courses = sqlx::query_as::<_, CourseSummary>(
            "SELECT id::int8 AS id, COALESCE(course_name, '') AS course_name \
             FROM courses ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(courses)
    }
}

#[async_trait::async_trait]
impl HistoryStore for PgRepository {
    async fn student_by_student_id(&self, student_id: &str) -> AppResult<Option<StudentRecord>> {
        let mut conn = self.acquire().await?;
        let student = sqlx::query_as::<_, StudentRecord>(&format!(
            "SELECT {} FROM users WHERE student_id = $1",
            STUDENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(student)
    }

    async fn course_history(&self, user: PeerId) -> AppResult<Vec<UserCourseRecord>> {
        let mut conn = self.acquire().await?;
        let history = sqlx::query_as::<_, UserCourseRecord>(
            r#"
            SELECT course_code, course_name, COALESCE(grade_point, 0)::float8 AS grade_point, semester
            FROM user_courses
            WHERE user_id = $1 AND course_code IS NOT NULL
            ORDER BY id
            "#,
        )
        .bind(user.0)
        .fetch_all(&mut *conn)
        .await?;

        Ok(history)
    }

    async fn peer_course_codes(&self, peers: &[PeerId]) -> AppResult<Vec<(PeerId, Vec<String>)>> {
        if peers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = peers.iter().map(|p| p.0).collect();
        let mut conn = self.acquire().await?;
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT user_id::int8, course_code
            FROM user_courses
            WHERE user_id = ANY($1::int8[]) AND course_code IS NOT NULL
            ORDER BY user_id, id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_user: HashMap<i64, Vec<String>> = HashMap::new();
        for (user_id, course_code) in rows {
            by_user.entry(user_id).or_default().push(course_code);
        }

        Ok(peers
            .iter()
            .map(|peer| (*peer, by_user.remove(&peer.0).unwrap_or_default()))
            .collect())
    }

    async fn list_students(&self, limit: Option<i64>) -> AppResult<Vec<StudentRecord>> {
        let mut conn = self.acquire().await?;
        // LIMIT NULL means no limit
        let students = sqlx::query_as::<_, StudentRecord>(&format!(
            "SELECT {} FROM users ORDER BY id LIMIT $1",
            STUDENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(students)
    }
}

#[async_trait::async_trait]
impl PeerVectorStore for PgRepository {
    async fn upsert_embedding(&self, peer_id: PeerId, embedding: &[f32]) -> AppResult<()> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query(
            "UPDATE users SET embedding = $2::vector, updated_at = NOW() WHERE id = $1",
        )
        .bind(peer_id.0)
        .bind(to_vector_literal(embedding))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("user {}", peer_id)));
        }

        Ok(())
    }

    async fn top_k(&self, embedding: &[f32], k: usize) -> AppResult<Vec<PeerMatch>> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::Retrieval(format!("could not acquire store connection: {}", e))
        })?;

        let rows: Vec<(i64, f64)> = sqlx::query_as(
            r#"
            SELECT id::int8, (embedding <=> $1::vector)::float8 AS distance
            FROM users
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
        )
        .bind(to_vector_literal(embedding))
        .bind(k as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::Retrieval(format!("nearest-neighbour query failed: {}", e)))?;

        tracing::debug!(k, returned = rows.len(), "Nearest-neighbour query completed");

        Ok(rows
            .into_iter()
            .map(|(id, distance)| PeerMatch {
                peer_id: PeerId(id),
                distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal_format() {
        assert_eq!(to_vector_literal(&[0.5, -1.0, 0.25]), "[0.5,-1,0.25]");
    }

    #[test]
    fn test_vector_literal_empty() {
        assert_eq!(to_vector_literal(&[]), "[]");
    }
}
