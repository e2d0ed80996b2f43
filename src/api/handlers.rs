use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        CourseHistory, CourseInfo, CourseRef, CourseSummary, FitnessEvaluation, ProfilePreferences,
        RecommendationOutcome, StudentRecord, UserCourseRecord, UserProfile,
    },
    services::profile::{resolve_taken_courses, user_to_profile},
};

use super::AppState;

const DEFAULT_PAGE_LIMIT: i64 = 100;
const MAX_PAGE_LIMIT: i64 = 500;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    /// Builds the profile from stored history when present
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub taken_courses: Vec<CourseHistory>,
    #[serde(flatten)]
    pub preferences: ProfilePreferences,
    #[serde(default)]
    pub target_courses: Vec<CourseRef>,
    /// Courses the student already plans to take, never recommended
    #[serde(default)]
    pub planned_courses: Vec<CourseRef>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub evaluations: Vec<FitnessEvaluation>,
    pub recommendation: RecommendationOutcome,
    pub generated_at: DateTime<Utc>,
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "embedding_model_ready": state.embedding.is_ready(),
    }))
}

/// Paged course listing
pub async fn list_courses(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<CourseSummary>>> {
    if page.skip < 0 {
        return Err(AppError::InvalidInput("skip must not be negative".to_string()));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&page.limit) {
        return Err(AppError::InvalidInput(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }

    let courses = state.catalog.list_courses(page.skip, page.limit).await?;
    Ok(Json(courses))
}

/// Single catalog entry
pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CourseInfo>> {
    let course = state
        .catalog
        .course_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))?;
    Ok(Json(course))
}

/// Stored student account
pub async fn get_user(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> AppResult<Json<StudentRecord>> {
    let student = state
        .history
        .student_by_student_id(&student_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;
    Ok(Json(student))
}

/// Stored course history of one student
pub async fn get_user_history(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> AppResult<Json<Vec<UserCourseRecord>>> {
    let student = state
        .history
        .student_by_student_id(&student_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;

    let records = state.history.course_history(student.peer_id()).await?;
    Ok(Json(records))
}

/// Fitness evaluation of one course for the supplied profile
pub async fn evaluate_course(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut profile): Json<UserProfile>,
) -> AppResult<Json<FitnessEvaluation>> {
    resolve_taken_courses(&mut profile, state.catalog.as_ref()).await?;

    let course = state
        .catalog
        .course_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))?;

    let mut evaluations = state
        .evaluator
        .evaluate_fit(&profile, std::slice::from_ref(&course))
        .await?;

    evaluations
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::Internal("Evaluation returned no result".to_string()))
}

/// Evaluates the target courses and recommends one more course from similar peers
pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> AppResult<Json<EvaluateResponse>> {
    let profile = match &request.student_id {
        Some(student_id) => {
            let student = state
                .history
                .student_by_student_id(student_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;
            let records = state.history.course_history(student.peer_id()).await?;
            user_to_profile(&records, request.preferences.clone())
        }
        None => {
            let mut profile =
                UserProfile::from_parts(request.taken_courses.clone(), request.preferences.clone());
            resolve_taken_courses(&mut profile, state.catalog.as_ref()).await?;
            profile
        }
    };
    profile.validate()?;

    let mut targets = Vec::with_capacity(request.target_courses.len());
    for course_ref in &request.target_courses {
        let course = course_ref
            .resolve(state.catalog.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_ref)))?;
        targets.push(course);
    }

    // Targets are being considered already, so they count as planned
    let mut planned: Vec<String> = targets.iter().map(|c| c.course_code.clone()).collect();
    for course_ref in &request.planned_courses {
        let key = match course_ref.resolve(state.catalog.as_ref()).await? {
            Some(course) => course.course_code,
            None => course_ref.exclusion_key(),
        };
        planned.push(key);
    }

    tracing::info!(
        targets = targets.len(),
        planned = planned.len(),
        from_history = request.student_id.is_some(),
        "Evaluate request"
    );

    let evaluations = state.evaluator.evaluate_fit(&profile, &targets).await?;
    let recommendation = state.recommender.recommend_for(&profile, &planned).await?;

    Ok(Json(EvaluateResponse {
        evaluations,
        recommendation,
        generated_at: Utc::now(),
    }))
}
