use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use course_advisor::{
    api::{create_router, AppState},
    error::{AppError, AppResult},
    models::{
        CourseInfo, CourseSummary, Embedding, PeerId, StudentRecord, UserCourseRecord,
    },
    services::{
        embedding::{EmbeddingGenerator, EmbeddingModel},
        fitness::FitnessEvaluator,
        providers::{
            CourseCatalog, EmbeddingProvider, GenerationProvider, HistoryStore, PeerMatch,
            PeerVectorStore,
        },
        recommendations::RecommendationService,
        retriever::SimilarityRetriever,
        throttle::ThrottledQueue,
        RetryPolicy,
    },
};

// In-memory collaborators

struct FakeCatalog {
    courses: Vec<CourseInfo>,
}

#[async_trait::async_trait]
impl CourseCatalog for FakeCatalog {
    async fn course_by_id(&self, id: i64) -> AppResult<Option<CourseInfo>> {
        Ok(self.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn course_by_code(&self, code: &str) -> AppResult<Option<CourseInfo>> {
        Ok(self.courses.iter().find(|c| c.course_code == code).cloned())
    }

    async fn list_courses(&self, skip: i64, limit: i64) -> AppResult<Vec<CourseSummary>> {
        Ok(self
            .courses
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(|c| CourseSummary {
                id: c.id,
                course_name: c.course_name.clone(),
            })
            .collect())
    }
}

struct FakeHistory {
    students: Vec<StudentRecord>,
    histories: HashMap<i64, Vec<UserCourseRecord>>,
}

#[async_trait::async_trait]
impl HistoryStore for FakeHistory {
    async fn student_by_student_id(&self, student_id: &str) -> AppResult<Option<StudentRecord>> {
        Ok(self.students.iter().find(|s| s.student_id == student_id).cloned())
    }

    async fn course_history(&self, user: PeerId) -> AppResult<Vec<UserCourseRecord>> {
        Ok(self.histories.get(&user.0).cloned().unwrap_or_default())
    }

    async fn peer_course_codes(&self, peers: &[PeerId]) -> AppResult<Vec<(PeerId, Vec<String>)>> {
        Ok(peers
            .iter()
            .map(|peer| {
                let codes = self
                    .histories
                    .get(&peer.0)
                    .map(|rows| rows.iter().map(|r| r.course_code.clone()).collect())
                    .unwrap_or_default();
                (*peer, codes)
            })
            .collect())
    }

    async fn list_students(&self, limit: Option<i64>) -> AppResult<Vec<StudentRecord>> {
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(self.students.iter().take(limit).cloned().collect())
    }
}

/// Returns every stored peer; ranking is not under test here
struct FakeVectorStore {
    peers: Vec<i64>,
}

#[async_trait::async_trait]
impl PeerVectorStore for FakeVectorStore {
    async fn upsert_embedding(&self, _peer_id: PeerId, _embedding: &[f32]) -> AppResult<()> {
        Ok(())
    }

    async fn top_k(&self, _embedding: &[f32], k: usize) -> AppResult<Vec<PeerMatch>> {
        Ok(self
            .peers
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, id)| PeerMatch {
                peer_id: PeerId(*id),
                distance: rank as f64 * 0.1,
            })
            .collect())
    }
}

struct FakeEmbedder;

/// Fails every batch, as a crashed model would
struct BrokenEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn encode(&self, _batch: &[String]) -> AppResult<Vec<Embedding>> {
        Err(AppError::Embedding("model crashed".to_string()))
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> String {
        "broken".to_string()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn encode(&self, batch: &[String]) -> AppResult<Vec<Embedding>> {
        Ok(batch.iter().map(|_| vec![0.0, 1.0]).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> String {
        "fake".to_string()
    }
}

/// Scores every course 4, or answers with an out-of-range score for one course
struct FakeGenerator {
    broken_course: Option<String>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl GenerationProvider for FakeGenerator {
    async fn generate(&self, _system: &str, prompt: &str, _schema: &Value) -> AppResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let course_id = prompt
            .lines()
            .find_map(|line| line.strip_prefix("- course_id: "))
            .ok_or_else(|| AppError::ExternalApi("prompt without course_id".to_string()))?
            .to_string();
        let score = if self.broken_course.as_deref() == Some(course_id.as_str()) {
            7
        } else {
            4
        };

        Ok(json!({
            "course_id": course_id,
            "details": [
                {"criteria": "prior knowledge", "score": score, "reason": "Prerequisites done."},
                {"criteria": "team work", "score": 3, "reason": "Some group work."}
            ],
            "summary": "Reasonable fit."
        })
        .to_string())
    }
}

// Fixtures

fn catalog() -> Vec<CourseInfo> {
    vec![
        CourseInfo::new(1, "CSE1001", "Introduction to Programming"),
        CourseInfo::new(2, "CSE2003", "Data Structures"),
        CourseInfo::new(3, "CSE3010", "Operating Systems"),
        CourseInfo::new(4, "CSE3020", "Computer Networks"),
        CourseInfo::new(5, "MAT2001", "Linear Algebra"),
    ]
}

fn record(code: &str, grade_point: f64) -> UserCourseRecord {
    UserCourseRecord {
        course_code: code.to_string(),
        course_name: None,
        grade_point,
        semester: Some("2023-1".to_string()),
    }
}

fn student(id: i64, student_id: &str) -> StudentRecord {
    StudentRecord {
        id,
        student_id: student_id.to_string(),
        name: None,
        major: Some("Computer Science".to_string()),
        grade_level: Some(3),
    }
}

fn history() -> FakeHistory {
    let mut histories = HashMap::new();
    histories.insert(10, vec![record("CSE1001", 4.5), record("CSE2003", 3.7)]);
    // Peers
    histories.insert(20, vec![record("CSE1001", 4.0), record("CSE3010", 3.0), record("MAT2001", 2.5)]);
    histories.insert(21, vec![record("CSE2003", 4.0), record("CSE3010", 3.5), record("CSE3020", 4.0)]);

    FakeHistory {
        students: vec![student(10, "20210001"), student(20, "20190001"), student(21, "20190002")],
        histories,
    }
}

struct TestApp {
    router: Router,
    generator: Arc<FakeGenerator>,
}

fn test_app_with(model: EmbeddingModel, broken_course: Option<&str>) -> TestApp {
    let catalog: Arc<dyn CourseCatalog> = Arc::new(FakeCatalog { courses: catalog() });
    let history: Arc<dyn HistoryStore> = Arc::new(history());
    let generator = Arc::new(FakeGenerator {
        broken_course: broken_course.map(str::to_string),
        prompts: Mutex::new(Vec::new()),
    });

    let evaluator = FitnessEvaluator::new(
        generator.clone(),
        catalog.clone(),
        ThrottledQueue::sequential(Duration::ZERO),
        RetryPolicy::none(),
        "English",
    );
    let retriever = SimilarityRetriever::new(
        EmbeddingGenerator::new(model.clone(), RetryPolicy::none()),
        Arc::new(FakeVectorStore { peers: vec![20, 21] }),
    );
    let recommender = RecommendationService::new(retriever, history.clone(), 5);

    let state = AppState::new(catalog, history, evaluator, recommender, model);
    TestApp {
        router: create_router(state),
        generator,
    }
}

fn test_app() -> TestApp {
    test_app_with(EmbeddingModel::ready(Arc::new(FakeEmbedder)), None)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// Tests

#[tokio::test]
async fn test_health_check_reports_model_state() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "embedding_model_ready": true}));

    let app = test_app_with(EmbeddingModel::unavailable("connection refused"), None);
    let (_, body) = send(&app.router, get("/health")).await;
    assert_eq!(body["embedding_model_ready"], false);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = test_app();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-123")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-123");

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_list_courses_with_paging() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/api/courses?skip=1&limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"id": 2, "course_name": "Data Structures"},
            {"id": 3, "course_name": "Operating Systems"}
        ])
    );

    let (status, _) = send(&app.router, get("/api/courses?limit=501")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_course_and_missing_course() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/api/courses/3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["course_code"], "CSE3010");

    let (status, body) = send(&app.router, get("/api/courses/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Course 99 not found");
}

#[tokio::test]
async fn test_user_history() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/api/users/20210001/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["course_code"], "CSE1001");

    let (status, _) = send(&app.router, get("/api/users/nobody/history")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_user() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/api/users/20190002")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 21);
    assert_eq!(body["major"], "Computer Science");

    let (status, body) = send(&app.router, get("/api/users/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Student nobody not found");
}

#[tokio::test]
async fn test_evaluate_single_course() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/courses/3/evaluate",
            json!({"taken_courses": [{"course_id": "CSE1001", "grade": "A"}], "team_preference": 5}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["course_id"], "CSE3010");
    assert_eq!(body["details"].as_array().unwrap().len(), 2);

    let prompts = app.generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Introduction to Programming (CSE1001), grade A:"));
    assert!(prompts[0].contains("- Team project preference: 5"));
}

#[tokio::test]
async fn test_evaluate_from_stored_history() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/evaluate",
            json!({
                "student_id": "20210001",
                "interests": ["systems"],
                "target_courses": [3, {"course_code": "MAT2001"}],
                "planned_courses": []
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["evaluations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["course_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["CSE3010", "MAT2001"]);

    // Taken CSE1001/CSE2003 and targets CSE3010/MAT2001 are excluded; CSE3020 remains
    assert_eq!(
        body["recommendation"],
        json!({"status": "recommended", "course_id": "CSE3020"})
    );
    assert!(body["generated_at"].is_string());

    // Grades come from stored grade points
    let prompts = app.generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("(CSE1001), grade A+:"));
    assert!(prompts[0].contains("(CSE2003), grade B+:"));
}

#[tokio::test]
async fn test_evaluate_with_supplied_profile_and_planned_courses() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/evaluate",
            json!({
                "taken_courses": [{"course_id": "CSE1001", "grade": "B"}],
                "target_courses": [],
                "planned_courses": ["CSE3010", {"course_id": "CSE3020"}, "UNLISTED1"]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evaluations"], json!([]));
    // CSE3010 and CSE3020 are planned; MAT2001 and CSE2003 tie at one vote, MAT2001 is seen first
    assert_eq!(
        body["recommendation"],
        json!({"status": "recommended", "course_id": "MAT2001"})
    );
}

#[tokio::test]
async fn test_evaluate_unknown_target_is_not_found() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json("/api/evaluate", json!({"target_courses": ["NOPE404"]})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("NOPE404"));
    assert!(app.generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_evaluation_is_bad_gateway_and_stops_pipeline() {
    let app = test_app_with(EmbeddingModel::ready(Arc::new(FakeEmbedder)), Some("CSE1001"));

    let (status, body) = send(
        &app.router,
        post_json("/api/evaluate", json!({"target_courses": [1, 2]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid evaluation for course CSE1001"));
    assert_eq!(app.generator.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_preferences_are_rejected() {
    let app = test_app();

    let (status, _) = send(
        &app.router,
        post_json("/api/evaluate", json!({"eval_preference": 9, "target_courses": [1]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recommendation_needs_embedding_model() {
    let app = test_app_with(EmbeddingModel::unavailable("connection refused"), None);

    let (status, body) = send(
        &app.router,
        post_json("/api/evaluate", json!({"target_courses": []})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_taken_courses_sent_as_catalog_ids() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/evaluate",
            json!({
                "taken_courses": [{"course_id": "3", "grade": "A"}],
                "target_courses": [5]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evaluations"][0]["course_id"], "MAT2001");

    // CSE3010 is taken and MAT2001 targeted; CSE1001 is the first of the remaining ties
    assert_eq!(
        body["recommendation"],
        json!({"status": "recommended", "course_id": "CSE1001"})
    );

    let prompts = app.generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("- Operating Systems (CSE3010), grade A:"));
    assert!(!prompts[0].contains("UNKNOWN (3)"));
}

#[tokio::test]
async fn test_unembedded_profile_reports_unavailable_recommendation() {
    let app = test_app_with(EmbeddingModel::ready(Arc::new(BrokenEmbedder)), None);

    let (status, body) = send(
        &app.router,
        post_json("/api/evaluate", json!({"target_courses": [2]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evaluations"][0]["course_id"], "CSE2003");
    assert_eq!(
        body["recommendation"],
        json!({"status": "unavailable", "reason": "query embedding unavailable"})
    );
}
