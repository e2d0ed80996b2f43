pub mod course;
pub mod evaluation;
pub mod profile;
pub mod recommendation;

pub use course::{CourseInfo, CourseRef, CourseSummary};
pub use evaluation::{AnalysisDetail, FitnessEvaluation};
pub use profile::{
    CourseHistory, LetterGrade, PeerId, ProfilePreferences, StudentRecord, UserCourseRecord,
    UserProfile,
};
pub use recommendation::RecommendationOutcome;

/// Fixed-dimension vector produced by the embedding model
pub type Embedding = Vec<f32>;
