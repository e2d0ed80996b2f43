use serde::{Deserialize, Serialize};

/// Result of the peer-based recommendation step
///
/// `Empty` means the peers had nothing the student has not already taken or
/// planned; `Unavailable` means the profile could not be embedded or peer
/// histories could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecommendationOutcome {
    Recommended { course_id: String },
    Empty,
    Unavailable { reason: String },
}

impl RecommendationOutcome {
    pub fn course_id(&self) -> Option<&str> {
        match self {
            RecommendationOutcome::Recommended { course_id } => Some(course_id),
            RecommendationOutcome::Empty | RecommendationOutcome::Unavailable { .. } => None,
        }
    }
}

impl From<Option<String>> for RecommendationOutcome {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(course_id) => RecommendationOutcome::Recommended { course_id },
            None => RecommendationOutcome::Empty,
        }
    }
}
