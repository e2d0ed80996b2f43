use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// Score and explanation for one evaluation axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetail {
    pub criteria: String,
    pub score: u8,
    pub reason: String,
}

/// Structured fitness evaluation returned by the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessEvaluation {
    pub course_id: String,
    pub details: Vec<AnalysisDetail>,
    pub summary: String,
}

impl FitnessEvaluation {
    /// Parses a raw generation response and validates its shape
    ///
    /// `requested_course` only labels the error; the response's own `course_id`
    /// is kept as returned.
    pub fn parse(raw: &str, requested_course: &str) -> AppResult<Self> {
        let evaluation: FitnessEvaluation =
            serde_json::from_str(raw.trim()).map_err(|e| AppError::SchemaValidation {
                course_id: requested_course.to_string(),
                reason: format!("response is not a valid evaluation document: {}", e),
            })?;

        evaluation
            .validate()
            .map_err(|reason| AppError::SchemaValidation {
                course_id: requested_course.to_string(),
                reason,
            })?;

        Ok(evaluation)
    }

    /// Checks the invariants serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.course_id.trim().is_empty() {
            return Err("course_id is empty".to_string());
        }
        if self.details.is_empty() {
            return Err("details is empty".to_string());
        }
        for detail in &self.details {
            if !(MIN_SCORE..=MAX_SCORE).contains(&detail.score) {
                return Err(format!(
                    "score {} for criteria '{}' is outside {}..={}",
                    detail.score, detail.criteria, MIN_SCORE, MAX_SCORE
                ));
            }
        }
        Ok(())
    }

    /// Response shape handed to the generation service
    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "course_id": { "type": "STRING" },
                "details": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "criteria": { "type": "STRING", "description": "Evaluation axis" },
                            "score": {
                                "type": "INTEGER",
                                "description": "Fitness score between 1 and 5",
                                "minimum": MIN_SCORE,
                                "maximum": MAX_SCORE
                            },
                            "reason": { "type": "STRING", "description": "Justification" }
                        },
                        "required": ["criteria", "score", "reason"]
                    }
                },
                "summary": { "type": "STRING" }
            },
            "required": ["course_id", "details", "summary"]
        })
    }
}
