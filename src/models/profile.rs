use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::{AppError, AppResult};

/// Letter grade recorded for a completed course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
    /// Pass on a pass/fail course
    #[serde(rename = "P")]
    Pass,
}

impl LetterGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
            LetterGrade::Pass => "P",
        }
    }
}

impl Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LetterGrade {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A+" => Ok(LetterGrade::APlus),
            "A" => Ok(LetterGrade::A),
            "B+" => Ok(LetterGrade::BPlus),
            "B" => Ok(LetterGrade::B),
            "C+" => Ok(LetterGrade::CPlus),
            "C" => Ok(LetterGrade::C),
            "D+" => Ok(LetterGrade::DPlus),
            "D" => Ok(LetterGrade::D),
            "F" => Ok(LetterGrade::F),
            "P" => Ok(LetterGrade::Pass),
            other => Err(AppError::InvalidInput(format!("Unknown letter grade: {}", other))),
        }
    }
}

/// One completed course in a student's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseHistory {
    pub course_id: String,
    pub grade: LetterGrade,
}

fn default_preference() -> u8 {
    3
}

/// Caller-supplied preferences that complete a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePreferences {
    /// 1 = prefers written exams, 5 = prefers projects/assignments
    #[serde(default = "default_preference")]
    pub eval_preference: u8,
    #[serde(default)]
    pub interests: Vec<String>,
    /// 1 = strongly dislikes team projects, 5 = strongly likes them
    #[serde(default = "default_preference")]
    pub team_preference: u8,
    #[serde(default, alias = "attendence_type")]
    pub attendance_preference: Vec<String>,
}

impl Default for ProfilePreferences {
    fn default() -> Self {
        Self {
            eval_preference: default_preference(),
            interests: Vec::new(),
            team_preference: default_preference(),
            attendance_preference: Vec::new(),
        }
    }
}

/// Student profile assembled per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub taken_courses: Vec<CourseHistory>,
    #[serde(default = "default_preference")]
    pub eval_preference: u8,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default = "default_preference")]
    pub team_preference: u8,
    #[serde(default, alias = "attendence_type")]
    pub attendance_preference: Vec<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::from_parts(Vec::new(), ProfilePreferences::default())
    }
}

impl UserProfile {
    pub fn from_parts(taken_courses: Vec<CourseHistory>, preferences: ProfilePreferences) -> Self {
        Self {
            taken_courses,
            eval_preference: preferences.eval_preference,
            interests: preferences.interests,
            team_preference: preferences.team_preference,
            attendance_preference: preferences.attendance_preference,
        }
    }

    /// Rejects preference scores outside the 1-5 scale
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("eval_preference", self.eval_preference),
            ("team_preference", self.team_preference),
        ] {
            if !(1..=5).contains(&value) {
                return Err(AppError::InvalidInput(format!(
                    "{} must be between 1 and 5, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Course ids the student has already completed
    pub fn taken_course_ids(&self) -> impl Iterator<Item = &str> {
        self.taken_courses.iter().map(|c| c.course_id.as_str())
    }
}

/// Primary key of a stored user, used as the owner of a profile vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub i64);

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored student account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentRecord {
    pub id: i64,
    pub student_id: String,
    pub name: Option<String>,
    pub major: Option<String>,
    pub grade_level: Option<i32>,
}

impl StudentRecord {
    pub fn peer_id(&self) -> PeerId {
        PeerId(self.id)
    }
}

/// Persisted course history row with a numeric grade point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserCourseRecord {
    pub course_code: String,
    pub course_name: Option<String>,
    pub grade_point: f64,
    pub semester: Option<String>,
}
