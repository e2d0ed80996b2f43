use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;

use crate::{error::AppResult, services::providers::CourseCatalog};

/// Catalog entry as read from the course store
///
/// Only `id`, `course_code` and `course_name` are guaranteed; everything else is
/// whatever the catalog import managed to fill in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseInfo {
    pub id: i64,
    pub course_code: String,
    pub course_name: String,
    pub year: Option<String>,
    pub semester: Option<String>,
    pub department: Option<String>,
    pub major: Option<String>,
    pub division: Option<String>,
    pub credits: Option<f64>,
    pub class_time_room: Option<String>,
    pub hours: Option<f64>,
    pub professor: Option<String>,
    pub capacity: Option<String>,
    pub english_lecture: Option<String>,
    pub chinese_lecture: Option<String>,
    pub approved_course: Option<String>,
    pub cu_course: Option<String>,
    pub odd_even: Option<String>,
    pub international_student: Option<String>,
    pub honors_course: Option<String>,
    pub engineering_certification: Option<String>,
    pub exam_date: Option<String>,
    pub target_students: Option<String>,
    pub recommended_year: Option<String>,
    pub remarks: Option<String>,
    pub description: Option<String>,
    pub note: Option<String>,
}

impl CourseInfo {
    pub fn new(id: i64, course_code: impl Into<String>, course_name: impl Into<String>) -> Self {
        Self {
            id,
            course_code: course_code.into(),
            course_name: course_name.into(),
            ..Default::default()
        }
    }
}

/// Lightweight listing entry (id and name only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseSummary {
    pub id: i64,
    pub course_name: String,
}

/// Reference to a course as supplied by callers
///
/// Clients send courses in several shapes: a bare catalog id, a bare string, or an
/// object carrying `course_id`, `id` or `course_code`. The shape is decided once at
/// deserialization; everything downstream matches on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CourseRef {
    /// Catalog primary key
    ById(i64),
    /// Course code such as "CSE2003"
    ByCode(String),
    /// Untyped text, either a code or a stringified id
    Raw(String),
}

impl CourseRef {
    /// Looks the referenced course up in the catalog
    pub async fn resolve(&self, catalog: &dyn CourseCatalog) -> AppResult<Option<CourseInfo>> {
        match self {
            CourseRef::ById(id) => catalog.course_by_id(*id).await,
            CourseRef::ByCode(code) => catalog.course_by_code(code).await,
            CourseRef::Raw(text) => {
                let text = text.trim();
                match text.parse::<i64>() {
                    Ok(id) => catalog.course_by_id(id).await,
                    Err(_) => catalog.course_by_code(text).await,
                }
            }
        }
    }

    /// Key used in exclusion sets when the course is absent from the catalog
    pub fn exclusion_key(&self) -> String {
        match self {
            CourseRef::ById(id) => id.to_string(),
            CourseRef::ByCode(code) => code.clone(),
            CourseRef::Raw(text) => text.trim().to_string(),
        }
    }
}

impl Display for CourseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourseRef::ById(id) => write!(f, "id:{}", id),
            CourseRef::ByCode(code) => write!(f, "code:{}", code),
            CourseRef::Raw(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdOrText {
    Id(i64),
    Text(String),
}

#[derive(Deserialize)]
struct CourseRefFields {
    #[serde(default)]
    course_id: Option<IdOrText>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    course_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CourseRefRepr {
    Id(i64),
    Text(String),
    Fields(CourseRefFields),
}

impl<'de> Deserialize<'de> for CourseRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = CourseRefRepr::deserialize(deserializer)?;
        let course_ref = match repr {
            CourseRefRepr::Id(id) => CourseRef::ById(id),
            CourseRefRepr::Text(text) => CourseRef::Raw(text),
            CourseRefRepr::Fields(fields) => match fields {
                CourseRefFields {
                    course_id: Some(IdOrText::Id(id)),
                    ..
                } => CourseRef::ById(id),
                CourseRefFields {
                    course_id: Some(IdOrText::Text(code)),
                    ..
                } => CourseRef::ByCode(code),
                CourseRefFields { id: Some(id), .. } => CourseRef::ById(id),
                CourseRefFields {
                    course_code: Some(code),
                    ..
                } => CourseRef::ByCode(code),
                _ => {
                    return Err(serde::de::Error::custom(
                        "course reference must carry course_id, id or course_code",
                    ))
                }
            },
        };
        Ok(course_ref)
    }
}
