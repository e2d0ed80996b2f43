use crate::{
    error::AppResult,
    models::{
        CourseHistory, CourseRef, LetterGrade, ProfilePreferences, StudentRecord,
        UserCourseRecord, UserProfile,
    },
    services::providers::CourseCatalog,
};

/// Maps a numeric grade point onto the letter scale
pub fn grade_point_to_letter(grade_point: f64) -> LetterGrade {
    if grade_point >= 4.5 {
        LetterGrade::APlus
    } else if grade_point >= 4.0 {
        LetterGrade::A
    } else if grade_point >= 3.5 {
        LetterGrade::BPlus
    } else if grade_point >= 3.0 {
        LetterGrade::B
    } else if grade_point >= 2.5 {
        LetterGrade::CPlus
    } else if grade_point >= 2.0 {
        LetterGrade::C
    } else if grade_point >= 1.5 {
        LetterGrade::DPlus
    } else if grade_point >= 1.0 {
        LetterGrade::D
    } else {
        LetterGrade::F
    }
}

/// Builds a profile from persisted history rows and caller preferences
pub fn user_to_profile(records: &[UserCourseRecord], preferences: ProfilePreferences) -> UserProfile {
    let taken_courses = records
        .iter()
        .map(|record| CourseHistory {
            course_id: record.course_code.clone(),
            grade: grade_point_to_letter(record.grade_point),
        })
        .collect();

    UserProfile::from_parts(taken_courses, preferences)
}

/// Rewrites each taken course id into its catalog course code
///
/// Clients send either a course code or a stringified catalog id. Ids the catalog
/// does not know are left as sent.
pub async fn resolve_taken_courses(
    profile: &mut UserProfile,
    catalog: &dyn CourseCatalog,
) -> AppResult<()> {
    for taken in &mut profile.taken_courses {
        match CourseRef::Raw(taken.course_id.clone()).resolve(catalog).await? {
            Some(course) => taken.course_id = course.course_code,
            None => tracing::debug!(course_id = %taken.course_id, "Taken course not in catalog"),
        }
    }
    Ok(())
}

/// Text embedded to look up peers with a similar profile
pub fn profile_summary_text(profile: &UserProfile) -> String {
    let mut parts = vec![format!(
        "Evaluation preference: {} (1: prefers exams, 5: prefers assignments)",
        profile.eval_preference
    )];

    if !profile.interests.is_empty() {
        parts.push(format!("Interests: {}", profile.interests.join(", ")));
    }

    parts.push(format!(
        "Team project preference: {} (1: strongly dislikes, 5: strongly likes)",
        profile.team_preference
    ));

    if !profile.attendance_preference.is_empty() {
        parts.push(format!(
            "Preferred attendance: {}",
            profile.attendance_preference.join(", ")
        ));
    }

    if !profile.taken_courses.is_empty() {
        let courses: Vec<String> = profile
            .taken_courses
            .iter()
            .map(|c| format!("{} ({})", c.course_id, c.grade))
            .collect();
        parts.push(format!("Taken courses: {}", courses.join(", ")));
    }

    parts.join(", ")
}

/// Text embedded for a stored student when seeding profile vectors
pub fn peer_profile_text(student: &StudentRecord, courses: &[UserCourseRecord]) -> String {
    let history = if courses.is_empty() {
        "none".to_string()
    } else {
        courses
            .iter()
            .map(|c| {
                format!(
                    "{} ({}): {}",
                    c.course_name.as_deref().unwrap_or(&c.course_code),
                    c.course_code,
                    grade_point_to_letter(c.grade_point)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    let grade_level = student
        .grade_level
        .map(|g| g.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Student profile: major {}, year {}, taken courses: {}",
        student.major.as_deref().unwrap_or("unknown"),
        grade_level,
        history
    )
}
