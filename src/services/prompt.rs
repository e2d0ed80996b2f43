use std::{collections::HashMap, fmt::Write};

use crate::models::{CourseInfo, UserProfile};

const UNKNOWN: &str = "UNKNOWN";

/// Fixed instruction sent with every evaluation request
pub fn system_instruction(language: &str) -> String {
    format!(
        "You are an expert academic advisor who predicts how well a student fits a university course.\n\
         \n\
         You are given the student's information:\n\
         - Courses the student has already taken, with grades\n\
         - Evaluation method preference: written exams (1) to projects/assignments (5)\n\
         - Interests as keywords\n\
         - Attitude towards team projects: strongly dislikes (1) to strongly likes (5)\n\
         - Preferred teaching/attendance methods (online or offline, electronic or verbal). \
         Every listed item is acceptable to the student.\n\
         \n\
         For each evaluation axis return an integer fitness score from 1 to 5 and an explanation \
         of about two sentences, in the requested JSON format. Finish with a short overall summary.\n\
         \n\
         Write all text content in {}.",
        language
    )
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.trim().is_empty()).unwrap_or(UNKNOWN)
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| UNKNOWN.to_string())
}

fn list(values: &[String]) -> String {
    if values.is_empty() {
        UNKNOWN.to_string()
    } else {
        values.join(", ")
    }
}

/// Renders the user prompt for one candidate course
///
/// `history` maps the course ids in `profile.taken_courses` to catalog entries;
/// ids missing from it are still listed with their grade. Rendering is
/// deterministic for identical inputs.
pub fn render_prompt(
    profile: &UserProfile,
    history: &HashMap<String, CourseInfo>,
    target: &CourseInfo,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("## Prior courses\n");
    if profile.taken_courses.is_empty() {
        prompt.push_str("(none)\n");
    }
    for taken in &profile.taken_courses {
        match history.get(&taken.course_id) {
            Some(course) => {
                let _ = writeln!(
                    prompt,
                    "- {} ({}), grade {}: department {}, division {}, credits {}, professor {}, description {}",
                    course.course_name,
                    course.course_code,
                    taken.grade,
                    field(&course.department),
                    field(&course.division),
                    number(course.credits),
                    field(&course.professor),
                    field(&course.description),
                );
            }
            None => {
                let _ = writeln!(
                    prompt,
                    "- {} ({}), grade {}: department {}, division {}, credits {}, professor {}, description {}",
                    UNKNOWN, taken.course_id, taken.grade, UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN,
                );
            }
        }
    }

    prompt.push_str("\n## Preferences\n");
    let _ = writeln!(prompt, "- Evaluation method preference: {}", profile.eval_preference);
    let _ = writeln!(prompt, "- Interests: {}", list(&profile.interests));
    let _ = writeln!(prompt, "- Team project preference: {}", profile.team_preference);
    let _ = writeln!(
        prompt,
        "- Attendance preference: {}",
        list(&profile.attendance_preference)
    );

    prompt.push_str("\n## Candidate course\n");
    let _ = writeln!(prompt, "- course_id: {}", target.course_code);
    let _ = writeln!(prompt, "- Name: {}", target.course_name);
    for (label, value) in [
        ("Year", &target.year),
        ("Semester", &target.semester),
        ("Department", &target.department),
        ("Major", &target.major),
        ("Division", &target.division),
    ] {
        let _ = writeln!(prompt, "- {}: {}", label, field(value));
    }
    let _ = writeln!(prompt, "- Credits: {}", number(target.credits));
    let _ = writeln!(prompt, "- Hours: {}", number(target.hours));
    for (label, value) in [
        ("Schedule and room", &target.class_time_room),
        ("Professor", &target.professor),
        ("Capacity", &target.capacity),
        ("English lecture", &target.english_lecture),
        ("Chinese lecture", &target.chinese_lecture),
        ("Approved course", &target.approved_course),
        ("CU course", &target.cu_course),
        ("Odd/even year", &target.odd_even),
        ("International students", &target.international_student),
        ("Honors course", &target.honors_course),
        ("Engineering certification", &target.engineering_certification),
        ("Exam date", &target.exam_date),
        ("Target students", &target.target_students),
        ("Recommended year", &target.recommended_year),
        ("Remarks", &target.remarks),
        ("Description", &target.description),
        ("Note", &target.note),
    ] {
        let _ = writeln!(prompt, "- {}: {}", label, field(value));
    }

    let _ = write!(
        prompt,
        "\nEvaluate how well this student fits the candidate course. Use \"{}\" as course_id in your answer.",
        target.course_code
    );

    prompt
}
