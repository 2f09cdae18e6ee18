use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::{Course, ProgressStatus};

/// Per-enrollment state of one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct LessonProgress {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Enrollment {
    pub id: String,
    pub course: Course,
    #[serde(rename = "lessonProgress", default)]
    pub lesson_progress: Vec<LessonProgress>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: ProgressStatus,
}

impl Enrollment {
    pub fn completed_lessons(&self) -> usize {
        self.lesson_progress
            .iter()
            .filter(|l| l.status.is_completed())
            .count()
    }

    pub fn total_lessons(&self) -> usize {
        self.lesson_progress.len()
    }

    /// Find a lesson by id, or by 1-based position when `key` is a number
    /// that matches no id.
    pub fn find_lesson(&self, key: &str) -> Option<&LessonProgress> {
        if let Some(lesson) = self.lesson_progress.iter().find(|l| l.id == key) {
            return Some(lesson);
        }
        key.parse::<usize>()
            .ok()
            .filter(|&n| n >= 1)
            .and_then(|n| self.lesson_progress.get(n - 1))
    }

    pub fn progress_display(&self) -> String {
        format!(
            "{}% ({}/{} lessons)",
            self.progress,
            self.completed_lessons(),
            self.total_lessons()
        )
    }
}

/// Ids of every course the session is enrolled in.
pub fn enrolled_course_ids(enrollments: &[Enrollment]) -> HashSet<String> {
    enrollments.iter().map(|e| e.course.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENROLLMENT_JSON: &str = r#"{
        "id": "e1",
        "course": {
            "id": "c1", "title": "Rust Basics", "description": "", "tags": [],
            "enrollmentsCount": 3, "lessons": []
        },
        "lessonProgress": [
            {"id": "lp1", "title": "Ownership", "status": "COMPLETED"},
            {"id": "lp2", "title": "Borrowing", "status": "NOT_STARTED"}
        ],
        "progress": 50,
        "status": "IN_PROGRESS"
    }"#;

    #[test]
    fn test_parse_enrollment() {
        let enrollment: Enrollment =
            serde_json::from_str(ENROLLMENT_JSON).expect("Failed to parse enrollment JSON");
        assert_eq!(enrollment.course.id, "c1");
        assert_eq!(enrollment.completed_lessons(), 1);
        assert_eq!(enrollment.total_lessons(), 2);
        assert_eq!(enrollment.status, ProgressStatus::InProgress);
        assert_eq!(enrollment.progress_display(), "50% (1/2 lessons)");
    }

    #[test]
    fn test_find_lesson_by_id_or_position() {
        let enrollment: Enrollment = serde_json::from_str(ENROLLMENT_JSON).unwrap();
        assert_eq!(enrollment.find_lesson("lp2").map(|l| l.title.as_str()), Some("Borrowing"));
        assert_eq!(enrollment.find_lesson("1").map(|l| l.id.as_str()), Some("lp1"));
        assert!(enrollment.find_lesson("0").is_none());
        assert!(enrollment.find_lesson("3").is_none());
        assert!(enrollment.find_lesson("nope").is_none());
    }

    #[test]
    fn test_enrolled_course_ids() {
        let enrollment: Enrollment = serde_json::from_str(ENROLLMENT_JSON).unwrap();
        let ids = enrolled_course_ids(&[enrollment]);
        assert!(ids.contains("c1"));
        assert_eq!(ids.len(), 1);
    }
}
