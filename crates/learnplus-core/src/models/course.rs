use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Lesson and enrollment progress states, as the backend spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn is_completed(self) -> bool {
        self == ProgressStatus::Completed
    }

    pub fn label(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "Not started",
            ProgressStatus::InProgress => "In progress",
            ProgressStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "enrollmentsCount", default)]
    pub enrollments_count: u32,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Course {
    pub fn tags_display(&self) -> String {
        self.tags.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Slugged;

    #[test]
    fn test_parse_course() {
        let json = r#"{
            "id": "c1",
            "title": "Rust Basics",
            "description": "Learn Rust",
            "tags": ["rust", "beginner"],
            "enrollmentsCount": 12,
            "lessons": [
                {"id": "l1", "title": "Ownership", "status": "NOT_STARTED"},
                {"id": "l2", "title": "Borrowing", "status": "COMPLETED"}
            ]
        }"#;

        let course: Course = serde_json::from_str(json).expect("Failed to parse course JSON");
        assert_eq!(course.enrollments_count, 12);
        assert_eq!(course.lessons.len(), 2);
        assert_eq!(course.lessons[1].status, ProgressStatus::Completed);
        assert_eq!(course.slug(), "rust-basics");
        assert_eq!(course.tags_display(), "rust, beginner");
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let course: Course = serde_json::from_str(r#"{"id":"c2","title":"Empty"}"#)
            .expect("Failed to parse minimal course JSON");
        assert_eq!(course.enrollments_count, 0);
        assert!(course.lessons.is_empty());
        assert!(course.tags.is_empty());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&ProgressStatus::InProgress).unwrap();
        assert_eq!(json, r#""IN_PROGRESS""#);
    }
}
