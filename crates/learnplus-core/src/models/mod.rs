//! Data models for Learn Plus entities.
//!
//! - `Course`, `Lesson`: the public catalog
//! - `Enrollment`, `LessonProgress`: a learner's progress through one course
//!
//! Field names follow the backend's camelCase JSON.

pub mod course;
pub mod enrollment;

pub use course::{Course, Lesson, ProgressStatus};
pub use enrollment::{enrolled_course_ids, Enrollment, LessonProgress};

/// Status of a single lesson.
pub type LessonStatus = ProgressStatus;

/// Status of an enrollment as a whole.
pub type EnrollmentStatus = ProgressStatus;
