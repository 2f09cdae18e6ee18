//! Local view updates applied after a mutating call has been confirmed.
//!
//! Callers keep their own copies of courses and enrollments. Once the backend
//! accepts an enroll, unenroll or lesson completion, these functions bring
//! the local copy in line without re-fetching. None of them perform I/O, and
//! none should be called before the corresponding request has succeeded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use thiserror::Error;
use tracing::debug;

use crate::models::{enrolled_course_ids, Course, Enrollment, LessonProgress, ProgressStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Enrollment has no lessons, progress is undefined")]
    NoLessons,

    #[error("Lesson {0} is not part of this enrollment")]
    UnknownLesson(String),
}

/// Percentage of completed lessons, rounded to the nearest integer with
/// halves rounding up.
pub fn compute_progress(lessons: &[LessonProgress]) -> Result<u8, ReconcileError> {
    let total = lessons.len();
    if total == 0 {
        return Err(ReconcileError::NoLessons);
    }
    let completed = lessons.iter().filter(|l| l.status.is_completed()).count();
    Ok(((200 * completed + total) / (2 * total)) as u8)
}

/// Count one more enrollment on a course.
pub fn apply_enroll(course: &mut Course) {
    course.enrollments_count = course.enrollments_count.saturating_add(1);
}

/// Count one more enrollment on the course with `course_id`. Returns false
/// if no such course is held locally.
pub fn apply_enroll_to(courses: &mut [Course], course_id: &str) -> bool {
    match courses.iter_mut().find(|c| c.id == course_id) {
        Some(course) => {
            apply_enroll(course);
            true
        }
        None => false,
    }
}

/// Mark a lesson completed and recompute progress and status.
///
/// The enrollment is left untouched on error. Status only changes when
/// every lesson is complete; otherwise the backend's value is kept.
pub fn apply_lesson_completed(
    enrollment: &mut Enrollment,
    lesson_id: &str,
) -> Result<(), ReconcileError> {
    if enrollment.lesson_progress.is_empty() {
        return Err(ReconcileError::NoLessons);
    }
    let lesson = enrollment
        .lesson_progress
        .iter_mut()
        .find(|l| l.id == lesson_id)
        .ok_or_else(|| ReconcileError::UnknownLesson(lesson_id.to_string()))?;
    lesson.status = ProgressStatus::Completed;

    enrollment.progress = compute_progress(&enrollment.lesson_progress)?;
    if enrollment.completed_lessons() == enrollment.total_lessons() {
        enrollment.status = ProgressStatus::Completed;
    }
    debug!(
        enrollment_id = %enrollment.id,
        progress = enrollment.progress,
        status = ?enrollment.status,
        "Lesson completion applied"
    );
    Ok(())
}

/// Drop an enrollment from a local listing, returning it if it was present.
pub fn apply_unenroll(
    enrollments: &mut Vec<Enrollment>,
    enrollment_id: &str,
) -> Option<Enrollment> {
    let index = enrollments.iter().position(|e| e.id == enrollment_id)?;
    Some(enrollments.remove(index))
}

/// A course listing together with the courses the session is enrolled in.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    pub courses: Vec<Course>,
    pub enrolled: HashSet<String>,
}

impl CatalogView {
    pub fn new(courses: Vec<Course>, enrollments: &[Enrollment]) -> Self {
        Self {
            courses,
            enrolled: enrolled_course_ids(enrollments),
        }
    }

    pub fn is_enrolled(&self, course_id: &str) -> bool {
        self.enrolled.contains(course_id)
    }

    /// Record a confirmed enroll: bump the count and remember the course.
    pub fn apply_enroll(&mut self, course_id: &str) -> bool {
        self.enrolled.insert(course_id.to_string());
        apply_enroll_to(&mut self.courses, course_id)
    }
}

/// Locally owned view state.
///
/// Work that outlives the view (an in-flight request, say) holds a
/// [`ViewHandle`] instead of the state itself. Once the `View` is dropped,
/// updates through the handle are discarded.
#[derive(Debug)]
pub struct View<T> {
    state: Arc<Mutex<T>>,
}

impl<T> View<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> ViewHandle<T> {
        ViewHandle {
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.state))
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut lock(&self.state))
    }
}

#[derive(Debug)]
pub struct ViewHandle<T> {
    state: Weak<Mutex<T>>,
}

impl<T> Clone for ViewHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
        }
    }
}

impl<T> ViewHandle<T> {
    /// Apply `f` if the view still exists. Returns `None` when it was dropped.
    pub fn apply<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let state = self.state.upgrade()?;
        let mut guard = lock(&state);
        Some(f(&mut guard))
    }

    pub fn is_attached(&self) -> bool {
        self.state.strong_count() > 0
    }
}

// A panic inside an update closure leaves plain data behind, still usable.
fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
