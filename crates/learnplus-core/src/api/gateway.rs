//! Authenticated enrollment operations.

use tracing::{debug, info};

use crate::auth::session::require_token;
use crate::auth::SessionStore;
use crate::models::Enrollment;
use crate::utils::find_by_slug;

use super::{ApiClient, ApiError};

/// Enrollment operations on behalf of the current session.
///
/// Each call reads the token from the session store at the moment it is
/// made. Without a token the call fails with
/// `ApiError::Unauthenticated(AuthRejection::MissingToken)` before anything
/// is sent; a token the backend refuses yields `AuthRejection::Rejected`.
/// Nothing is retried, and duplicate calls are passed through as-is.
#[derive(Clone, Debug)]
pub struct EnrollmentGateway {
    api: ApiClient,
    session: SessionStore,
}

impl EnrollmentGateway {
    pub fn new(api: ApiClient, session: SessionStore) -> Self {
        Self { api, session }
    }

    /// Gateway sharing the session store's HTTP client.
    pub fn for_session(session: SessionStore) -> Self {
        Self::new(session.api().clone(), session)
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn list_enrollments(&self) -> Result<Vec<Enrollment>, ApiError> {
        let token = require_token(&self.session)?;
        let enrollments = self.api.fetch_enrollments(&token).await?;
        debug!(count = enrollments.len(), "Fetched enrollments");
        Ok(enrollments)
    }

    pub async fn get_enrollment_detail(&self, enrollment_id: &str) -> Result<Enrollment, ApiError> {
        let token = require_token(&self.session)?;
        self.api.fetch_enrollment(&token, enrollment_id).await
    }

    /// Resolve an enrollment by its course slug, then fetch its detail.
    pub async fn find_enrollment_by_slug(&self, slug: &str) -> Result<Enrollment, ApiError> {
        let enrollments = self.list_enrollments().await?;
        let enrollment = find_by_slug(&enrollments, slug)
            .ok_or_else(|| ApiError::NotFound(format!("No enrollment for course '{}'", slug)))?;
        self.get_enrollment_detail(&enrollment.id).await
    }

    /// Enroll in a course. A 409 from the backend is reported as
    /// `AlreadyEnrolled`.
    pub async fn enroll(&self, course_id: &str) -> Result<(), ApiError> {
        let token = require_token(&self.session)?;
        match self.api.enroll(&token, course_id).await {
            Ok(()) => {
                info!(course_id, "Enrolled");
                Ok(())
            }
            Err(ApiError::Conflict(_)) => Err(ApiError::AlreadyEnrolled),
            Err(e) => Err(e),
        }
    }

    pub async fn unenroll(&self, enrollment_id: &str) -> Result<(), ApiError> {
        let token = require_token(&self.session)?;
        self.api.unenroll(&token, enrollment_id).await?;
        info!(enrollment_id, "Unenrolled");
        Ok(())
    }

    pub async fn complete_lesson_progress(
        &self,
        enrollment_id: &str,
        lesson_id: &str,
    ) -> Result<(), ApiError> {
        let token = require_token(&self.session)?;
        self.api
            .complete_lesson(&token, enrollment_id, lesson_id)
            .await?;
        info!(enrollment_id, lesson_id, "Lesson marked complete");
        Ok(())
    }
}
