use serde::Deserialize;
use thiserror::Error;

/// Why a call was refused for lack of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No token was available locally; the request was never sent.
    MissingToken,
    /// The backend answered 401 for the token that was sent.
    Rejected,
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthRejection::MissingToken => f.write_str("no access token available"),
            AuthRejection::Rejected => f.write_str("token rejected or expired"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthenticated - {0}")]
    Unauthenticated(AuthRejection),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Already enrolled in this course")]
    AlreadyEnrolled,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct MessageBody {
    message: serde_json::Value,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable `message` out of a JSON error body, falling
    /// back to the (truncated) raw body. Some backends send a list of
    /// validation messages; those are joined.
    pub fn backend_message(body: &str) -> String {
        match serde_json::from_str::<MessageBody>(body).map(|b| b.message) {
            Ok(serde_json::Value::String(message)) => message,
            Ok(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            _ => Self::truncate_body(body.trim()),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::backend_message(body);
        match status.as_u16() {
            400 | 422 => ApiError::Validation(message),
            401 => ApiError::Unauthenticated(AuthRejection::Rejected),
            // Entities owned by another account are reported the same as absent ones
            403 | 404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::NetworkError(e) if e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_taxonomy() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthenticated(AuthRejection::Rejected)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, r#"{"message":"Enrollment not found"}"#),
            ApiError::NotFound(m) if m == "Enrollment not found"
        ));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, ""), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from_status(StatusCode::CONFLICT, "dup"),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, ""),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::ServerError(m) if m == "upstream down"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_backend_message_variants() {
        assert_eq!(ApiError::backend_message(r#"{"message":"Username taken"}"#), "Username taken");
        assert_eq!(
            ApiError::backend_message(r#"{"message":["password too short","username empty"]}"#),
            "password too short; username empty"
        );
        assert_eq!(ApiError::backend_message("plain text\n"), "plain text");
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 510 total bytes"));
    }

    #[test]
    fn test_missing_token_is_distinct_from_rejected() {
        let local = ApiError::Unauthenticated(AuthRejection::MissingToken);
        assert!(local.is_unauthenticated());
        assert!(local.to_string().contains("no access token"));
        assert!(!matches!(local, ApiError::Unauthenticated(AuthRejection::Rejected)));
    }
}
