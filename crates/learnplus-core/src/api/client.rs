//! HTTP client for the Learn Plus backend.
//!
//! `ApiClient` knows endpoints, headers and response shapes. It holds no
//! session state: authenticated calls take the bearer token as an argument,
//! and callers normally reach them through [`EnrollmentGateway`], which
//! supplies the current token from the session store.
//!
//! [`EnrollmentGateway`]: super::EnrollmentGateway

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::models::{Course, Enrollment};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default backend location for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Cookie carrying the access token on sign-in and refresh responses.
const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Cookie carrying the refresh credential.
const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Tokens handed out by the backend on sign-in or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenBody {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageResponse {
    message: Option<String>,
}

/// API client for the Learn Plus backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client for `base_url` with the default timeout
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Validation(format!("Invalid API URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Validation(format!("Invalid API URL {}", base_url)));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL below the configured base. Segments are
    /// percent-encoded, so ids cannot escape their path position.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint(segments);
        debug!(%method, %url, "Sending request");
        let mut request = self.request(method.clone(), url, token);
        if method != Method::GET && method != Method::DELETE {
            request = request.json(&serde_json::json!({}));
        }
        let response = request.send().await?;
        debug!(status = %response.status(), "Response received");
        Self::check_response(response).await
    }

    // ===== Authentication =====

    /// Register a new account. Returns the backend's confirmation message.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["auth", "signup"]);
        debug!(%url, "Signing up");

        let response = self
            .request(Method::POST, url, None)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<MessageResponse>(&text)
            .ok()
            .and_then(|m| m.message)
            .unwrap_or_else(|| "Signup successful".to_string());
        Ok(message)
    }

    /// Exchange credentials for an access token.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<IssuedTokens, ApiError> {
        let url = self.endpoint(&["auth", "signin"]);
        debug!(%url, "Signing in");

        let response = self
            .request(Method::POST, url, None)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        Self::read_tokens(response).await
    }

    /// Exchange a refresh credential for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<IssuedTokens, ApiError> {
        let url = self.endpoint(&["auth", "refresh-token"]);
        debug!(%url, "Refreshing access token");

        let response = self
            .request(Method::POST, url, None)
            .header(
                header::COOKIE,
                format!("{}={}", REFRESH_TOKEN_COOKIE, refresh_token),
            )
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        Self::read_tokens(response).await
    }

    /// Collect tokens from `Set-Cookie` headers, then from the JSON body.
    ///
    /// The access token comes from the `accessToken` cookie if present,
    /// otherwise from the body's `accessToken` field, otherwise from the
    /// first cookie set on the response other than `refreshToken`.
    async fn read_tokens(response: Response) -> Result<IssuedTokens, ApiError> {
        let cookies: Vec<(String, String)> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();

        let text = response.text().await.unwrap_or_default();
        let body: TokenBody = serde_json::from_str(&text).unwrap_or_default();

        let cookie = |name: &str| {
            cookies
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };

        let access_token = cookie(ACCESS_TOKEN_COOKIE)
            .or(body.access_token)
            .or_else(|| {
                cookies
                    .iter()
                    .find(|(n, _)| n != REFRESH_TOKEN_COOKIE)
                    .map(|(_, v)| v.clone())
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::InvalidResponse("Access token not found in the response".to_string())
            })?;

        let refresh_token = cookie(REFRESH_TOKEN_COOKIE)
            .or(body.refresh_token)
            .filter(|t| !t.is_empty() && *t != access_token);

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    // ===== Catalog =====

    /// Fetch the public course catalog. No authentication required.
    pub async fn fetch_courses(&self) -> Result<Vec<Course>, ApiError> {
        let response = self.send(Method::GET, &["courses"], None).await?;
        Self::parse_json(response, "courses").await
    }

    // ===== Enrollments =====

    pub async fn fetch_enrollments(&self, token: &str) -> Result<Vec<Enrollment>, ApiError> {
        let response = self
            .send(Method::GET, &["auth", "enrollments"], Some(token))
            .await?;
        Self::parse_json(response, "enrollments").await
    }

    pub async fn fetch_enrollment(
        &self,
        token: &str,
        enrollment_id: &str,
    ) -> Result<Enrollment, ApiError> {
        let response = self
            .send(
                Method::GET,
                &["auth", "enrollments", enrollment_id],
                Some(token),
            )
            .await?;
        Self::parse_json(response, "enrollment").await
    }

    pub async fn enroll(&self, token: &str, course_id: &str) -> Result<(), ApiError> {
        self.send(Method::POST, &["auth", "enroll", course_id], Some(token))
            .await?;
        Ok(())
    }

    pub async fn unenroll(&self, token: &str, enrollment_id: &str) -> Result<(), ApiError> {
        self.send(
            Method::DELETE,
            &["auth", "unenroll", enrollment_id],
            Some(token),
        )
        .await?;
        Ok(())
    }

    pub async fn complete_lesson(
        &self,
        token: &str,
        enrollment_id: &str,
        lesson_id: &str,
    ) -> Result<(), ApiError> {
        self.send(
            Method::PATCH,
            &[
                "auth",
                "enrollments",
                enrollment_id,
                "lessons",
                lesson_id,
                "complete",
            ],
            Some(token),
        )
        .await?;
        Ok(())
    }
}

/// Split the `name=value` pair off a `Set-Cookie` header value.
fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}
