//! REST API client module for the Learn Plus backend.
//!
//! This module provides the `ApiClient` for raw endpoint access and the
//! `EnrollmentGateway` for authenticated enrollment operations.
//!
//! Authenticated endpoints use a bearer token issued at sign-in and held
//! by the session store.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::{ApiClient, IssuedTokens, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{ApiError, AuthRejection};
pub use gateway::EnrollmentGateway;
