//! Learn Plus core - API client, session store, models and view reconciliation.
//!
//! The pieces fit together as follows:
//!
//! - [`auth::SessionStore`] signs in, restores a persisted session, keeps the
//!   access token fresh on a background timer, and signs out.
//! - [`api::EnrollmentGateway`] performs enrollment calls with the store's
//!   current token.
//! - [`reconcile`] updates a caller's local courses and enrollments once a
//!   mutating call has succeeded.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod reconcile;
pub mod utils;

pub use api::{ApiClient, ApiError, AuthRejection, EnrollmentGateway};
pub use auth::{AuthError, Session, SessionStatus, SessionStore, TokenStore};
pub use config::Config;
pub use reconcile::ReconcileError;
