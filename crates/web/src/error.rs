//! Unified error handling with Sentry integration.
//!
//! Route handlers deal with expected failures themselves (re-rendering a
//! form, or flashing and redirecting). Whatever is left propagates as
//! `AppError`, which captures server-side failures to Sentry before
//! responding.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::backend::BackendError;
use crate::services::{AuthError, CouponError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend operation failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Coupon operation failed.
    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The backend rejected the user's token: treat as signed out.
    const fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Backend(BackendError::Unauthorized)
                | Self::Coupon(CouponError::Backend(BackendError::Unauthorized))
                | Self::Auth(AuthError::SessionExpired | AuthError::Backend(BackendError::Unauthorized))
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Backend(err) | Self::Coupon(CouponError::Backend(err)) | Self::Auth(AuthError::Backend(err)) => {
                backend_status(err)
            }
            Self::Coupon(CouponError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Coupon(CouponError::Conflict | CouponError::NotActive) => StatusCode::CONFLICT,
            Self::Coupon(CouponError::Image(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::UserAlreadyExists) => StatusCode::CONFLICT,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Session(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

const fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::Unauthorized => StatusCode::UNAUTHORIZED,
        BackendError::PolicyViolation(_) => StatusCode::FORBIDDEN,
        BackendError::NotFound => StatusCode::NOT_FOUND,
        BackendError::Conflict(_) => StatusCode::CONFLICT,
        BackendError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        BackendError::Storage(_)
        | BackendError::Http(_)
        | BackendError::Api { .. }
        | BackendError::Parse(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_unauthorized() {
            tracing::info!(error = %self, "Backend rejected session, redirecting to login");
            return Redirect::to("/login").into_response();
        }

        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Coupon(err) => err.user_message().to_string(),
            Self::Auth(err) => err.user_message().to_string(),
            Self::NotFound(_) | Self::BadRequest(_) => self.to_string(),
            _ if status == StatusCode::BAD_GATEWAY => "External service error".to_string(),
            _ if status == StatusCode::TOO_MANY_REQUESTS => "Too many requests".to_string(),
            _ if status.is_server_error() => "Internal server error".to_string(),
            _ => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
