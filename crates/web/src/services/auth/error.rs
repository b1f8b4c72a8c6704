//! Authentication error types.

use thiserror::Error;

use crate::backend::{BackendError, codes};

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account exists but its email is not confirmed yet.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// The backend rejected the password as too weak.
    #[error("password is too weak")]
    WeakPassword,

    /// The backend rejected the email address.
    #[error("invalid email address")]
    InvalidEmail,

    /// Re-verification of the current password failed.
    #[error("current password is incorrect")]
    CurrentPasswordIncorrect,

    /// The session can no longer be refreshed.
    #[error("session expired")]
    SessionExpired,

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Map a backend failure to the auth error it represents.
    #[must_use]
    pub fn from_backend(err: BackendError) -> Self {
        match err.code() {
            Some(codes::INVALID_CREDENTIALS) => Self::InvalidCredentials,
            Some(codes::EMAIL_NOT_CONFIRMED) => Self::EmailNotConfirmed,
            Some(codes::USER_ALREADY_EXISTS) => Self::UserAlreadyExists,
            Some(codes::WEAK_PASSWORD) => Self::WeakPassword,
            Some(codes::EMAIL_ADDRESS_INVALID | codes::VALIDATION_FAILED) => Self::InvalidEmail,
            _ => Self::Backend(err),
        }
    }

    /// Message shown to the user on the form.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid email or password",
            Self::EmailNotConfirmed => "Please confirm your email address before signing in",
            Self::UserAlreadyExists => "An account with this email already exists",
            Self::WeakPassword => "Please choose a stronger password",
            Self::InvalidEmail => "Please enter a valid email address",
            Self::CurrentPasswordIncorrect => "Current password is incorrect",
            Self::SessionExpired => "Your session has expired, please sign in again",
            Self::Backend(BackendError::RateLimited(_)) => {
                "Too many attempts, please try again later"
            }
            Self::Backend(_) => "Something went wrong, please try again",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_backend_codes() {
        let map = |code| AuthError::from_backend(BackendError::api(400, code, "x"));
        assert!(matches!(map(codes::INVALID_CREDENTIALS), AuthError::InvalidCredentials));
        assert!(matches!(map(codes::EMAIL_NOT_CONFIRMED), AuthError::EmailNotConfirmed));
        assert!(matches!(map(codes::USER_ALREADY_EXISTS), AuthError::UserAlreadyExists));
        assert!(matches!(map(codes::WEAK_PASSWORD), AuthError::WeakPassword));
        assert!(matches!(map(codes::VALIDATION_FAILED), AuthError::InvalidEmail));
        assert!(matches!(map("unexpected_failure"), AuthError::Backend(_)));
        assert!(matches!(
            AuthError::from_backend(BackendError::NotFound),
            AuthError::Backend(BackendError::NotFound)
        ));
    }
}
