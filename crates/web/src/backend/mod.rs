//! Backend-as-a-service ports.
//!
//! Coupix delegates authentication, row storage and image storage to a
//! hosted backend. The services only see the traits in this module:
//!
//! - [`AuthApi`] - password sign-in, sign-up, refresh, sign-out, password update
//! - [`TableApi`] - the `coupons` and `profiles` tables, scoped by the caller's token
//! - [`StorageApi`] - image uploads to the coupon bucket
//!
//! [`SupabaseBackend`] talks to a hosted project over HTTPS. [`MemoryBackend`]
//! keeps everything in process and backs the tests and `COUPIX_BACKEND=memory`.

pub mod memory;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use coupix_core::{Coupon, CouponDraft, CouponId, Email, ImageUpload, NewProfile, Profile, UserId};

pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

/// Machine-readable error codes returned by the auth API.
pub mod codes {
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const EMAIL_NOT_CONFIRMED: &str = "email_not_confirmed";
    pub const USER_ALREADY_EXISTS: &str = "user_already_exists";
    pub const WEAK_PASSWORD: &str = "weak_password";
    pub const EMAIL_ADDRESS_INVALID: &str = "email_address_invalid";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const REFRESH_TOKEN_NOT_FOUND: &str = "refresh_token_not_found";
    pub const SESSION_NOT_FOUND: &str = "session_not_found";
}

/// Errors from any backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Missing, expired or revoked access token.
    #[error("unauthorized")]
    Unauthorized,

    /// A row-level policy rejected the operation.
    #[error("row policy violation: {0}")]
    PolicyViolation(String),

    /// The addressed row or object does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limited, retry after the given number of seconds.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Object storage rejected the upload.
    #[error("storage error: {0}")]
    Storage(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other error response.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl BackendError {
    /// The auth API error code, if the backend returned one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn api(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    /// Recover an error handed out by a shared loader.
    ///
    /// Transport and parse errors cannot be cloned, so waiters other than the
    /// last owner see them as a 502 API error with the same message.
    #[must_use]
    pub fn from_shared(err: Arc<Self>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(|shared| match &*shared {
            Self::Unauthorized => Self::Unauthorized,
            Self::PolicyViolation(message) => Self::PolicyViolation(message.clone()),
            Self::NotFound => Self::NotFound,
            Self::Conflict(message) => Self::Conflict(message.clone()),
            Self::RateLimited(seconds) => Self::RateLimited(*seconds),
            Self::Storage(message) => Self::Storage(message.clone()),
            Self::Api {
                status,
                code,
                message,
            } => Self::Api {
                status: *status,
                code: code.clone(),
                message: message.clone(),
            },
            Self::Http(_) | Self::Parse(_) => Self::Api {
                status: 502,
                code: None,
                message: shared.to_string(),
            },
        })
    }
}

/// A user access token.
///
/// Sent as the bearer token so the backend applies row policies for the
/// signed-in user.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// The identity the auth API knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Email,
    /// Display name from sign-up metadata.
    pub name: Option<String>,
}

/// A signed-in session as issued by the auth API.
///
/// Stored in the server-side session. Implements `Debug` manually to redact
/// the tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn token(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone())
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Whether the access token has expired, with a small margin for clock skew.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(30) >= self.expires_at
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Result of a sign-up request.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The account is usable immediately.
    SignedIn(AuthSession),
    /// The backend requires email confirmation before the first sign-in.
    ConfirmationRequired(AuthUser),
}

/// Authentication API.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Sign in with email and password.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthSession, BackendError>;

    /// Register a new account with a display name in its metadata.
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        name: &str,
    ) -> Result<SignUpOutcome, BackendError>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError>;

    /// Revoke the session behind `token`.
    async fn sign_out(&self, token: &AccessToken) -> Result<(), BackendError>;

    /// Set a new password for the signed-in user.
    async fn update_password(
        &self,
        token: &AccessToken,
        new_password: &str,
    ) -> Result<(), BackendError>;

    /// Check that the backend is reachable.
    async fn health(&self) -> Result<(), BackendError>;
}

/// Row storage for coupons and profiles.
///
/// Every call carries the user's token, and every coupon call is scoped by
/// both the coupon id and the owner.
#[async_trait]
pub trait TableApi: Send + Sync {
    /// All of `owner`'s coupons, newest first.
    async fn list_coupons(
        &self,
        token: &AccessToken,
        owner: UserId,
    ) -> Result<Vec<Coupon>, BackendError>;

    async fn get_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<Option<Coupon>, BackendError>;

    /// Insert a coupon and return the stored row.
    async fn insert_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        draft: &CouponDraft,
    ) -> Result<Coupon, BackendError>;

    /// Overwrite the editable fields if the row still has `expected_updated_at`.
    ///
    /// Returns `None` when no row matched.
    async fn update_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
        draft: &CouponDraft,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Option<Coupon>, BackendError>;

    /// Set `is_redeemed` on a coupon that is not redeemed yet.
    ///
    /// Returns `None` when no unredeemed row matched.
    async fn redeem_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<Option<Coupon>, BackendError>;

    /// Delete a coupon. Returns whether a row was removed.
    async fn delete_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<bool, BackendError>;

    /// Delete every coupon `owner` has.
    async fn delete_all_coupons(&self, token: &AccessToken, owner: UserId)
    -> Result<(), BackendError>;

    /// Insert the profile unless a row with the same id exists.
    async fn insert_profile_if_absent(
        &self,
        token: &AccessToken,
        profile: &NewProfile,
    ) -> Result<(), BackendError>;

    async fn get_profile(
        &self,
        token: &AccessToken,
        id: UserId,
    ) -> Result<Option<Profile>, BackendError>;

    async fn update_profile_name(
        &self,
        token: &AccessToken,
        id: UserId,
        name: &str,
    ) -> Result<Option<Profile>, BackendError>;

    async fn delete_profile(&self, token: &AccessToken, id: UserId) -> Result<(), BackendError>;
}

/// Object storage for coupon images.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Upload an image under `key` and return its public URL.
    async fn upload_image(
        &self,
        token: &AccessToken,
        key: &str,
        image: &ImageUpload,
    ) -> Result<String, BackendError>;

    /// Remove a previously uploaded image by its public URL.
    ///
    /// URLs that do not point into the owner's storage are ignored.
    async fn delete_image(&self, token: &AccessToken, image_url: &str) -> Result<(), BackendError>;
}

/// Everything the services need from the backend.
pub trait Backend: AuthApi + TableApi + StorageApi {}

impl<T: AuthApi + TableApi + StorageApi> Backend for T {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(expires_at: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: "access-token-value".to_string(),
            refresh_token: "refresh-token-value".to_string(),
            expires_at,
            user: AuthUser {
                id: UserId::random(),
                email: Email::parse("tal@example.com").unwrap(),
                name: Some("Tal".to_string()),
            },
        }
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let debug_output = format!("{:?}", session(Utc::now()));
        assert!(debug_output.contains("tal@example.com"));
        assert!(!debug_output.contains("access-token-value"));
        assert!(!debug_output.contains("refresh-token-value"));
        assert!(!format!("{:?}", AccessToken::new("abc")).contains("abc"));
    }

    #[test]
    fn test_session_expiry_margin() {
        let now = Utc::now();
        assert!(session(now + chrono::Duration::seconds(10)).is_expired(now));
        assert!(!session(now + chrono::Duration::minutes(10)).is_expired(now));
    }

    #[test]
    fn test_error_code() {
        let err = BackendError::api(400, codes::INVALID_CREDENTIALS, "Invalid login credentials");
        assert_eq!(err.code(), Some("invalid_credentials"));
        assert_eq!(BackendError::NotFound.code(), None);
    }

    #[test]
    fn test_from_shared_keeps_variant() {
        let only = Arc::new(BackendError::Conflict("stale".to_string()));
        assert!(matches!(BackendError::from_shared(only), BackendError::Conflict(m) if m == "stale"));

        let first = Arc::new(BackendError::Unauthorized);
        let second = Arc::clone(&first);
        assert!(matches!(BackendError::from_shared(first), BackendError::Unauthorized));
        assert!(matches!(BackendError::from_shared(second), BackendError::Unauthorized));

        let parse = serde_json::from_str::<u32>("x").unwrap_err();
        let first = Arc::new(BackendError::Parse(parse));
        let _second = Arc::clone(&first);
        assert!(matches!(
            BackendError::from_shared(first),
            BackendError::Api { status: 502, .. }
        ));
    }
}
