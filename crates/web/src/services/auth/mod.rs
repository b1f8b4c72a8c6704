//! Authentication service.
//!
//! Password sign-in and sign-up against the backend's auth API, session
//! refresh, profile bootstrap and account self-service.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use coupix_core::{Credentials, NewProfile, PasswordChange, Profile, SignUp};

use crate::backend::{AuthSession, Backend, BackendError, SignUpOutcome, codes};

/// Authentication service.
///
/// Cheap to clone; all clones share the backend handle.
#[derive(Clone)]
pub struct AuthService {
    backend: Arc<dyn Backend>,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Sign in with validated credentials.
    ///
    /// Bootstraps the profile row on success. A profile failure is logged and
    /// does not fail the sign-in; the next profile read retries it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong,
    /// `AuthError::EmailNotConfirmed` if the account is not confirmed yet.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let session = self
            .backend
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await
            .map_err(AuthError::from_backend)?;

        if let Err(e) = self.ensure_profile(&session).await {
            warn!(user_id = %session.user_id(), error = %e, "Profile bootstrap failed");
        }

        info!(user_id = %session.user_id(), "User signed in");
        Ok(session)
    }

    /// Register a new account.
    ///
    /// Returns `None` when the backend requires email confirmation before the
    /// first sign-in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, sign_up), fields(email = %sign_up.email))]
    pub async fn sign_up(&self, sign_up: &SignUp) -> Result<Option<AuthSession>, AuthError> {
        let outcome = self
            .backend
            .sign_up(&sign_up.email, &sign_up.password, &sign_up.name)
            .await
            .map_err(AuthError::from_backend)?;

        match outcome {
            SignUpOutcome::SignedIn(session) => {
                if let Err(e) = self.ensure_profile(&session).await {
                    warn!(user_id = %session.user_id(), error = %e, "Profile bootstrap failed");
                }
                info!(user_id = %session.user_id(), "User registered");
                Ok(Some(session))
            }
            SignUpOutcome::ConfirmationRequired(user) => {
                info!(user_id = %user.id, "User registered, awaiting email confirmation");
                Ok(None)
            }
        }
    }

    /// Revoke the session at the backend.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if the backend call fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    pub async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        match self.backend.sign_out(&session.token()).await {
            // Token already gone: the user is signed out either way.
            Ok(()) | Err(BackendError::Unauthorized) => Ok(()),
            Err(e) => Err(AuthError::Backend(e)),
        }
    }

    /// Exchange the session's refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionExpired` if the refresh token is no longer
    /// accepted.
    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    pub async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        self.backend
            .refresh_session(&session.refresh_token)
            .await
            .map_err(|e| {
                debug!(error = %e, "Session refresh failed");
                AuthError::SessionExpired
            })
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Create the profile row if it is missing, then read it back.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if either call fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    pub async fn ensure_profile(&self, session: &AuthSession) -> Result<Profile, AuthError> {
        let token = session.token();
        let profile = NewProfile::new(
            session.user.id,
            session.user.name.as_deref(),
            session.user.email.clone(),
        );
        self.backend.insert_profile_if_absent(&token, &profile).await?;
        self.backend
            .get_profile(&token, profile.id)
            .await?
            .ok_or(AuthError::Backend(BackendError::NotFound))
    }

    /// Load the signed-in user's profile, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if the backend call fails.
    pub async fn profile(&self, session: &AuthSession) -> Result<Profile, AuthError> {
        match self
            .backend
            .get_profile(&session.token(), session.user_id())
            .await?
        {
            Some(profile) => Ok(profile),
            None => self.ensure_profile(session).await,
        }
    }

    /// Change the display name.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if the backend call fails.
    #[instrument(skip(self, session, name), fields(user_id = %session.user_id()))]
    pub async fn update_name(&self, session: &AuthSession, name: &str) -> Result<Profile, AuthError> {
        let token = session.token();
        if let Some(profile) = self
            .backend
            .update_profile_name(&token, session.user_id(), name)
            .await?
        {
            return Ok(profile);
        }

        // No row to update yet: create it, then retry once.
        self.ensure_profile(session).await?;
        self.backend
            .update_profile_name(&token, session.user_id(), name)
            .await?
            .ok_or(AuthError::Backend(BackendError::NotFound))
    }

    /// Change the password after re-verifying the current one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CurrentPasswordIncorrect` if the current password
    /// does not sign in, `AuthError::WeakPassword` if the backend rejects the
    /// new one.
    #[instrument(skip(self, session, change), fields(user_id = %session.user_id()))]
    pub async fn change_password(
        &self,
        session: &AuthSession,
        change: &PasswordChange,
    ) -> Result<(), AuthError> {
        self.backend
            .sign_in_with_password(&session.user.email, &change.current_password)
            .await
            .map_err(|e| match e.code() {
                Some(codes::INVALID_CREDENTIALS) => AuthError::CurrentPasswordIncorrect,
                _ => AuthError::from_backend(e),
            })?;

        self.backend
            .update_password(&session.token(), &change.new_password)
            .await
            .map_err(AuthError::from_backend)?;

        info!("Password changed");
        Ok(())
    }

    /// Delete the user's coupons and profile row, then sign out.
    ///
    /// The auth identity itself stays; removing it needs admin rights.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if a delete fails. Sign-out failures after
    /// the data is gone are only logged.
    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    pub async fn delete_account(&self, session: &AuthSession) -> Result<(), AuthError> {
        let token = session.token();
        self.backend
            .delete_all_coupons(&token, session.user_id())
            .await?;
        self.backend
            .delete_profile(&token, session.user_id())
            .await?;

        if let Err(e) = self.sign_out(session).await {
            warn!(error = %e, "Sign-out after account deletion failed");
        }

        info!("Account data deleted");
        Ok(())
    }

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the health check fails.
    pub async fn health(&self) -> Result<(), BackendError> {
        self.backend.health().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use coupix_core::{validate_login, validate_password_change, validate_signup};

    use super::*;
    use crate::backend::MemoryBackend;

    fn service() -> (AuthService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (AuthService::new(backend.clone()), backend)
    }

    async fn register(service: &AuthService) -> AuthSession {
        let sign_up = validate_signup("Noa", "noa@example.com", "secret1", "secret1").unwrap();
        service.sign_up(&sign_up).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile() {
        let (service, _) = service();
        let session = register(&service).await;

        let profile = service.profile(&session).await.unwrap();
        assert_eq!(profile.name, "Noa");
        assert_eq!(profile.email.as_str(), "noa@example.com");
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let (service, _) = service();
        register(&service).await;

        let wrong = validate_login("noa@example.com", "wrong-password").unwrap();
        assert!(matches!(
            service.sign_in(&wrong).await,
            Err(AuthError::InvalidCredentials)
        ));

        let duplicate = validate_signup("Noa", "noa@example.com", "secret1", "secret1").unwrap();
        assert!(matches!(
            service.sign_up(&duplicate).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_ensure_profile_is_idempotent() {
        let (service, _) = service();
        let session = register(&service).await;

        let first = service.ensure_profile(&session).await.unwrap();
        let second = service.ensure_profile(&session).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_name() {
        let (service, _) = service();
        let session = register(&service).await;

        let profile = service.update_name(&session, "Noa Levi").await.unwrap();
        assert_eq!(profile.name, "Noa Levi");
    }

    #[tokio::test]
    async fn test_change_password_reverifies_current() {
        let (service, _) = service();
        let session = register(&service).await;

        let wrong = validate_password_change("not-it!", "newsecret", "newsecret").unwrap();
        assert!(matches!(
            service.change_password(&session, &wrong).await,
            Err(AuthError::CurrentPasswordIncorrect)
        ));

        let change = validate_password_change("secret1", "newsecret", "newsecret").unwrap();
        service.change_password(&session, &change).await.unwrap();

        let login = validate_login("noa@example.com", "newsecret").unwrap();
        assert!(service.sign_in(&login).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_failure_is_session_expired() {
        let (service, _) = service();
        let session = register(&service).await;

        let refreshed = service.refresh(&session).await.unwrap();
        assert_eq!(refreshed.user_id(), session.user_id());
        assert!(matches!(
            service.refresh(&session).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_delete_account_signs_out() {
        let (service, _) = service();
        let session = register(&service).await;

        service.delete_account(&session).await.unwrap();
        assert!(matches!(
            service.profile(&session).await,
            Err(AuthError::Backend(BackendError::Unauthorized))
        ));
    }
}
