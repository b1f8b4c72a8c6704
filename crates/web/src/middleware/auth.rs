//! Authentication extractors and session helpers.
//!
//! The signed-in user's [`AuthSession`] lives in the server-side session.
//! [`RequireAuth`] guards coupon and profile routes and refreshes an expired
//! access token once before giving up.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::{Expiry, Session};

use crate::backend::AuthSession;
use crate::models::session_keys;
use crate::state::AppState;

/// How long a remembered session survives without activity.
const REMEMBER_ME_DAYS: i64 = 30;

/// Extractor that requires a signed-in user.
///
/// Without a session, redirects to `/login?redirect_to=<path+query>`.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(auth): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", auth.user.email)
/// }
/// ```
pub struct RequireAuth(pub AuthSession);

/// Error returned when authentication is required but the user is not signed in.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to the login page, remembering where the user was going.
    RedirectToLogin(String),
    /// The session layer is missing.
    MissingSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(target) => Redirect::to(&login_redirect(&target)).into_response(),
            Self::MissingSession => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Login URL that returns to `target` after signing in.
#[must_use]
pub fn login_redirect(target: &str) -> String {
    if is_local_path(target) {
        format!("/login?redirect_to={}", urlencoding::encode(target))
    } else {
        "/login".to_string()
    }
}

/// Whether `target` is a path on this site.
///
/// Rejects absolute URLs and protocol-relative `//host` forms.
#[must_use]
pub fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

/// The post-login destination: `redirect_to` if it is local, else `/`.
#[must_use]
pub fn safe_redirect(redirect_to: Option<&str>) -> &str {
    redirect_to.filter(|t| is_local_path(t)).unwrap_or("/")
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::MissingSession)?;

        let auth: AuthSession = session
            .get(session_keys::AUTH_SESSION)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| AuthRejection::RedirectToLogin(target.clone()))?;

        if !auth.is_expired(Utc::now()) {
            return Ok(Self(auth));
        }

        match state.auth().refresh(&auth).await {
            Ok(refreshed) => {
                if let Err(e) = session.insert(session_keys::AUTH_SESSION, &refreshed).await {
                    tracing::warn!(error = %e, "Failed to store refreshed session");
                }
                tracing::debug!(user_id = %refreshed.user_id(), "Access token refreshed");
                Ok(Self(refreshed))
            }
            Err(e) => {
                tracing::info!(user_id = %auth.user_id(), error = %e, "Session expired");
                state.coupons().forget(auth.user_id()).await;
                if let Err(e) = clear_auth_session(&session).await {
                    tracing::warn!(error = %e, "Failed to clear expired session");
                }
                Err(AuthRejection::RedirectToLogin(target))
            }
        }
    }
}

/// Extractor that optionally gets the signed-in user.
///
/// Unlike `RequireAuth`, this does not reject the request and does not
/// refresh the token.
pub struct OptionalAuth(pub Option<AuthSession>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<AuthSession>(session_keys::AUTH_SESSION)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(auth))
    }
}

/// Store the signed-in session.
///
/// With `remember_me` the cookie outlives the browser and expires after 30
/// days of inactivity; otherwise it ends with the browser session. The session
/// id is rotated to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_auth_session(
    session: &Session,
    auth: &AuthSession,
    remember_me: bool,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.set_expiry(Some(if remember_me {
        Expiry::OnInactivity(tower_sessions::cookie::time::Duration::days(REMEMBER_ME_DAYS))
    } else {
        Expiry::OnSessionEnd
    }));
    session.insert(session_keys::AUTH_SESSION, auth).await
}

/// Remove the signed-in session (logout).
///
/// Keeps the rest of the session so a flash can still be shown.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_auth_session(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<AuthSession>(session_keys::AUTH_SESSION)
        .await?;
    session.set_expiry(Some(Expiry::OnSessionEnd));
    session.cycle_id().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_local_path() {
        assert!(is_local_path("/"));
        assert!(is_local_path("/edit/123?x=1"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("/\\evil.example"));
        assert!(!is_local_path("https://evil.example/"));
        assert!(!is_local_path(""));
    }

    #[test]
    fn test_safe_redirect() {
        assert_eq!(safe_redirect(None), "/");
        assert_eq!(safe_redirect(Some("/profile")), "/profile");
        assert_eq!(safe_redirect(Some("//evil.example")), "/");
    }

    #[test]
    fn test_login_redirect_encodes_target() {
        assert_eq!(login_redirect("/"), "/login?redirect_to=%2F");
        assert_eq!(login_redirect("//evil.example"), "/login");
        assert_eq!(
            login_redirect("/?status=active&q=buy"),
            "/login?redirect_to=%2F%3Fstatus%3Dactive%26q%3Dbuy"
        );
    }
}
