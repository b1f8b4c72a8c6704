//! Per-request data every rendered page needs.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use coupix_core::Theme;

use crate::backend::{AuthSession, AuthUser};
use crate::models::{Flash, session_keys, take_flashes};

/// Layout context for `base.html`: who is signed in, the theme, pending
/// flashes and the current path.
///
/// Extracting it consumes the pending flashes, so only handlers that render
/// a page should take it.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub user: Option<AuthUser>,
    pub theme: Theme,
    pub flashes: Vec<Flash>,
    /// Path and query of the current request, for redirect-back forms.
    pub path: String,
}

impl PageContext {
    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    /// Display name for the header.
    #[must_use]
    pub fn user_label(&self) -> &str {
        self.user.as_ref().map_or("", |user| {
            user.name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| user.email.as_str())
        })
    }
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let path = parts
            .uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());

        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self {
                path,
                ..Self::default()
            });
        };

        let user = session
            .get::<AuthSession>(session_keys::AUTH_SESSION)
            .await
            .ok()
            .flatten()
            .map(|auth| auth.user);
        let theme = session
            .get::<Theme>(session_keys::THEME)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let flashes = take_flashes(session).await;

        Ok(Self {
            user,
            theme,
            flashes,
            path,
        })
    }
}
