//! Session middleware configuration.
//!
//! Sessions are held in process with tower-sessions' `MemoryStore`. They only
//! carry the backend session tokens and presentation state, so losing them on
//! restart just signs users out.

use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::CoupixConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "coupix_session";

/// Create the session layer.
///
/// Cookies last until the browser closes unless the user ticks "remember me"
/// at login, which switches that session to an inactivity expiry.
#[must_use]
pub fn create_session_layer(config: &CoupixConfig) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnSessionEnd)
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
