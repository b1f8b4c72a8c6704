//! Session keys.
//!
//! The signed-in [`AuthSession`](crate::backend::AuthSession) is stored under
//! [`keys::AUTH_SESSION`]; everything else in the session is presentation state.

/// Session keys.
pub mod keys {
    /// The backend session of the signed-in user.
    pub const AUTH_SESSION: &str = "auth_session";

    /// Pending flash notifications.
    pub const FLASH: &str = "flash";

    /// Light or dark theme.
    pub const THEME: &str = "theme";
}
