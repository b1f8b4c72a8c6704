//! Light/dark theme toggle.

use axum::{
    Form,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use coupix_core::Theme;

use crate::error::AppError;
use crate::middleware::safe_redirect;
use crate::models::session_keys;

#[derive(Debug, Deserialize)]
pub struct ThemeForm {
    /// Page to return to.
    pub back: Option<String>,
}

/// Flip the stored theme and return to the page the toggle was pressed on.
pub async fn toggle(session: Session, Form(form): Form<ThemeForm>) -> Result<Response, AppError> {
    let current: Theme = session
        .get(session_keys::THEME)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let next = current.toggle();
    session.insert(session_keys::THEME, next).await?;
    tracing::debug!(theme = next.as_str(), "Theme changed");

    Ok(Redirect::to(safe_redirect(form.back.as_deref())).into_response())
}
