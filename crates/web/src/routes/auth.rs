//! Authentication route handlers.
//!
//! Login, sign-up and logout with email and password. Credentials are checked
//! by the backend's auth API; the resulting session is kept server-side.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use coupix_core::{FormErrors, validate_login, validate_signup};

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{
    OptionalAuth, PageContext, clear_auth_session, safe_redirect, set_auth_session,
};
use crate::models::{Flash, push_flash};
use crate::services::AuthError;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Checkbox; present when ticked.
    pub remember_me: Option<String>,
    pub redirect_to: Option<String>,
}

/// Sign-up form data.
#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Query parameters for the login page.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub redirect_to: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub email: String,
    pub remember_me: bool,
    pub redirect_to: String,
    pub errors: FormErrors,
    pub error: Option<String>,
}

/// Sign-up page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub page: PageContext,
    pub name: String,
    pub email: String,
    pub errors: FormErrors,
    pub error: Option<String>,
}

fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials | AuthError::EmailNotConfirmed => StatusCode::UNAUTHORIZED,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::Backend(crate::backend::BackendError::RateLimited(_)) => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AuthError::Backend(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
///
/// Signed-in users are sent to their coupons.
pub async fn login_page(
    OptionalAuth(auth): OptionalAuth,
    page: PageContext,
    Query(query): Query<LoginQuery>,
) -> Response {
    if auth.is_some() {
        return Redirect::to("/").into_response();
    }

    LoginTemplate {
        page,
        email: String::new(),
        remember_me: false,
        redirect_to: query.redirect_to.unwrap_or_default(),
        errors: FormErrors::new(),
        error: None,
    }
    .into_response()
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let remember_me = form.remember_me.is_some();
    let redirect_to = form.redirect_to.unwrap_or_default();
    let render = |page, errors, error: Option<String>| LoginTemplate {
        page,
        email: form.email.trim().to_string(),
        remember_me,
        redirect_to: redirect_to.clone(),
        errors,
        error,
    };

    let credentials = match validate_login(&form.email, &form.password) {
        Ok(credentials) => credentials,
        Err(errors) => {
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, render(page, errors, None)).into_response());
        }
    };

    let auth = match state.auth().sign_in(&credentials).await {
        Ok(auth) => auth,
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            let status = auth_error_status(&e);
            let error = Some(e.user_message().to_string());
            return Ok((status, render(page, FormErrors::new(), error)).into_response());
        }
    };

    set_auth_session(&session, &auth, remember_me).await?;
    set_sentry_user(&auth.user_id(), Some(auth.user.email.as_str()));

    if let Err(e) = state.coupons().load(&auth).await {
        tracing::warn!(user_id = %auth.user_id(), error = %e, "Failed to load coupons after login");
    }

    push_flash(&session, Flash::success("Login successful")).await;
    Ok(Redirect::to(safe_redirect(Some(&redirect_to))).into_response())
}

// =============================================================================
// Sign-up Routes
// =============================================================================

/// Display the sign-up page.
pub async fn signup_page(OptionalAuth(auth): OptionalAuth, page: PageContext) -> Response {
    if auth.is_some() {
        return Redirect::to("/").into_response();
    }

    SignupTemplate {
        page,
        name: String::new(),
        email: String::new(),
        errors: FormErrors::new(),
        error: None,
    }
    .into_response()
}

/// Handle sign-up form submission.
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let render = |page, errors, error: Option<String>| SignupTemplate {
        page,
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        errors,
        error,
    };

    let sign_up = match validate_signup(
        &form.name,
        &form.email,
        &form.password,
        &form.password_confirm,
    ) {
        Ok(sign_up) => sign_up,
        Err(errors) => {
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, render(page, errors, None)).into_response());
        }
    };

    match state.auth().sign_up(&sign_up).await {
        Ok(Some(auth)) => {
            set_auth_session(&session, &auth, false).await?;
            set_sentry_user(&auth.user_id(), Some(auth.user.email.as_str()));
            push_flash(&session, Flash::success("Account created successfully")).await;
            Ok(Redirect::to("/").into_response())
        }
        Ok(None) => {
            push_flash(
                &session,
                Flash::success("Check your email to confirm your account, then sign in"),
            )
            .await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Sign-up failed");
            let status = auth_error_status(&e);
            let error = Some(e.user_message().to_string());
            Ok((status, render(page, FormErrors::new(), error)).into_response())
        }
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Sign out, clear the session and drop the cached coupon list.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(auth): OptionalAuth,
) -> Result<Response, AppError> {
    if let Some(auth) = auth {
        if let Err(e) = state.auth().sign_out(&auth).await {
            tracing::warn!(user_id = %auth.user_id(), error = %e, "Backend sign-out failed");
        }
        state.coupons().forget(auth.user_id()).await;
        tracing::info!(user_id = %auth.user_id(), "User logged out");
    }

    clear_auth_session(&session).await?;
    clear_sentry_user();
    push_flash(&session, Flash::success("Logged out successfully")).await;
    Ok(Redirect::to("/login").into_response())
}
