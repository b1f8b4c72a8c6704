//! Profile and account self-service.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use coupix_core::{FormErrors, Profile, validate_password_change, validate_profile_name};

use crate::backend::AuthSession;
use crate::error::{AppError, clear_sentry_user};
use crate::filters;
use crate::middleware::{PageContext, RequireAuth, clear_auth_session};
use crate::models::{Flash, push_flash};
use crate::services::AuthError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NameForm {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// Profile page template.
#[derive(Template, WebTemplate)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub page: PageContext,
    pub profile: Profile,
    /// Value shown in the name input.
    pub name: String,
    pub name_errors: FormErrors,
    pub password_errors: FormErrors,
    /// Inline message for a failed password change.
    pub password_error: Option<String>,
    pub active_count: usize,
    pub total_count: usize,
}

/// Account deletion confirmation.
#[derive(Template, WebTemplate)]
#[template(path = "coupons/confirm.html")]
pub struct DeleteAccountTemplate {
    pub page: PageContext,
    pub title: &'static str,
    pub message: String,
    pub action: String,
    pub confirm_label: &'static str,
    pub danger: bool,
    pub view: String,
    pub back: String,
}

impl ProfileTemplate {
    async fn load(state: &AppState, auth: &AuthSession, page: PageContext) -> Result<Self, AppError> {
        let profile = state.auth().profile(auth).await?;
        let today = chrono::Utc::now().date_naive();
        let (active_count, total_count) = match state.coupons().list(auth).await {
            Ok(list) => (list.iter().filter(|c| c.is_active(today)).count(), list.len()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load coupon counts");
                (0, 0)
            }
        };

        Ok(Self {
            page,
            name: profile.name.clone(),
            profile,
            name_errors: FormErrors::new(),
            password_errors: FormErrors::new(),
            password_error: None,
            active_count,
            total_count,
        })
    }
}

/// Display the profile page.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    page: PageContext,
) -> Result<Response, AppError> {
    Ok(ProfileTemplate::load(&state, &auth, page).await?.into_response())
}

/// Update the display name.
pub async fn update_name(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    page: PageContext,
    Form(form): Form<NameForm>,
) -> Result<Response, AppError> {
    let name = match validate_profile_name(&form.name) {
        Ok(name) => name,
        Err(errors) => {
            let mut template = ProfileTemplate::load(&state, &auth, page).await?;
            template.name = form.name;
            template.name_errors = errors;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, template).into_response());
        }
    };

    match state.auth().update_name(&auth, &name).await {
        Ok(_) => push_flash(&session, Flash::success("Profile updated successfully")).await,
        Err(AuthError::Backend(crate::backend::BackendError::Unauthorized)) => {
            return Err(AuthError::SessionExpired.into());
        }
        Err(e) => {
            tracing::warn!(error = %e, "Profile update failed");
            push_flash(&session, Flash::error(e.user_message())).await;
        }
    }
    Ok(Redirect::to("/profile").into_response())
}

/// Change the password after re-verifying the current one.
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    mut page: PageContext,
    Form(form): Form<PasswordForm>,
) -> Result<Response, AppError> {
    let change = match validate_password_change(
        &form.current_password,
        &form.new_password,
        &form.confirm_password,
    ) {
        Ok(change) => change,
        Err(errors) => {
            let mut template = ProfileTemplate::load(&state, &auth, page).await?;
            template.password_errors = errors;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, template).into_response());
        }
    };

    match state.auth().change_password(&auth, &change).await {
        Ok(()) => {
            push_flash(&session, Flash::success("Password updated successfully")).await;
            Ok(Redirect::to("/profile").into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Password change failed");
            let message = e.user_message();
            page.flashes.push(Flash::error(message));
            let status = match e {
                AuthError::CurrentPasswordIncorrect => StatusCode::UNAUTHORIZED,
                AuthError::WeakPassword => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            };
            let mut template = ProfileTemplate::load(&state, &auth, page).await?;
            template.password_error = Some(message.to_string());
            Ok((status, template).into_response())
        }
    }
}

/// Ask for confirmation before deleting the account.
pub async fn confirm_delete(RequireAuth(auth): RequireAuth, page: PageContext) -> Response {
    DeleteAccountTemplate {
        page,
        title: "Delete your account?",
        message: format!(
            "All coupons and the profile for {} will be permanently deleted, and you will be signed out.",
            auth.user.email
        ),
        action: "/profile/delete".to_string(),
        confirm_label: "Delete account",
        danger: true,
        view: String::new(),
        back: "/profile".to_string(),
    }
    .into_response()
}

/// Delete the user's coupons and profile, then sign out.
pub async fn delete_account(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
) -> Result<Response, AppError> {
    let result = state.auth().delete_account(&auth).await;
    // Coupons may already be gone even when a later step failed.
    state.coupons().forget(auth.user_id()).await;

    if let Err(e) = result {
        tracing::error!(user_id = %auth.user_id(), error = %e, "Account deletion failed");
        push_flash(&session, Flash::error("Failed to delete account, please try again")).await;
        return Ok(Redirect::to("/profile").into_response());
    }

    clear_auth_session(&session).await?;
    clear_sentry_user();
    push_flash(&session, Flash::success("Your account has been deleted")).await;
    Ok(Redirect::to("/login").into_response())
}
