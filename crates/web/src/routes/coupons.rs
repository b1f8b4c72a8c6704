//! Coupon route handlers.
//!
//! List, create, edit, view, redeem and delete. The create and edit forms are
//! multipart so they can carry an optional image.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use tower_sessions::Session;

use coupix_core::{
    AMOUNT_PRESETS, Coupon, CouponFormInput, CouponId, CouponStatus, FormErrors, ImageUpload,
    ListQuery, OTHER_CHOICE, STORE_PRESETS, StatusFilter,
};

use crate::backend::BackendError;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{PageContext, RequireAuth, is_local_path};
use crate::models::{Flash, push_flash};
use crate::services::{CouponError, ImageChange};
use crate::state::AppState;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Errors that mean the backend no longer accepts the user's token.
const fn is_session_error(err: &CouponError) -> bool {
    matches!(err, CouponError::Backend(BackendError::Unauthorized))
}

// =============================================================================
// View Models
// =============================================================================

/// One coupon as shown in the list and detail views.
#[derive(Debug, Clone)]
pub struct CouponCard {
    pub coupon: Coupon,
    pub status: CouponStatus,
}

impl CouponCard {
    fn new(coupon: Coupon, today: NaiveDate) -> Self {
        let status = coupon.status(today);
        Self { coupon, status }
    }

    #[must_use]
    pub const fn is_redeemed(&self) -> bool {
        matches!(self.status, CouponStatus::Redeemed)
    }

    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self.status, CouponStatus::Expired)
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    #[must_use]
    pub fn expiry_label(&self) -> String {
        self.coupon
            .expiry_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default()
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Coupon list template.
#[derive(Template, WebTemplate)]
#[template(path = "coupons/list.html")]
pub struct ListTemplate {
    pub page: PageContext,
    pub query: ListQuery,
    pub cards: Vec<CouponCard>,
    /// Number of coupons before filtering.
    pub total: usize,
}

impl ListTemplate {
    fn status_selected(&self, value: &str) -> bool {
        self.query.status.as_str() == value
    }

    fn sort_selected(&self, value: &str) -> bool {
        self.query.sort.as_str() == value
    }

    fn order_selected(&self, value: &str) -> bool {
        self.query.order.as_str() == value
    }

    /// Current view, carried by delete requests.
    fn view(&self) -> &'static str {
        self.query.status.as_str()
    }
}

/// Create and edit form template.
#[derive(Template, WebTemplate)]
#[template(path = "coupons/form.html")]
pub struct FormTemplate {
    pub page: PageContext,
    pub action: String,
    pub heading: &'static str,
    pub submit_label: &'static str,
    pub input: CouponFormInput,
    pub errors: FormErrors,
    /// Inline message for a failed remote call.
    pub error: Option<String>,
    /// The stored coupon when editing.
    pub existing: Option<Coupon>,
    pub updated_at: String,
    pub min_date: String,
    pub store_presets: &'static [&'static str],
    pub amount_presets: Vec<String>,
    pub other: &'static str,
}

impl FormTemplate {
    fn new(page: PageContext, input: CouponFormInput, existing: Option<Coupon>) -> Self {
        let (action, heading, submit_label) = existing.as_ref().map_or_else(
            || ("/create".to_string(), "Add Coupon", "Create Coupon"),
            |coupon| (format!("/edit/{}", coupon.id), "Edit Coupon", "Update Coupon"),
        );
        let updated_at = existing
            .as_ref()
            .map(|c| format_version(c.updated_at))
            .unwrap_or_default();

        Self {
            page,
            action,
            heading,
            submit_label,
            input,
            errors: FormErrors::new(),
            error: None,
            existing,
            updated_at,
            min_date: today().format("%Y-%m-%d").to_string(),
            store_presets: &STORE_PRESETS,
            amount_presets: AMOUNT_PRESETS.iter().map(ToString::to_string).collect(),
            other: OTHER_CHOICE,
        }
    }

    fn store_selected(&self, value: &str) -> bool {
        self.input.store_choice == value
    }

    fn amount_selected(&self, value: &str) -> bool {
        self.input.amount_choice == value
    }

    fn current_image(&self) -> Option<&str> {
        self.existing.as_ref().and_then(|c| c.image_url.as_deref())
    }
}

/// Coupon detail ("use") template.
#[derive(Template, WebTemplate)]
#[template(path = "coupons/show.html")]
pub struct ShowTemplate {
    pub page: PageContext,
    pub card: CouponCard,
}

/// Confirmation step for redeem and delete.
#[derive(Template, WebTemplate)]
#[template(path = "coupons/confirm.html")]
pub struct ConfirmTemplate {
    pub page: PageContext,
    pub title: &'static str,
    pub message: String,
    pub action: String,
    pub confirm_label: &'static str,
    pub danger: bool,
    pub view: String,
    pub back: String,
}

/// Version stamp carried by the edit form.
fn format_version(updated_at: DateTime<Utc>) -> String {
    updated_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_version(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// =============================================================================
// Multipart Form
// =============================================================================

/// A submitted create or edit form.
#[derive(Debug, Default)]
struct CouponSubmission {
    input: CouponFormInput,
    updated_at: String,
    remove_image: bool,
    image: Option<(String, Vec<u8>)>,
}

impl CouponSubmission {
    async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut submission = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(ToString::to_string) else {
                continue;
            };

            if name == "image" {
                // An untouched file input still sends an empty part.
                let has_file = field.file_name().is_some_and(|f| !f.is_empty());
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if has_file || !bytes.is_empty() {
                    submission.image = Some((content_type, bytes.to_vec()));
                }
                continue;
            }

            let value = field.text().await?;
            let input = &mut submission.input;
            match name.as_str() {
                "store_choice" => input.store_choice = value,
                "store_custom" => input.store_custom = value,
                "amount_choice" => input.amount_choice = value,
                "amount_custom" => input.amount_custom = value,
                "description" => input.description = value,
                "link" => input.link = value,
                "coupon_code" => input.coupon_code = value,
                "expiry_date" => input.expiry_date = value,
                "updated_at" => submission.updated_at = value,
                "remove_image" => submission.remove_image = !value.is_empty(),
                _ => {}
            }
        }

        Ok(submission)
    }

    /// Validate the attached image, recording a field error on failure.
    fn take_image(&mut self, errors: &mut FormErrors) -> Option<ImageUpload> {
        let (content_type, bytes) = self.image.take()?;
        match ImageUpload::validate(&content_type, bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                errors.push("image", CouponError::Image(e).user_message());
                None
            }
        }
    }
}

// =============================================================================
// List
// =============================================================================

/// Display the user's coupons with search, status filter and sorting.
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    page: PageContext,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let coupons = state.coupons().list(&auth).await?;
    let today = today();
    let cards = query
        .apply(coupons.iter(), today)
        .into_iter()
        .map(|coupon| CouponCard::new(coupon.clone(), today))
        .collect();

    Ok(ListTemplate {
        page,
        query,
        cards,
        total: coupons.len(),
    }
    .into_response())
}

// =============================================================================
// Create
// =============================================================================

/// Display an empty coupon form.
pub async fn new_form(RequireAuth(_auth): RequireAuth, page: PageContext) -> Response {
    FormTemplate::new(page, CouponFormInput::default(), None).into_response()
}

/// Handle the create form.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    mut page: PageContext,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut submission = match CouponSubmission::read(multipart).await {
        Ok(submission) => submission,
        Err(e) => return Ok(e.into_response()),
    };

    let draft = submission.input.validate(today(), None);
    let mut errors = draft.as_ref().err().cloned().unwrap_or_default();
    let image = submission.take_image(&mut errors);

    let draft = match draft {
        Ok(draft) if errors.is_empty() => draft,
        _ => {
            let mut form = FormTemplate::new(page, submission.input, None);
            form.errors = errors;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, form).into_response());
        }
    };

    match state.coupons().create(&auth, draft, image).await {
        Ok(_) => {
            push_flash(&session, Flash::success("Coupon created successfully")).await;
            Ok(Redirect::to("/").into_response())
        }
        Err(e) if is_session_error(&e) => Err(e.into()),
        Err(e) => {
            let message = e.user_message();
            page.flashes.push(Flash::error(message));
            let mut form = FormTemplate::new(page, submission.input, None);
            form.error = Some(message.to_string());
            Ok((StatusCode::BAD_GATEWAY, form).into_response())
        }
    }
}

// =============================================================================
// Edit
// =============================================================================

/// Display the edit form for a coupon.
pub async fn edit_form(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    page: PageContext,
    Path(id): Path<CouponId>,
) -> Result<Response, AppError> {
    match state.coupons().get(&auth, id).await {
        Ok(coupon) => {
            let input = CouponFormInput::from_coupon(&coupon);
            Ok(FormTemplate::new(page, input, Some(coupon)).into_response())
        }
        Err(CouponError::NotFound) => not_found_redirect(&session).await,
        Err(e) => Err(e.into()),
    }
}

/// Handle the edit form.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    mut page: PageContext,
    Path(id): Path<CouponId>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut submission = match CouponSubmission::read(multipart).await {
        Ok(submission) => submission,
        Err(e) => return Ok(e.into_response()),
    };

    let existing = match state.coupons().get(&auth, id).await {
        Ok(coupon) => coupon,
        Err(CouponError::NotFound) => return not_found_redirect(&session).await,
        Err(e) => return Err(e.into()),
    };
    // A missing or malformed version stamp counts as stale.
    let Some(expected) = parse_version(&submission.updated_at) else {
        tracing::warn!(coupon_id = %id, "Edit submitted without a valid version stamp");
        let message = CouponError::Conflict.user_message();
        page.flashes.push(Flash::error(message));
        let mut form = FormTemplate::new(page, submission.input, Some(existing));
        form.error = Some(message.to_string());
        return Ok((StatusCode::CONFLICT, form).into_response());
    };

    let draft = submission.input.validate(today(), Some(&existing));
    let mut errors = draft.as_ref().err().cloned().unwrap_or_default();
    let image = submission.take_image(&mut errors);

    let draft = match draft {
        Ok(draft) if errors.is_empty() => draft,
        _ => {
            let mut form = FormTemplate::new(page, submission.input, Some(existing));
            form.updated_at = format_version(expected);
            form.errors = errors;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, form).into_response());
        }
    };

    let change = match image {
        Some(image) => ImageChange::Replace(image),
        None if submission.remove_image => ImageChange::Remove,
        None => ImageChange::Keep,
    };

    match state
        .coupons()
        .update(&auth, &existing, expected, draft, change)
        .await
    {
        Ok(_) => {
            push_flash(&session, Flash::success("Coupon updated successfully")).await;
            Ok(Redirect::to("/").into_response())
        }
        Err(CouponError::NotFound) => not_found_redirect(&session).await,
        Err(e) if is_session_error(&e) => Err(e.into()),
        Err(e) => {
            let message = e.user_message();
            page.flashes.push(Flash::error(message));
            // After a conflict, show the stored version so a resubmit applies
            // on top of it.
            let current = match e {
                CouponError::Conflict => state.coupons().get(&auth, id).await.unwrap_or(existing),
                _ => existing,
            };
            let status = if matches!(e, CouponError::Conflict) {
                StatusCode::CONFLICT
            } else {
                StatusCode::BAD_GATEWAY
            };
            let mut form = FormTemplate::new(page, submission.input, Some(current));
            form.error = Some(message.to_string());
            Ok((status, form).into_response())
        }
    }
}

async fn not_found_redirect(session: &Session) -> Result<Response, AppError> {
    push_flash(session, Flash::error(CouponError::NotFound.user_message())).await;
    Ok(Redirect::to("/").into_response())
}

// =============================================================================
// Show
// =============================================================================

/// Display a coupon with its image, code and link.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    page: PageContext,
    Path(id): Path<CouponId>,
) -> Result<Response, AppError> {
    match state.coupons().get(&auth, id).await {
        Ok(coupon) => Ok(ShowTemplate {
            page,
            card: CouponCard::new(coupon, today()),
        }
        .into_response()),
        Err(CouponError::NotFound) => not_found_redirect(&session).await,
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Redeem & Delete
// =============================================================================

/// Where to go after a redeem or delete, and which view issued it.
#[derive(Debug, Default, Deserialize)]
pub struct ActionForm {
    #[serde(default)]
    pub view: StatusFilter,
    #[serde(default)]
    pub back: String,
}

impl ActionForm {
    fn back(&self) -> String {
        if is_local_path(&self.back) {
            self.back.clone()
        } else if self.view == StatusFilter::All {
            "/".to_string()
        } else {
            format!("/?status={}", self.view)
        }
    }
}

/// Ask for confirmation before redeeming.
pub async fn confirm_redeem(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    page: PageContext,
    Path(id): Path<CouponId>,
    Query(action): Query<ActionForm>,
) -> Result<Response, AppError> {
    let coupon = match state.coupons().get(&auth, id).await {
        Ok(coupon) => coupon,
        Err(CouponError::NotFound) => return not_found_redirect(&session).await,
        Err(e) => return Err(e.into()),
    };

    Ok(ConfirmTemplate {
        page,
        title: "Mark as redeemed?",
        message: format!(
            "{} {} will move to your inactive coupons. This cannot be undone.",
            coupon.store,
            coupon.amount.display()
        ),
        action: format!("/coupons/{id}/redeem"),
        confirm_label: "Mark as redeemed",
        danger: false,
        view: action.view.to_string(),
        back: action.back(),
    }
    .into_response())
}

/// Mark a coupon as redeemed.
pub async fn redeem(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    Path(id): Path<CouponId>,
    Form(action): Form<ActionForm>,
) -> Result<Response, AppError> {
    match state.coupons().redeem(&auth, id).await {
        Ok(_) => push_flash(&session, Flash::success("Coupon marked as redeemed")).await,
        Err(e) if is_session_error(&e) => return Err(e.into()),
        Err(e) => push_flash(&session, Flash::error(e.user_message())).await,
    }
    Ok(Redirect::to(&action.back()).into_response())
}

/// Ask for confirmation before deleting.
pub async fn confirm_delete(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    page: PageContext,
    Path(id): Path<CouponId>,
    Query(action): Query<ActionForm>,
) -> Result<Response, AppError> {
    let coupon = match state.coupons().get(&auth, id).await {
        Ok(coupon) => coupon,
        Err(CouponError::NotFound) => return not_found_redirect(&session).await,
        Err(e) => return Err(e.into()),
    };

    Ok(ConfirmTemplate {
        page,
        title: "Delete coupon?",
        message: format!(
            "{} {} will be permanently deleted.",
            coupon.store,
            coupon.amount.display()
        ),
        action: format!("/coupons/{id}/delete"),
        confirm_label: "Delete",
        danger: true,
        view: action.view.to_string(),
        back: action.back(),
    }
    .into_response())
}

/// Delete a coupon.
///
/// The form carries the view it was issued from; a delete from the active
/// view is refused once the coupon is no longer active.
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    session: Session,
    Path(id): Path<CouponId>,
    Form(action): Form<ActionForm>,
) -> Result<Response, AppError> {
    match state.coupons().delete(&auth, id, action.view, today()).await {
        Ok(()) => push_flash(&session, Flash::success("Coupon deleted successfully")).await,
        Err(e) if is_session_error(&e) => return Err(e.into()),
        Err(e) => push_flash(&session, Flash::error(e.user_message())).await,
    }
    Ok(Redirect::to(&action.back()).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_version_round_trip() {
        let now = Utc::now();
        assert_eq!(parse_version(&format_version(now)), Some(now));
        assert_eq!(parse_version("not a timestamp"), None);
    }

    #[test]
    fn test_action_back() {
        let action = ActionForm {
            view: StatusFilter::Active,
            back: String::new(),
        };
        assert_eq!(action.back(), "/?status=active");

        let action = ActionForm {
            view: StatusFilter::All,
            back: "//evil.example".to_string(),
        };
        assert_eq!(action.back(), "/");

        let action = ActionForm {
            view: StatusFilter::Inactive,
            back: "/?status=inactive&q=buy".to_string(),
        };
        assert_eq!(action.back(), "/?status=inactive&q=buy");
    }
}
