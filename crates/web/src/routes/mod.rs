//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! GET  /login                  - Login page
//! POST /login                  - Login action (rate limited)
//! GET  /signup                 - Sign-up page
//! POST /signup                 - Sign-up action (rate limited)
//! POST /logout                 - Logout action
//!
//! # Coupons (requires auth)
//! GET  /                       - Coupon list with search, filter and sort
//! GET  /create                 - New coupon form
//! POST /create                 - Create coupon (multipart)
//! GET  /edit/{id}              - Edit coupon form
//! POST /edit/{id}              - Update coupon (multipart)
//! GET  /coupons/{id}           - Coupon detail
//! GET  /coupons/{id}/redeem    - Confirm redemption
//! POST /coupons/{id}/redeem    - Mark as redeemed
//! GET  /coupons/{id}/delete    - Confirm deletion
//! POST /coupons/{id}/delete    - Delete coupon
//!
//! # Profile (requires auth)
//! GET  /profile                - Profile page
//! POST /profile                - Update display name
//! POST /profile/password       - Change password
//! GET  /profile/delete         - Confirm account deletion
//! POST /profile/delete         - Delete account data
//!
//! # Misc
//! POST /theme                  - Toggle light/dark theme
//! ```

pub mod auth;
pub mod coupons;
pub mod profile;
pub mod theme;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::config::RateLimitConfig;
use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Request body limit for coupon forms: a 2 MiB image plus the other fields.
const COUPON_FORM_BODY_LIMIT: usize = 3 * 1024 * 1024;

/// Create the auth routes router.
///
/// Credential submissions get their own per-IP rate limit.
pub fn auth_routes(rate_limit: &RateLimitConfig) -> Router<AppState> {
    let limited = Router::new()
        .route("/login", post(auth::login))
        .route("/signup", post(auth::signup))
        .layer(auth_rate_limiter(rate_limit));

    Router::new()
        .route("/login", get(auth::login_page))
        .route("/signup", get(auth::signup_page))
        .route("/logout", post(auth::logout))
        .merge(limited)
}

/// Create the coupon routes router.
pub fn coupon_routes() -> Router<AppState> {
    let forms = Router::new()
        .route("/create", get(coupons::new_form).post(coupons::create))
        .route("/edit/{id}", get(coupons::edit_form).post(coupons::update))
        .layer(DefaultBodyLimit::max(COUPON_FORM_BODY_LIMIT));

    Router::new()
        .route("/", get(coupons::list))
        .route("/coupons/{id}", get(coupons::show))
        .route(
            "/coupons/{id}/redeem",
            get(coupons::confirm_redeem).post(coupons::redeem),
        )
        .route(
            "/coupons/{id}/delete",
            get(coupons::confirm_delete).post(coupons::delete),
        )
        .merge(forms)
}

/// Create the profile routes router.
pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile::show).post(profile::update_name))
        .route("/profile/password", post(profile::change_password))
        .route(
            "/profile/delete",
            get(profile::confirm_delete).post(profile::delete_account),
        )
}

/// Create all page routes.
pub fn routes(rate_limit: &RateLimitConfig) -> Router<AppState> {
    Router::new()
        .merge(coupon_routes())
        .merge(auth_routes(rate_limit))
        .merge(profile_routes())
        .route("/theme", post(theme::toggle))
}
