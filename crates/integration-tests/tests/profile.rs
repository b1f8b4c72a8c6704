//! Profile, password and account deletion.

#![allow(clippy::unwrap_used)]

use coupix_integration_tests::{PASSWORD, TestApp, coupon_ids, location};
use reqwest::StatusCode;

async fn signed_in() -> TestApp {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;
    app
}

#[tokio::test]
async fn test_profile_shows_user() {
    let app = signed_in().await;

    let body = app.page("/profile").await;
    assert!(body.contains("dana@example.com"));
    assert!(body.contains("value=\"Dana\""));
}

#[tokio::test]
async fn test_update_name() {
    let app = signed_in().await;

    let resp = app.post_form("/profile", &[("name", "Dana Cohen")]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/profile");

    let body = app.page("/profile").await;
    assert!(body.contains("Profile updated successfully"));
    assert!(body.contains("Dana Cohen"));

    let resp = app.post_form("/profile", &[("name", " ")]).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_change_password() {
    let app = signed_in().await;

    let resp = app
        .post_form(
            "/profile/password",
            &[
                ("current_password", "not-my-password"),
                ("new_password", "brand-new-pass"),
                ("confirm_password", "brand-new-pass"),
            ],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.text().await.unwrap().contains("Current password is incorrect"));

    let resp = app
        .post_form(
            "/profile/password",
            &[
                ("current_password", PASSWORD),
                ("new_password", "brand-new-pass"),
                ("confirm_password", "brand-new-pass"),
            ],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(app.page("/profile").await.contains("Password updated successfully"));

    app.post_form("/logout", &[]).await;
    let resp = app.log_in("dana@example.com", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = app.log_in("dana@example.com", "brand-new-pass").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_delete_account() {
    let app = signed_in().await;
    app.create_coupon("Shufersal", "100").await;
    assert_eq!(app.backend.coupon_count(), 1);

    assert_eq!(app.get("/profile/delete").await.status(), StatusCode::OK);

    let resp = app.post_form("/profile/delete", &[]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    assert_eq!(app.backend.coupon_count(), 0);
    assert_eq!(app.get("/").await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_partial_account_deletion_drops_cached_coupons() {
    let app = signed_in().await;
    app.create_coupon("Shufersal", "100").await;
    assert_eq!(coupon_ids(&app.page("/").await).len(), 1);

    app.backend.fail_profile_delete(true);
    let resp = app.post_form("/profile/delete", &[]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/profile");
    assert_eq!(app.backend.coupon_count(), 0);

    let body = app.page("/").await;
    assert!(body.contains("Failed to delete account"));
    assert!(coupon_ids(&body).is_empty());

    app.backend.fail_profile_delete(false);
    let resp = app.post_form("/profile/delete", &[]).await;
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn test_theme_toggle() {
    let app = signed_in().await;
    assert!(app.page("/").await.contains("data-theme=\"light\""));

    let resp = app.post_form("/theme", &[("back", "/profile")]).await;
    assert_eq!(location(&resp), "/profile");
    assert!(app.page("/").await.contains("data-theme=\"dark\""));

    let resp = app.post_form("/theme", &[("back", "https://evil.example/")]).await;
    assert_eq!(location(&resp), "/");
    assert!(app.page("/").await.contains("data-theme=\"light\""));
}

#[tokio::test]
async fn test_security_headers() {
    let app = TestApp::spawn().await;
    let resp = app.get("/login").await;

    let headers = resp.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("x-request-id"));
}
