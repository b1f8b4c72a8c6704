//! Sign-up, login, logout and session handling.

#![allow(clippy::unwrap_used)]

use std::num::NonZeroU32;

use coupix_core::Email;
use coupix_integration_tests::{PASSWORD, TestApp, location};
use coupix_web::backend::MemoryBackend;
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;

    let resp = app.get("/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    assert_eq!(app.get("/health/ready").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_page_redirects_with_return_target() {
    let app = TestApp::spawn().await;

    let resp = app.get("/?status=active").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login?redirect_to=%2F%3Fstatus%3Dactive");

    let resp = app.get("/").await;
    assert_eq!(location(&resp), "/login?redirect_to=%2F");
}

#[tokio::test]
async fn test_login_returns_to_requested_page() {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;
    app.post_form("/logout", &[]).await;

    let resp = app
        .post_form(
            "/login",
            &[
                ("email", "dana@example.com"),
                ("password", PASSWORD),
                ("redirect_to", "/?status=active"),
            ],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?status=active");

    let body = app.page("/?status=active").await;
    assert!(body.contains("Login successful"));
}

#[tokio::test]
async fn test_login_ignores_offsite_redirect() {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;
    app.post_form("/logout", &[]).await;

    let resp = app
        .post_form(
            "/login",
            &[
                ("email", "dana@example.com"),
                ("password", PASSWORD),
                ("redirect_to", "//evil.example/"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn test_signup_signs_in() {
    let app = TestApp::spawn().await;

    let resp = app.sign_up("Dana", "dana@example.com").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let body = app.page("/").await;
    assert!(body.contains("Account created successfully"));
    assert!(body.contains("Dana"));
}

#[tokio::test]
async fn test_signup_validation_errors() {
    let app = TestApp::spawn().await;

    let resp = app
        .post_form(
            "/signup",
            &[
                ("name", "D"),
                ("email", "not-an-email"),
                ("password", "abc"),
                ("password_confirm", "abd"),
            ],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Name must be at least 2 characters"));
    assert!(body.contains("Please enter a valid email address"));
    assert!(body.contains("Passwords do not match"));
}

#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;

    let other = TestApp {
        addr: app.addr,
        client: app.other_client(),
        backend: app.backend.clone(),
    };
    let resp = other.sign_up("Dana Again", "dana@example.com").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(
        resp.text()
            .await
            .unwrap()
            .contains("An account with this email already exists")
    );
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;
    app.post_form("/logout", &[]).await;

    let resp = app.log_in("dana@example.com", "wrong-password").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.text().await.unwrap().contains("Invalid email or password"));

    assert_eq!(app.get("/").await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;
    assert_eq!(app.get("/").await.status(), StatusCode::OK);

    let resp = app.post_form("/logout", &[]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");

    let body = app.page("/login").await;
    assert!(body.contains("Logged out successfully"));
    assert_eq!(app.get("/").await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_signed_in_user_skips_login_page() {
    let app = TestApp::spawn().await;
    app.sign_up("Dana", "dana@example.com").await;

    let resp = app.get("/login").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn test_email_confirmation_required() {
    let app = TestApp::spawn_with(
        MemoryBackend::new().with_email_confirmation(),
        NonZeroU32::new(1000).unwrap(),
    )
    .await;

    let resp = app.sign_up("Dana", "dana@example.com").await;
    assert_eq!(location(&resp), "/login");
    assert!(app.page("/login").await.contains("Check your email"));

    let resp = app.log_in("dana@example.com", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(
        resp.text()
            .await
            .unwrap()
            .contains("Please confirm your email address")
    );

    app.backend
        .confirm_email(&Email::parse("dana@example.com").unwrap());
    let resp = app.log_in("dana@example.com", PASSWORD).await;
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed() {
    let app = TestApp::spawn_with(
        MemoryBackend::new().with_token_ttl(chrono::Duration::zero()),
        NonZeroU32::new(1000).unwrap(),
    )
    .await;
    app.sign_up("Dana", "dana@example.com").await;

    // Every request sees an expired token and refreshes it.
    assert_eq!(app.get("/").await.status(), StatusCode::OK);
    assert_eq!(app.get("/profile").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_is_rate_limited() {
    let app = TestApp::spawn_with(MemoryBackend::new(), NonZeroU32::new(2).unwrap()).await;

    for _ in 0..2 {
        let resp = app.log_in("nobody@example.com", "wrong-password").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = app.log_in("nobody@example.com", "wrong-password").await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // Pages are not limited.
    assert_eq!(app.get("/login").await.status(), StatusCode::OK);
}
