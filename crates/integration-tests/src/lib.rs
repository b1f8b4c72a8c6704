//! Integration test harness for Coupix.
//!
//! Each test spawns the full router on an ephemeral port, backed by the
//! in-memory backend, and drives it over HTTP with a cookie-keeping client
//! that does not follow redirects.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p coupix-integration-tests
//! ```

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::Arc;

use coupix_core::{AMOUNT_PRESETS, OTHER_CHOICE, STORE_PRESETS};
use coupix_web::backend::MemoryBackend;
use coupix_web::config::{CoupixConfig, RateLimitConfig};
use coupix_web::state::AppState;
use reqwest::{Client, Response, multipart};

/// Password used by every test account.
pub const PASSWORD: &str = "correct-horse-9";

/// A running app and a client with its own cookie jar.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub backend: Arc<MemoryBackend>,
}

impl TestApp {
    /// Spawn with a fresh backend and a rate limit tests will not hit.
    pub async fn spawn() -> Self {
        Self::spawn_with(MemoryBackend::new(), NonZeroU32::new(1000).expect("non-zero")).await
    }

    /// Spawn with the given backend and login/sign-up burst size.
    pub async fn spawn_with(backend: MemoryBackend, burst: NonZeroU32) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");

        let mut config = CoupixConfig::memory(format!("http://{addr}"));
        config.rate_limit = RateLimitConfig {
            per_second: NonZeroU64::new(60).expect("non-zero"),
            burst,
        };

        let backend = Arc::new(backend);
        let state = AppState::with_backend(config, backend.clone());
        let app = coupix_web::app(state);

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Test server failed");
        });

        Self {
            addr,
            client: new_client(),
            backend,
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// A second browser against the same server.
    #[must_use]
    pub fn other_client(&self) -> Client {
        new_client()
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Response {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("POST failed")
    }

    pub async fn post_multipart(&self, path: &str, form: multipart::Form) -> Response {
        self.client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .expect("multipart POST failed")
    }

    /// Create an account and stay signed in.
    pub async fn sign_up(&self, name: &str, email: &str) -> Response {
        self.post_form(
            "/signup",
            &[
                ("name", name),
                ("email", email),
                ("password", PASSWORD),
                ("password_confirm", PASSWORD),
            ],
        )
        .await
    }

    pub async fn log_in(&self, email: &str, password: &str) -> Response {
        self.post_form("/login", &[("email", email), ("password", password)])
            .await
    }

    /// Body of `GET path`.
    pub async fn page(&self, path: &str) -> String {
        self.get(path).await.text().await.expect("Failed to read body")
    }

    /// Create a coupon from preset store and amount.
    pub async fn create_coupon(&self, store: &str, amount: &str) -> Response {
        self.post_multipart("/create", coupon_form(store, amount)).await
    }
}

fn new_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// Multipart body for a coupon.
///
/// Values outside the presets go through the "Other" inputs; passing
/// [`OTHER_CHOICE`] itself leaves the custom input blank.
#[must_use]
pub fn coupon_form(store: &str, amount: &str) -> multipart::Form {
    let (store_choice, store_custom) = choice(STORE_PRESETS.contains(&store), store);
    let is_preset_amount = AMOUNT_PRESETS.iter().any(|preset| preset.to_string() == amount);
    let (amount_choice, amount_custom) = choice(is_preset_amount, amount);

    multipart::Form::new()
        .text("store_choice", store_choice)
        .text("store_custom", store_custom)
        .text("amount_choice", amount_choice)
        .text("amount_custom", amount_custom)
        .text("description", "")
        .text("link", "")
        .text("coupon_code", "")
        .text("expiry_date", "")
}

fn choice(is_preset: bool, value: &str) -> (String, String) {
    if is_preset || value == OTHER_CHOICE {
        (value.to_string(), String::new())
    } else {
        (OTHER_CHOICE.to_string(), value.to_string())
    }
}

/// A PNG-typed image part of `size` bytes.
#[must_use]
pub fn image_part(size: usize) -> multipart::Part {
    multipart::Part::bytes(vec![0u8; size])
        .file_name("coupon.png")
        .mime_str("image/png")
        .expect("valid mime type")
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Ids of coupons linked from a list page, in display order.
#[must_use]
pub fn coupon_ids(html: &str) -> Vec<String> {
    html.match_indices("href=\"/coupons/")
        .filter_map(|(start, marker)| html.get(start + marker.len()..start + marker.len() + 36))
        .filter(|id| uuid::Uuid::parse_str(id).is_ok())
        .fold(Vec::new(), |mut ids, id| {
            if !ids.iter().any(|seen: &String| seen == id) {
                ids.push(id.to_string());
            }
            ids
        })
}

/// Value of the hidden `updated_at` input on an edit form.
#[must_use]
pub fn version_stamp(html: &str) -> Option<String> {
    let marker = "name=\"updated_at\" value=\"";
    let start = html.find(marker)? + marker.len();
    let end = html.get(start..)?.find('"')? + start;
    html.get(start..end).map(ToString::to_string)
}
