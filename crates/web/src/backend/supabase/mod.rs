//! Client for a hosted backend following Supabase conventions.
//!
//! Uses `reqwest` 0.13 against three REST surfaces:
//!
//! - `/auth/v1` (`GoTrue`) for sessions and passwords
//! - `/rest/v1` (`PostgREST`) for the `coupons` and `profiles` tables
//! - `/storage/v1` for coupon images
//!
//! Table and storage calls authenticate with the user's access token, so the
//! project's row-level policies decide what each user can read and write.

mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use coupix_core::{Coupon, CouponDraft, CouponId, Email, ImageUpload, NewProfile, Profile, UserId};

use crate::backend::{
    AccessToken, AuthApi, AuthSession, AuthUser, BackendError, SignUpOutcome, StorageApi,
    TableApi,
};
use crate::config::SupabaseConfig;

use types::{
    CouponRow, CouponWrite, ErrorBody, PasswordGrant, PasswordUpdate, ProfileNameWrite,
    ProfileRow, RedeemWrite, RefreshGrant, SessionResponse, SignUpMetadata, SignUpRequest,
    UserResponse,
};

const COUPONS: &str = "coupons";
const PROFILES: &str = "profiles";

/// Postgres `insufficient_privilege`, raised when a row policy blocks a write.
const PG_INSUFFICIENT_PRIVILEGE: &str = "42501";
/// Postgres `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";
/// `PostgREST` JWT errors (expired or invalid token).
const PGRST_JWT_EXPIRED: &str = "PGRST301";
const PGRST_JWT_INVALID: &str = "PGRST302";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// SupabaseBackend
// =============================================================================

/// Backend client for auth, tables and storage.
#[derive(Clone)]
pub struct SupabaseBackend {
    inner: Arc<SupabaseBackendInner>,
}

struct SupabaseBackendInner {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    bucket: String,
}

impl SupabaseBackend {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("coupix/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(SupabaseBackendInner {
                client,
                base: config.url.clone(),
                anon_key: config.anon_key.expose_secret().to_string(),
                bucket: config.storage_bucket.clone(),
            }),
        })
    }

    /// Build an endpoint URL below the project URL.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.inner.base.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    /// Table endpoint with `PostgREST` filters such as `("id", "eq.<uuid>")`.
    fn table(&self, table: &str, filters: &[(&str, String)]) -> Url {
        let mut url = self.endpoint(&format!("rest/v1/{table}"));
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// Start a request carrying the anon key and, when given, the user token.
    fn request(&self, method: Method, url: Url, token: Option<&AccessToken>) -> RequestBuilder {
        let bearer = token.map_or(self.inner.anon_key.as_str(), AccessToken::expose);
        self.inner
            .client
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        let error: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let code = error.code();
        let message = error.message();

        tracing::warn!(
            status = %status,
            code = code.as_deref().unwrap_or("-"),
            message = %message.chars().take(200).collect::<String>(),
            "Backend returned non-success status"
        );

        Err(match (status, code.as_deref()) {
            (_, Some(PG_INSUFFICIENT_PRIVILEGE)) => BackendError::PolicyViolation(message),
            (_, Some(PG_UNIQUE_VIOLATION)) | (StatusCode::CONFLICT, _) => {
                BackendError::Conflict(message)
            }
            (_, Some(PGRST_JWT_EXPIRED | PGRST_JWT_INVALID)) | (StatusCode::UNAUTHORIZED, None) => {
                BackendError::Unauthorized
            }
            (StatusCode::FORBIDDEN, None) => BackendError::PolicyViolation(message),
            (StatusCode::NOT_FOUND, None) => BackendError::NotFound,
            _ => BackendError::Api {
                status: status.as_u16(),
                code,
                message,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Send a table request that returns rows and convert the first one.
    async fn first_coupon(&self, request: RequestBuilder) -> Result<Option<Coupon>, BackendError> {
        let rows: Vec<CouponRow> = self.send_json(request).await?;
        rows.into_iter().next().map(Coupon::try_from).transpose()
    }

    fn coupon_filters(owner: UserId, id: CouponId) -> Vec<(&'static str, String)> {
        vec![("id", format!("eq.{id}")), ("user_id", format!("eq.{owner}"))]
    }

    fn public_url(&self, key: &str) -> String {
        self.endpoint(&format!(
            "storage/v1/object/public/{}/{key}",
            self.inner.bucket
        ))
        .to_string()
    }

    /// Object key behind a public URL from this bucket.
    fn object_key<'a>(&self, image_url: &'a str) -> Option<&'a str> {
        let prefix = self.public_url("");
        image_url
            .strip_prefix(prefix.as_str())
            .filter(|key| !key.is_empty())
    }
}

/// Timestamp in the form `PostgREST` compares against `timestamptz` columns.
fn filter_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// =============================================================================
// Auth
// =============================================================================

#[async_trait]
impl AuthApi for SupabaseBackend {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint("auth/v1/token");
        url.query_pairs_mut().append_pair("grant_type", "password");

        let request = self
            .request(Method::POST, url, None)
            .json(&PasswordGrant {
                email: email.as_str(),
                password,
            });
        let response: SessionResponse = self.send_json(request).await?;
        response.into_session(Utc::now())
    }

    #[instrument(skip(self, password, name), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let request = self
            .request(Method::POST, self.endpoint("auth/v1/signup"), None)
            .json(&SignUpRequest {
                email: email.as_str(),
                password,
                data: SignUpMetadata { name },
            });
        let body: serde_json::Value = self.send_json(request).await?;

        // With email confirmation enabled the response is a bare user.
        if body.get("access_token").is_some() {
            let response: SessionResponse = serde_json::from_value(body)?;
            Ok(SignUpOutcome::SignedIn(response.into_session(Utc::now())?))
        } else {
            let user: UserResponse = serde_json::from_value(body)?;
            Ok(SignUpOutcome::ConfirmationRequired(AuthUser::try_from(user)?))
        }
    }

    #[instrument(skip_all)]
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint("auth/v1/token");
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let request = self
            .request(Method::POST, url, None)
            .json(&RefreshGrant { refresh_token });
        let response: SessionResponse = self.send_json(request).await?;
        debug!("Session refreshed");
        response.into_session(Utc::now())
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, token: &AccessToken) -> Result<(), BackendError> {
        let request = self.request(Method::POST, self.endpoint("auth/v1/logout"), Some(token));
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip_all)]
    async fn update_password(
        &self,
        token: &AccessToken,
        new_password: &str,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::PUT, self.endpoint("auth/v1/user"), Some(token))
            .json(&PasswordUpdate {
                password: new_password,
            });
        self.send(request).await.map(|_| ())
    }

    async fn health(&self) -> Result<(), BackendError> {
        let request = self.request(Method::GET, self.endpoint("auth/v1/health"), None);
        self.send(request).await.map(|_| ())
    }
}

// =============================================================================
// Tables
// =============================================================================

#[async_trait]
impl TableApi for SupabaseBackend {
    #[instrument(skip(self, token), fields(user_id = %owner))]
    async fn list_coupons(
        &self,
        token: &AccessToken,
        owner: UserId,
    ) -> Result<Vec<Coupon>, BackendError> {
        let url = self.table(
            COUPONS,
            &[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{owner}")),
                ("order", "created_at.desc".to_string()),
            ],
        );
        let rows: Vec<CouponRow> = self
            .send_json(self.request(Method::GET, url, Some(token)))
            .await?;
        debug!(count = rows.len(), "Fetched coupons");
        rows.into_iter().map(Coupon::try_from).collect()
    }

    #[instrument(skip(self, token), fields(user_id = %owner, coupon_id = %id))]
    async fn get_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<Option<Coupon>, BackendError> {
        let url = self.table(COUPONS, &Self::coupon_filters(owner, id));
        self.first_coupon(self.request(Method::GET, url, Some(token)))
            .await
    }

    #[instrument(skip(self, token, draft), fields(user_id = %owner))]
    async fn insert_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        draft: &CouponDraft,
    ) -> Result<Coupon, BackendError> {
        let request = self
            .request(Method::POST, self.table(COUPONS, &[]), Some(token))
            .header("Prefer", "return=representation")
            .json(&[CouponWrite::insert(owner, draft)]);
        self.first_coupon(request).await?.ok_or_else(|| BackendError::Api {
            status: 201,
            code: None,
            message: "insert returned no row".to_string(),
        })
    }

    #[instrument(skip(self, token, draft), fields(user_id = %owner, coupon_id = %id))]
    async fn update_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
        draft: &CouponDraft,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Option<Coupon>, BackendError> {
        let mut filters = Self::coupon_filters(owner, id);
        filters.push(("updated_at", format!("eq.{}", filter_timestamp(expected_updated_at))));

        let request = self
            .request(Method::PATCH, self.table(COUPONS, &filters), Some(token))
            .header("Prefer", "return=representation")
            .json(&CouponWrite::update(draft, Utc::now()));
        self.first_coupon(request).await
    }

    #[instrument(skip(self, token), fields(user_id = %owner, coupon_id = %id))]
    async fn redeem_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<Option<Coupon>, BackendError> {
        let mut filters = Self::coupon_filters(owner, id);
        filters.push(("is_redeemed", "eq.false".to_string()));

        let request = self
            .request(Method::PATCH, self.table(COUPONS, &filters), Some(token))
            .header("Prefer", "return=representation")
            .json(&RedeemWrite {
                is_redeemed: true,
                updated_at: Utc::now(),
            });
        self.first_coupon(request).await
    }

    #[instrument(skip(self, token), fields(user_id = %owner, coupon_id = %id))]
    async fn delete_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<bool, BackendError> {
        let request = self
            .request(
                Method::DELETE,
                self.table(COUPONS, &Self::coupon_filters(owner, id)),
                Some(token),
            )
            .header("Prefer", "return=representation");
        let rows: Vec<CouponRow> = self.send_json(request).await?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self, token), fields(user_id = %owner))]
    async fn delete_all_coupons(
        &self,
        token: &AccessToken,
        owner: UserId,
    ) -> Result<(), BackendError> {
        let url = self.table(COUPONS, &[("user_id", format!("eq.{owner}"))]);
        self.send(self.request(Method::DELETE, url, Some(token)))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, token, profile), fields(user_id = %profile.id))]
    async fn insert_profile_if_absent(
        &self,
        token: &AccessToken,
        profile: &NewProfile,
    ) -> Result<(), BackendError> {
        let url = self.table(PROFILES, &[("on_conflict", "id".to_string())]);
        let request = self
            .request(Method::POST, url, Some(token))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&[profile]);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip(self, token), fields(user_id = %id))]
    async fn get_profile(
        &self,
        token: &AccessToken,
        id: UserId,
    ) -> Result<Option<Profile>, BackendError> {
        let url = self.table(PROFILES, &[("id", format!("eq.{id}"))]);
        let rows: Vec<ProfileRow> = self
            .send_json(self.request(Method::GET, url, Some(token)))
            .await?;
        rows.into_iter().next().map(Profile::try_from).transpose()
    }

    #[instrument(skip(self, token, name), fields(user_id = %id))]
    async fn update_profile_name(
        &self,
        token: &AccessToken,
        id: UserId,
        name: &str,
    ) -> Result<Option<Profile>, BackendError> {
        let url = self.table(PROFILES, &[("id", format!("eq.{id}"))]);
        let request = self
            .request(Method::PATCH, url, Some(token))
            .header("Prefer", "return=representation")
            .json(&ProfileNameWrite { name });
        let rows: Vec<ProfileRow> = self.send_json(request).await?;
        rows.into_iter().next().map(Profile::try_from).transpose()
    }

    #[instrument(skip(self, token), fields(user_id = %id))]
    async fn delete_profile(&self, token: &AccessToken, id: UserId) -> Result<(), BackendError> {
        let url = self.table(PROFILES, &[("id", format!("eq.{id}"))]);
        self.send(self.request(Method::DELETE, url, Some(token)))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Storage
// =============================================================================

#[async_trait]
impl StorageApi for SupabaseBackend {
    #[instrument(skip(self, token, image), fields(key = %key, size = image.len()))]
    async fn upload_image(
        &self,
        token: &AccessToken,
        key: &str,
        image: &ImageUpload,
    ) -> Result<String, BackendError> {
        let url = self.endpoint(&format!("storage/v1/object/{}/{key}", self.inner.bucket));
        let request = self
            .request(Method::POST, url, Some(token))
            .header("Content-Type", image.content_type())
            .header("x-upsert", "false")
            .body(image.bytes().to_vec());

        match self.send(request).await {
            Ok(_) => Ok(self.public_url(key)),
            Err(BackendError::Api { message, .. } | BackendError::PolicyViolation(message)) => {
                Err(BackendError::Storage(message))
            }
            Err(other) => Err(other),
        }
    }

    #[instrument(skip(self, token))]
    async fn delete_image(&self, token: &AccessToken, image_url: &str) -> Result<(), BackendError> {
        let Some(key) = self.object_key(image_url) else {
            debug!("Image URL is outside the bucket, nothing to delete");
            return Ok(());
        };
        let url = self.endpoint(&format!("storage/v1/object/{}/{key}", self.inner.bucket));

        match self.send(self.request(Method::DELETE, url, Some(token))).await {
            Ok(_) | Err(BackendError::NotFound) => Ok(()),
            Err(BackendError::Api { message, .. } | BackendError::PolicyViolation(message)) => {
                Err(BackendError::Storage(message))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::DEFAULT_STORAGE_BUCKET;

    fn backend(url: &str) -> SupabaseBackend {
        SupabaseBackend::new(&SupabaseConfig {
            url: Url::parse(url).unwrap(),
            anon_key: SecretString::from("anon"),
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = backend("https://abc.supabase.co");
        assert_eq!(
            client.endpoint("auth/v1/token").as_str(),
            "https://abc.supabase.co/auth/v1/token"
        );

        let proxied = backend("https://example.org/baas/");
        assert_eq!(
            proxied.endpoint("/rest/v1/coupons").as_str(),
            "https://example.org/baas/rest/v1/coupons"
        );
    }

    #[test]
    fn test_table_filters_are_encoded() {
        let client = backend("https://abc.supabase.co");
        let ts = DateTime::parse_from_rfc3339("2026-02-01T09:30:00.123456+00:00")
            .unwrap()
            .with_timezone(&Utc);
        let url = client.table(COUPONS, &[("updated_at", format!("eq.{}", filter_timestamp(ts)))]);
        assert_eq!(
            url.query(),
            Some("updated_at=eq.2026-02-01T09%3A30%3A00.123456Z")
        );
    }

    #[test]
    fn test_public_url() {
        let client = backend("https://abc.supabase.co");
        assert_eq!(
            client.public_url("u/i.png"),
            "https://abc.supabase.co/storage/v1/object/public/coupon-images/u/i.png"
        );
    }

    #[test]
    fn test_object_key_from_public_url() {
        let client = backend("https://abc.supabase.co");
        let url = client.public_url("u/i.png");
        assert_eq!(client.object_key(&url), Some("u/i.png"));
        assert_eq!(client.object_key("https://cdn.example.com/i.png"), None);
        assert_eq!(client.object_key(&client.public_url("")), None);
    }
}
