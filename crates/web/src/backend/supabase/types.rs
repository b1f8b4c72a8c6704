//! Wire types for the auth, table and storage APIs.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use coupix_core::{Amount, Coupon, CouponDraft, CouponId, Email, Profile, StoreName, UserId};

use crate::backend::{AuthSession, AuthUser, BackendError};

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
pub struct SignUpMetadata<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PasswordUpdate<'a> {
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct UserMetadata {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
}

impl TryFrom<UserResponse> for AuthUser {
    type Error = BackendError;

    fn try_from(user: UserResponse) -> Result<Self, Self::Error> {
        let email = user
            .email
            .as_deref()
            .and_then(|raw| Email::parse(raw).ok())
            .ok_or_else(|| BackendError::Api {
                status: 200,
                code: None,
                message: "auth user has no usable email".to_string(),
            })?;
        Ok(Self {
            id: UserId::new(user.id),
            email,
            name: user.user_metadata.and_then(|m| m.name),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix timestamp, sent by newer auth servers.
    pub expires_at: Option<i64>,
    pub user: UserResponse,
}

impl SessionResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> Result<AuthSession, BackendError> {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| now + chrono::Duration::seconds(self.expires_in));
        Ok(AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.try_into()?,
        })
    }
}

/// Error body shared by the auth, table and storage APIs.
///
/// Each API names its fields differently, so everything is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    pub error_code: Option<String>,
    /// Table API error code (Postgres SQLSTATE or `PGRST...`).
    pub code: Option<serde_json::Value>,
    pub msg: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl ErrorBody {
    pub fn code(&self) -> Option<String> {
        self.error_code.clone().or_else(|| match &self.code {
            Some(serde_json::Value::String(code)) => Some(code.clone()),
            _ => None,
        })
    }

    pub fn message(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_default()
    }
}

// =============================================================================
// Tables
// =============================================================================

/// A row of the `coupons` table.
#[derive(Debug, Deserialize)]
pub struct CouponRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store: String,
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub coupon_code: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_redeemed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = BackendError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str, detail: String| BackendError::Api {
            status: 200,
            code: None,
            message: format!("coupon {} has invalid {field}: {detail}", row.id),
        };
        let store = StoreName::parse(&row.store).map_err(|e| invalid("store", e.to_string()))?;
        let amount = Amount::from_whole(row.amount.unwrap_or_default())
            .map_err(|e| invalid("amount", e.to_string()))?;
        let link = row
            .link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .and_then(|link| match Url::parse(link) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(coupon_id = %row.id, error = %e, "Dropping unparseable coupon link");
                    None
                }
            });

        Ok(Self {
            id: CouponId::new(row.id),
            user_id: UserId::new(row.user_id),
            store,
            amount,
            description: non_empty(row.description),
            link,
            image_url: non_empty(row.image_url),
            coupon_code: non_empty(row.coupon_code),
            expiry_date: row.expiry_date,
            is_redeemed: row.is_redeemed,
            created_at: row.created_at,
            updated_at: row.updated_at.unwrap_or(row.created_at),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Body for coupon inserts and updates.
#[derive(Debug, Serialize)]
pub struct CouponWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub store: &'a str,
    pub amount: i64,
    pub description: Option<&'a str>,
    pub link: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub coupon_code: Option<&'a str>,
    pub expiry_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl<'a> CouponWrite<'a> {
    pub fn insert(owner: UserId, draft: &'a CouponDraft) -> Self {
        Self {
            user_id: Some(owner),
            ..Self::fields(draft)
        }
    }

    pub fn update(draft: &'a CouponDraft, now: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(now),
            ..Self::fields(draft)
        }
    }

    fn fields(draft: &'a CouponDraft) -> Self {
        Self {
            user_id: None,
            store: draft.store.as_str(),
            amount: draft.amount.to_i64(),
            description: draft.description.as_deref(),
            link: draft.link.as_ref().map(Url::as_str),
            image_url: draft.image_url.as_deref(),
            coupon_code: draft.coupon_code.as_deref(),
            expiry_date: draft.expiry_date,
            updated_at: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RedeemWrite {
    pub is_redeemed: bool,
    pub updated_at: DateTime<Utc>,
}

/// A row of the `profiles` table.
#[derive(Debug, Deserialize)]
pub struct ProfileRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = BackendError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = row
            .email
            .as_deref()
            .and_then(|raw| Email::parse(raw).ok())
            .ok_or_else(|| BackendError::Api {
                status: 200,
                code: None,
                message: format!("profile {} has no usable email", row.id),
            })?;
        let name = non_empty(row.name).unwrap_or_else(|| email.local_part().to_string());
        Ok(Self {
            id: UserId::new(row.id),
            name,
            email,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileNameWrite<'a> {
    pub name: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_row_conversion() {
        let json = r#"{
            "id": "6f1c7b9e-3d2a-4c55-9a77-0c1d2e3f4a5b",
            "user_id": "0b8e2f4a-1c3d-4e5f-8a9b-7c6d5e4f3a2b",
            "store": "BUYME",
            "amount": 200,
            "description": "",
            "link": "https://buyme.co.il",
            "image_url": null,
            "coupon_code": "GIFT-42",
            "expiry_date": "2026-12-31",
            "is_redeemed": false,
            "created_at": "2026-02-01T09:30:00.123456+00:00",
            "updated_at": "2026-02-02T10:00:00+00:00"
        }"#;
        let row: CouponRow = serde_json::from_str(json).unwrap();
        let coupon = Coupon::try_from(row).unwrap();

        assert_eq!(coupon.store.as_str(), "BUYME");
        assert_eq!(coupon.amount.to_i64(), 200);
        assert_eq!(coupon.description, None);
        assert_eq!(coupon.link.unwrap().as_str(), "https://buyme.co.il/");
        assert_eq!(coupon.coupon_code.as_deref(), Some("GIFT-42"));
        assert_eq!(coupon.expiry_date, NaiveDate::from_ymd_opt(2026, 12, 31));
        assert!(coupon.updated_at > coupon.created_at);
    }

    #[test]
    fn test_coupon_row_bad_link_is_dropped() {
        let json = r#"{
            "id": "6f1c7b9e-3d2a-4c55-9a77-0c1d2e3f4a5b",
            "user_id": "0b8e2f4a-1c3d-4e5f-8a9b-7c6d5e4f3a2b",
            "store": "כללית",
            "amount": 30,
            "link": "not a url",
            "created_at": "2026-02-01T09:30:00Z"
        }"#;
        let row: CouponRow = serde_json::from_str(json).unwrap();
        let coupon = Coupon::try_from(row).unwrap();
        assert!(coupon.link.is_none());
        assert_eq!(coupon.updated_at, coupon.created_at);
    }

    #[test]
    fn test_coupon_write_shapes() {
        let draft = CouponDraft {
            store: StoreName::parse("BUYME").unwrap(),
            amount: Amount::from_whole(50).unwrap(),
            description: None,
            link: None,
            image_url: None,
            coupon_code: Some("X1".into()),
            expiry_date: None,
        };
        let owner = UserId::new(Uuid::nil());

        let insert = serde_json::to_value(CouponWrite::insert(owner, &draft)).unwrap();
        assert_eq!(insert["user_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(insert["amount"], 50);
        assert!(insert.get("updated_at").is_none());
        assert!(insert["description"].is_null());

        let update = serde_json::to_value(CouponWrite::update(&draft, Utc::now())).unwrap();
        assert!(update.get("user_id").is_none());
        assert!(update["updated_at"].is_string());
    }

    #[test]
    fn test_error_body_variants() {
        let auth: ErrorBody =
            serde_json::from_str(r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#)
                .unwrap();
        assert_eq!(auth.code().as_deref(), Some("invalid_credentials"));
        assert_eq!(auth.message(), "Invalid login credentials");

        let rest: ErrorBody = serde_json::from_str(
            r#"{"code":"42501","message":"new row violates row-level security policy","details":null,"hint":null}"#,
        )
        .unwrap();
        assert_eq!(rest.code().as_deref(), Some("42501"));
    }

    #[test]
    fn test_session_expiry_from_expires_in() {
        let json = r#"{
            "access_token": "a", "refresh_token": "r", "expires_in": 3600,
            "user": {"id": "0b8e2f4a-1c3d-4e5f-8a9b-7c6d5e4f3a2b", "email": "Noa@Example.com",
                     "user_metadata": {"name": "Noa"}}
        }"#;
        let response: SessionResponse = serde_json::from_str(json).unwrap();
        let now = Utc::now();
        let session = response.into_session(now).unwrap();
        assert_eq!(session.expires_at, now + chrono::Duration::seconds(3600));
        assert_eq!(session.user.email.as_str(), "noa@example.com");
        assert_eq!(session.user.name.as_deref(), Some("Noa"));
    }
}
