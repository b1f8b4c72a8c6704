//! Coupon and profile records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{Amount, CouponId, CouponStatus, Email, StoreName, UserId};

/// A stored coupon as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub user_id: UserId,
    pub store: StoreName,
    pub amount: Amount,
    pub description: Option<String>,
    pub link: Option<Url>,
    /// Public URL of the uploaded image.
    pub image_url: Option<String>,
    pub coupon_code: Option<String>,
    /// Last day the coupon can be used.
    pub expiry_date: Option<NaiveDate>,
    pub is_redeemed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Lifecycle state on `today`.
    #[must_use]
    pub fn status(&self, today: NaiveDate) -> CouponStatus {
        CouponStatus::classify(self.is_redeemed, self.expiry_date, today)
    }

    #[must_use]
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.status(today).is_active()
    }

    /// Past its expiry date, regardless of redemption.
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| today > expiry)
    }
}

/// Validated user-editable coupon fields.
///
/// Produced by [`crate::form::CouponFormInput::validate`] and sent to the
/// backend for both inserts and updates. The backend fills in the id, owner
/// and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponDraft {
    pub store: StoreName,
    pub amount: Amount,
    pub description: Option<String>,
    pub link: Option<Url>,
    pub image_url: Option<String>,
    pub coupon_code: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl CouponDraft {
    /// Draft holding the current values of a stored coupon.
    #[must_use]
    pub fn from_coupon(coupon: &Coupon) -> Self {
        Self {
            store: coupon.store.clone(),
            amount: coupon.amount,
            description: coupon.description.clone(),
            link: coupon.link.clone(),
            image_url: coupon.image_url.clone(),
            coupon_code: coupon.coupon_code.clone(),
            expiry_date: coupon.expiry_date,
        }
    }
}

/// Display record for a user, keyed by the auth identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: Email,
}

/// Row inserted when a profile does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: UserId,
    pub name: String,
    pub email: Email,
}

impl NewProfile {
    /// Build a profile row, falling back to the email local part when the
    /// sign-up metadata carried no name.
    #[must_use]
    pub fn new(id: UserId, name: Option<&str>, email: Email) -> Self {
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| email.local_part().to_owned(), str::to_owned);
        Self { id, name, email }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn sample(store: &str, amount: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: CouponId::random(),
            user_id: UserId::new(uuid::Uuid::nil()),
            store: StoreName::parse(store).unwrap(),
            amount: Amount::from_whole(amount).unwrap(),
            description: None,
            link: None,
            image_url: None,
            coupon_code: None,
            expiry_date: None,
            is_redeemed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expired_and_redeemed_are_independent() {
        let mut coupon = sample("BUYME", 100);
        coupon.expiry_date = Some(day("2026-01-31"));
        coupon.is_redeemed = true;

        let today = day("2026-02-01");
        assert!(coupon.is_expired(today));
        assert_eq!(coupon.status(today), CouponStatus::Redeemed);
        assert!(!coupon.is_active(today));
    }

    #[test]
    fn test_new_profile_name_fallback() {
        let email = Email::parse("yael@example.com").unwrap();
        let id = UserId::random();
        assert_eq!(NewProfile::new(id, Some("  "), email.clone()).name, "yael");
        assert_eq!(NewProfile::new(id, None, email.clone()).name, "yael");
        assert_eq!(NewProfile::new(id, Some(" Yael "), email).name, "Yael");
    }

    #[test]
    fn test_draft_from_coupon_keeps_fields() {
        let mut coupon = sample("כללית", 30);
        coupon.coupon_code = Some("ABC-123".into());
        let draft = CouponDraft::from_coupon(&coupon);
        assert_eq!(draft.store, coupon.store);
        assert_eq!(draft.coupon_code.as_deref(), Some("ABC-123"));
    }
}
