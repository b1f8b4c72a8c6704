//! Status enums for coupons and view state.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a coupon on a given day.
///
/// Redemption wins over expiry: a redeemed coupon reports `Redeemed` even
/// after its expiry date has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Active,
    Redeemed,
    Expired,
}

impl CouponStatus {
    /// Classify a coupon from its stored fields.
    ///
    /// A coupon stays valid through its expiry day and expires the day after.
    #[must_use]
    pub fn classify(is_redeemed: bool, expiry_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        if is_redeemed {
            Self::Redeemed
        } else if expiry_date.is_some_and(|expiry| today > expiry) {
            Self::Expired
        } else {
            Self::Active
        }
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Which coupons the list view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Not redeemed and not past expiry.
    Active,
    /// Redeemed or past expiry.
    Inactive,
    #[default]
    All,
}

impl StatusFilter {
    /// Whether a coupon in `status` belongs in this view.
    #[must_use]
    pub const fn admits(self, status: CouponStatus) -> bool {
        match self {
            Self::Active => status.is_active(),
            Self::Inactive => !status.is_active(),
            Self::All => true,
        }
    }

    /// Query-string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::All => "all",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "all" => Ok(Self::All),
            _ => Err(format!("invalid status filter: {s}")),
        }
    }
}

/// Colour scheme selected in the navigation bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    /// Value for the `data-theme` attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_valid_through_expiry_day() {
        let expiry = Some(day("2026-03-10"));
        assert_eq!(
            CouponStatus::classify(false, expiry, day("2026-03-10")),
            CouponStatus::Active
        );
        assert_eq!(
            CouponStatus::classify(false, expiry, day("2026-03-11")),
            CouponStatus::Expired
        );
    }

    #[test]
    fn test_redeemed_wins_over_expired() {
        let status = CouponStatus::classify(true, Some(day("2020-01-01")), day("2026-01-01"));
        assert_eq!(status, CouponStatus::Redeemed);
    }

    #[test]
    fn test_no_expiry_never_expires() {
        assert!(CouponStatus::classify(false, None, day("2099-12-31")).is_active());
    }

    #[test]
    fn test_filters_partition_statuses() {
        for status in [CouponStatus::Active, CouponStatus::Redeemed, CouponStatus::Expired] {
            let active = StatusFilter::Active.admits(status);
            let inactive = StatusFilter::Inactive.admits(status);
            assert_ne!(active, inactive);
            assert!(StatusFilter::All.admits(status));
        }
        assert!(!StatusFilter::Active.admits(CouponStatus::Redeemed));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("inactive".parse::<StatusFilter>().unwrap(), StatusFilter::Inactive);
        assert!("expired".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::default(), StatusFilter::All);
    }

    #[test]
    fn test_theme_toggle() {
        assert_eq!(Theme::Light.toggle(), Theme::Dark);
        assert_eq!(Theme::Dark.toggle().as_str(), "light");
    }
}
