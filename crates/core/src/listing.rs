//! Search, status filtering and sorting of a coupon list.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::coupon::Coupon;
use crate::types::StatusFilter;

/// Column the list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Created,
    Store,
    Amount,
    /// Coupons without an expiry sort after every dated one.
    Expiry,
}

impl SortField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Store => "store",
            Self::Amount => "amount",
            Self::Expiry => "expiry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// List view parameters, taken from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Case-insensitive search term.
    pub q: String,
    pub status: StatusFilter,
    pub sort: SortField,
    pub order: SortOrder,
}

impl ListQuery {
    /// Whether a search term or status filter narrows the list.
    #[must_use]
    pub fn is_narrowed(&self) -> bool {
        !self.q.trim().is_empty() || self.status != StatusFilter::All
    }

    /// Whether `coupon` passes the search term and status filter.
    #[must_use]
    pub fn matches(&self, coupon: &Coupon, today: NaiveDate) -> bool {
        if !self.status.admits(coupon.status(today)) {
            return false;
        }
        let needle = self.q.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        coupon.store.as_str().to_lowercase().contains(&needle)
            || coupon
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
            || coupon.amount.to_string().contains(&needle)
    }

    /// Filter and sort `coupons`.
    ///
    /// The sort is stable, so coupons that compare equal keep their incoming
    /// order (newest first, as the mirror holds them).
    #[must_use]
    pub fn apply<'a>(&self, coupons: impl IntoIterator<Item = &'a Coupon>, today: NaiveDate) -> Vec<&'a Coupon> {
        let mut visible: Vec<&Coupon> = coupons
            .into_iter()
            .filter(|coupon| self.matches(coupon, today))
            .collect();

        visible.sort_by(|a, b| {
            let ordering = compare(self.sort, a, b);
            match self.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        visible
    }
}

fn compare(field: SortField, a: &Coupon, b: &Coupon) -> Ordering {
    match field {
        SortField::Created => a.created_at.cmp(&b.created_at),
        SortField::Store => a
            .store
            .as_str()
            .to_lowercase()
            .cmp(&b.store.as_str().to_lowercase()),
        SortField::Amount => a.amount.cmp(&b.amount),
        SortField::Expiry => match (a.expiry_date, b.expiry_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::coupon::tests::{day, sample};

    fn stores(list: &[&Coupon]) -> Vec<String> {
        list.iter().map(|c| c.store.to_string()).collect()
    }

    fn fixture() -> Vec<Coupon> {
        let base = Utc::now();
        let mut a = sample("BUYME", 100);
        a.created_at = base;
        a.description = Some("Birthday gift card".into());
        let mut b = sample("שופרסל", 30);
        b.created_at = base - Duration::hours(1);
        b.expiry_date = Some(day("2026-06-01"));
        let mut c = sample("כללית", 50);
        c.created_at = base - Duration::hours(2);
        c.is_redeemed = true;
        let mut d = sample("ויקטורי", 15);
        d.created_at = base - Duration::hours(3);
        d.expiry_date = Some(day("2026-01-01"));
        vec![a, b, c, d]
    }

    #[test]
    fn test_default_is_all_newest_first() {
        let coupons = fixture();
        let shown = ListQuery::default().apply(&coupons, day("2026-03-01"));
        assert_eq!(stores(&shown), ["BUYME", "שופרסל", "כללית", "ויקטורי"]);
    }

    #[test]
    fn test_status_views() {
        let coupons = fixture();
        let today = day("2026-03-01");

        let active = ListQuery {
            status: StatusFilter::Active,
            ..ListQuery::default()
        };
        assert_eq!(stores(&active.apply(&coupons, today)), ["BUYME", "שופרסל"]);

        let inactive = ListQuery {
            status: StatusFilter::Inactive,
            ..ListQuery::default()
        };
        assert_eq!(stores(&inactive.apply(&coupons, today)), ["כללית", "ויקטורי"]);
    }

    #[test]
    fn test_search_matches_store_description_and_amount() {
        let coupons = fixture();
        let today = day("2026-03-01");
        let search = |q: &str| ListQuery {
            q: q.into(),
            ..ListQuery::default()
        };

        assert_eq!(stores(&search("buy").apply(&coupons, today)), ["BUYME"]);
        assert_eq!(stores(&search("GIFT").apply(&coupons, today)), ["BUYME"]);
        assert_eq!(stores(&search("50").apply(&coupons, today)), ["כללית"]);
        assert!(search("nothing here").apply(&coupons, today).is_empty());
    }

    #[test]
    fn test_sort_amount_is_numeric() {
        let coupons = fixture();
        let query = ListQuery {
            sort: SortField::Amount,
            order: SortOrder::Asc,
            ..ListQuery::default()
        };
        let amounts: Vec<i64> = query
            .apply(&coupons, day("2026-03-01"))
            .iter()
            .map(|c| c.amount.to_i64())
            .collect();
        assert_eq!(amounts, [15, 30, 50, 100]);
    }

    #[test]
    fn test_sort_expiry_puts_undated_last_ascending() {
        let coupons = fixture();
        let query = ListQuery {
            sort: SortField::Expiry,
            order: SortOrder::Asc,
            ..ListQuery::default()
        };
        let shown = query.apply(&coupons, day("2026-03-01"));
        assert_eq!(shown[0].store.as_str(), "ויקטורי");
        assert_eq!(shown[1].store.as_str(), "שופרסל");
        assert!(shown[2].expiry_date.is_none());
        assert!(shown[3].expiry_date.is_none());
    }

    #[test]
    fn test_is_narrowed() {
        assert!(!ListQuery::default().is_narrowed());
        assert!(ListQuery {
            q: "x".into(),
            ..ListQuery::default()
        }
        .is_narrowed());
        assert!(ListQuery {
            status: StatusFilter::Active,
            ..ListQuery::default()
        }
        .is_narrowed());
    }

    #[test]
    fn test_query_string_values_deserialize() {
        let query: ListQuery =
            serde_json::from_str(r#"{"q":"x","status":"inactive","sort":"expiry","order":"asc"}"#).unwrap();
        assert_eq!(query.status, StatusFilter::Inactive);
        assert_eq!(query.sort, SortField::Expiry);
        assert_eq!(query.order, SortOrder::Asc);
    }
}
