//! The ordered in-memory coupon list mirrored from the backend.
//!
//! [`CouponList`] only holds coupons the backend has confirmed. Callers apply a
//! mutation after the remote call succeeds and leave the list alone when it
//! fails, so the mirror never runs ahead of the table.

use crate::coupon::Coupon;
use crate::types::CouponId;

/// One user's coupons, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CouponList {
    coupons: Vec<Coupon>,
}

impl CouponList {
    #[must_use]
    pub const fn new() -> Self {
        Self { coupons: Vec::new() }
    }

    /// Build a list from a full fetch ordered by `created_at` descending.
    #[must_use]
    pub const fn from_fetched(coupons: Vec<Coupon>) -> Self {
        Self { coupons }
    }

    /// Replace the whole collection with a fresh fetch.
    pub fn replace_all(&mut self, coupons: Vec<Coupon>) {
        self.coupons = coupons;
    }

    /// Insert a newly created coupon at the front.
    pub fn prepend(&mut self, coupon: Coupon) {
        self.coupons.insert(0, coupon);
    }

    /// Replace the coupon with the same id, keeping its position.
    ///
    /// Returns `false` if no coupon matched.
    pub fn replace(&mut self, coupon: Coupon) -> bool {
        match self.coupons.iter_mut().find(|c| c.id == coupon.id) {
            Some(slot) => {
                *slot = coupon;
                true
            }
            None => false,
        }
    }

    /// Remove and return the coupon with `id`.
    pub fn remove(&mut self, id: CouponId) -> Option<Coupon> {
        let index = self.coupons.iter().position(|c| c.id == id)?;
        Some(self.coupons.remove(index))
    }

    #[must_use]
    pub fn get(&self, id: CouponId) -> Option<&Coupon> {
        self.coupons.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coupon> {
        self.coupons.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Coupon] {
        &self.coupons
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }
}

impl<'a> IntoIterator for &'a CouponList {
    type Item = &'a Coupon;
    type IntoIter = std::slice::Iter<'a, Coupon>;

    fn into_iter(self) -> Self::IntoIter {
        self.coupons.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::coupon::tests::sample;

    #[test]
    fn test_prepend_puts_new_coupon_first() {
        let older = sample("BUYME", 100);
        let mut list = CouponList::from_fetched(vec![older.clone()]);
        let newer = sample("כללית", 30);
        list.prepend(newer.clone());

        let ids: Vec<_> = list.iter().map(|c| c.id).collect();
        assert_eq!(ids, [newer.id, older.id]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let first = sample("BUYME", 100);
        let second = sample("כללית", 30);
        let mut list = CouponList::from_fetched(vec![first.clone(), second.clone()]);

        let mut redeemed = second.clone();
        redeemed.is_redeemed = true;
        assert!(list.replace(redeemed));
        assert!(list.as_slice().last().unwrap().is_redeemed);
        assert_eq!(list.len(), 2);

        assert!(!list.replace(sample("ויקטורי", 15)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_remove() {
        let coupon = sample("BUYME", 100);
        let mut list = CouponList::from_fetched(vec![coupon.clone()]);
        assert_eq!(list.remove(coupon.id).map(|c| c.id), Some(coupon.id));
        assert!(list.is_empty());
        assert!(list.remove(coupon.id).is_none());
    }

    #[test]
    fn test_replace_all_discards_previous_contents() {
        let mut list = CouponList::from_fetched(vec![sample("BUYME", 100)]);
        let fresh = sample("שופרסל", 200);
        list.replace_all(vec![fresh.clone()]);
        assert_eq!(list.len(), 1);
        assert!(list.get(fresh.id).is_some());
    }
}
