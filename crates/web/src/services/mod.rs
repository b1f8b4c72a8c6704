//! Business logic services.
//!
//! # Services
//!
//! - `auth` - sign-in, sign-up, session refresh, profile and account self-service
//! - `coupons` - coupon CRUD with a per-user cached list kept in step with the backend

pub mod auth;
pub mod coupons;

pub use auth::{AuthError, AuthService};
pub use coupons::{CouponError, CouponService, ImageChange};
