//! Coupix Core - Shared domain types and pure logic.
//!
//! This crate provides the coupon domain used by the `coupix-web` server and
//! its integration tests.
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clock. Anything time-dependent takes `today` as an argument so
//! behaviour is reproducible in tests.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, store names, amounts and statuses
//! - [`coupon`] - The coupon and profile records
//! - [`form`] - Field-level validation of submitted forms
//! - [`listing`] - Search, status filtering and sorting of a coupon list
//! - [`sync`] - The ordered in-memory coupon list mirrored from the backend
//! - [`image`] - Client-side checks for coupon image uploads

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod coupon;
pub mod form;
pub mod image;
pub mod listing;
pub mod sync;
pub mod types;

pub use coupon::{Coupon, CouponDraft, NewProfile, Profile};
pub use form::{
    CouponFormInput, Credentials, FieldError, FormErrors, PasswordChange, SignUp, validate_login,
    validate_password_change, validate_profile_name, validate_signup,
};
pub use image::{ImageError, ImageUpload, MAX_IMAGE_BYTES};
pub use listing::{ListQuery, SortField, SortOrder};
pub use sync::CouponList;
pub use types::*;
