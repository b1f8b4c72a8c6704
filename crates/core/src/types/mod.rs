//! Core types for Coupix.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod amount;
pub mod email;
pub mod id;
pub mod status;
pub mod store;

pub use amount::{AMOUNT_PRESETS, Amount, AmountError};
pub use email::{Email, EmailError};
pub use id::*;
pub use status::{CouponStatus, StatusFilter, Theme};
pub use store::{OTHER_CHOICE, STORE_PRESETS, StoreName, StoreNameError};
