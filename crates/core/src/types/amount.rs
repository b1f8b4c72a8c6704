//! Coupon face value.
//!
//! Amounts are whole shekels. The backend column is an integer, so the value
//! is kept as a [`Decimal`] with no fractional part and crosses the wire as a
//! plain JSON integer.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Preset amounts offered by the coupon form, in display order.
pub const AMOUNT_PRESETS: [u32; 6] = [15, 30, 40, 50, 100, 200];

/// Errors that can occur when parsing an [`Amount`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is required")]
    Empty,
    #[error("amount must be a number")]
    NotANumber,
    #[error("amount must be a whole number")]
    Fractional,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount is too large")]
    TooLarge,
}

/// A positive whole-number amount.
///
/// ```
/// use coupix_core::Amount;
///
/// let amount: Amount = " 75 ".parse().unwrap();
/// assert_eq!(amount.to_i64(), 75);
/// assert_eq!(amount.display(), "₪75");
///
/// assert!("0".parse::<Amount>().is_err());
/// assert!("12.5".parse::<Amount>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(Decimal);

impl Amount {
    /// Largest value the integer column can hold.
    pub const MAX: i64 = i32::MAX as i64;

    /// Build an amount from a whole number.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is zero, negative or above [`Self::MAX`].
    pub fn from_whole(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive);
        }
        if value > Self::MAX {
            return Err(AmountError::TooLarge);
        }
        Ok(Self(Decimal::from(value)))
    }

    /// The amount as an integer.
    #[must_use]
    pub fn to_i64(&self) -> i64 {
        // Construction guarantees a whole number within i32 range.
        self.0.to_i64().unwrap_or_default()
    }

    /// The underlying decimal value.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether this amount is one of [`AMOUNT_PRESETS`].
    #[must_use]
    pub fn is_preset(&self) -> bool {
        AMOUNT_PRESETS
            .iter()
            .any(|preset| i64::from(*preset) == self.to_i64())
    }

    /// Format for display, e.g. `₪50`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("₪{}", self.to_i64())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_i64())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        let value = Decimal::from_str(trimmed).map_err(|_| AmountError::NotANumber)?;
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive);
        }
        if !value.fract().is_zero() {
            return Err(AmountError::Fractional);
        }
        let whole = value.to_i64().ok_or(AmountError::TooLarge)?;
        Self::from_whole(whole)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_whole(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.to_i64()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_trailing_zero_fraction() {
        let amount: Amount = "100.00".parse().unwrap();
        assert_eq!(amount.to_i64(), 100);
        assert_eq!(amount.to_string(), "100");
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!("".parse::<Amount>(), Err(AmountError::Empty));
        assert_eq!("abc".parse::<Amount>(), Err(AmountError::NotANumber));
        assert_eq!("-3".parse::<Amount>(), Err(AmountError::NotPositive));
        assert_eq!("0".parse::<Amount>(), Err(AmountError::NotPositive));
        assert_eq!("7.25".parse::<Amount>(), Err(AmountError::Fractional));
        assert_eq!("99999999999".parse::<Amount>(), Err(AmountError::TooLarge));
    }

    #[test]
    fn test_presets() {
        assert!(Amount::from_whole(50).unwrap().is_preset());
        assert!(!Amount::from_whole(75).unwrap().is_preset());
    }

    #[test]
    fn test_ordering_is_numeric() {
        let small = Amount::from_whole(9).unwrap();
        let large = Amount::from_whole(100).unwrap();
        assert!(small < large);
    }

    #[test]
    fn test_serde_uses_integer() {
        let amount = Amount::from_whole(40).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "40");
        let back: Amount = serde_json::from_str("200").unwrap();
        assert_eq!(back.to_i64(), 200);
        assert!(serde_json::from_str::<Amount>("0").is_err());
    }
}
