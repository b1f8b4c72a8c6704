//! Store name type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Stores offered as one-click choices on the coupon form.
pub const STORE_PRESETS: [&str; 5] = ["שופרסל", "ויקטורי", "BUYME", "עובדים בריא", "כללית"];

/// Form value of the select option that reveals a free-text input.
///
/// Used by both the store and the amount selects.
pub const OTHER_CHOICE: &str = "Other";

/// Errors that can occur when parsing a [`StoreName`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreNameError {
    #[error("store is required")]
    Empty,
    #[error("store must be at most {max} characters")]
    TooLong { max: usize },
}

/// The store a coupon can be used at.
///
/// Either one of [`STORE_PRESETS`] or free text entered under "Other".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreName(String);

impl StoreName {
    /// Maximum length in characters.
    pub const MAX_LENGTH: usize = 100;

    /// Parse a store name, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is blank or too long.
    pub fn parse(s: &str) -> Result<Self, StoreNameError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(StoreNameError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(StoreNameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this name is one of [`STORE_PRESETS`].
    #[must_use]
    pub fn is_preset(&self) -> bool {
        STORE_PRESETS.contains(&self.0.as_str())
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StoreName {
    type Error = StoreNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StoreName> for String {
    fn from(name: StoreName) -> Self {
        name.0
    }
}

impl AsRef<str> for StoreName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_recognized() {
        for preset in STORE_PRESETS {
            assert!(StoreName::parse(preset).unwrap().is_preset());
        }
        assert!(!StoreName::parse("Rami Levy").unwrap().is_preset());
    }

    #[test]
    fn test_blank_is_rejected() {
        assert_eq!(StoreName::parse(" \t "), Err(StoreNameError::Empty));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 100 Hebrew letters are 200 bytes but still fit.
        let hebrew = "ש".repeat(100);
        assert!(StoreName::parse(&hebrew).is_ok());
        assert_eq!(
            StoreName::parse(&"x".repeat(101)),
            Err(StoreNameError::TooLong { max: 100 })
        );
    }
}
