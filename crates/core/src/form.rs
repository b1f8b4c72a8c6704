//! Field-level validation of submitted forms.
//!
//! Every validator collects all field errors instead of stopping at the first
//! one, so a re-rendered form can mark each bad input at once. A form that
//! fails validation never reaches the backend.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::coupon::{Coupon, CouponDraft};
use crate::types::{
    Amount, AmountError, Email, OTHER_CHOICE, STORE_PRESETS, StoreName, StoreNameError,
};

/// Minimum password length accepted by the auth backend.
pub const MIN_PASSWORD_LENGTH: usize = 6;
/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
/// Maximum coupon code length in characters.
pub const MAX_CODE_LENGTH: usize = 100;
/// Minimum display name length in characters.
pub const MIN_NAME_LENGTH: usize = 2;
/// Maximum display name length in characters.
pub const MAX_NAME_LENGTH: usize = 100;

/// A validation failure attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the form input.
    pub field: &'static str,
    pub message: String,
}

/// All validation failures for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors(Vec<FieldError>);

impl FormErrors {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First message recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(value)` when no errors were recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` if any field failed.
    pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for FormErrors {}

/// Raw coupon form values as submitted by the browser.
///
/// The store and amount each come as a select value plus a free-text input
/// that only counts when the select is set to [`OTHER_CHOICE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouponFormInput {
    pub store_choice: String,
    pub store_custom: String,
    pub amount_choice: String,
    pub amount_custom: String,
    pub description: String,
    pub link: String,
    pub coupon_code: String,
    /// `YYYY-MM-DD` or empty.
    pub expiry_date: String,
}

impl CouponFormInput {
    /// Prefill the form from a stored coupon.
    #[must_use]
    pub fn from_coupon(coupon: &Coupon) -> Self {
        let (store_choice, store_custom) = if coupon.store.is_preset() {
            (coupon.store.to_string(), String::new())
        } else {
            (OTHER_CHOICE.to_owned(), coupon.store.to_string())
        };
        let (amount_choice, amount_custom) = if coupon.amount.is_preset() {
            (coupon.amount.to_string(), String::new())
        } else {
            (OTHER_CHOICE.to_owned(), coupon.amount.to_string())
        };

        Self {
            store_choice,
            store_custom,
            amount_choice,
            amount_custom,
            description: coupon.description.clone().unwrap_or_default(),
            link: coupon.link.as_ref().map(ToString::to_string).unwrap_or_default(),
            coupon_code: coupon.coupon_code.clone().unwrap_or_default(),
            expiry_date: coupon
                .expiry_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }

    /// Validate into a draft.
    ///
    /// `existing` is the coupon being edited. Its expiry date may stay in the
    /// past, but a new or changed expiry must be today or later. The returned
    /// draft has no image; the caller attaches one after upload.
    ///
    /// # Errors
    ///
    /// Returns every field that failed.
    pub fn validate(&self, today: NaiveDate, existing: Option<&Coupon>) -> Result<CouponDraft, FormErrors> {
        let mut errors = FormErrors::new();

        let store = self.store(&mut errors);
        let amount = self.amount(&mut errors);

        let description = optional_text(&self.description);
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LENGTH)
        {
            errors.push(
                "description",
                format!("Description must be at most {MAX_DESCRIPTION_LENGTH} characters"),
            );
        }

        let link = match optional_text(&self.link) {
            None => None,
            Some(raw) => match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                _ => {
                    errors.push("link", "Please enter a valid URL");
                    None
                }
            },
        };

        let coupon_code = optional_text(&self.coupon_code);
        if coupon_code
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_CODE_LENGTH)
        {
            errors.push(
                "coupon_code",
                format!("Coupon code must be at most {MAX_CODE_LENGTH} characters"),
            );
        }

        let expiry_date = match optional_text(&self.expiry_date) {
            None => None,
            Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => {
                    let unchanged = existing.is_some_and(|c| c.expiry_date == Some(date));
                    if date < today && !unchanged {
                        errors.push("expiry_date", "Expiry date cannot be in the past");
                    }
                    Some(date)
                }
                Err(_) => {
                    errors.push("expiry_date", "Please enter a valid date");
                    None
                }
            },
        };

        match (store, amount) {
            (Some(store), Some(amount)) if errors.is_empty() => Ok(CouponDraft {
                store,
                amount,
                description,
                link,
                image_url: None,
                coupon_code,
                expiry_date,
            }),
            _ => Err(errors),
        }
    }

    fn store(&self, errors: &mut FormErrors) -> Option<StoreName> {
        let choice = self.store_choice.trim();
        if choice.is_empty() {
            errors.push("store_choice", "Store is required");
            return None;
        }
        let (field, raw) = if choice == OTHER_CHOICE {
            ("store_custom", self.store_custom.as_str())
        } else if STORE_PRESETS.contains(&choice) {
            ("store_choice", choice)
        } else {
            errors.push("store_choice", "Please choose a store from the list");
            return None;
        };
        match StoreName::parse(raw) {
            Ok(store) => Some(store),
            Err(StoreNameError::Empty) => {
                errors.push(field, "Please enter a store name");
                None
            }
            Err(e @ StoreNameError::TooLong { .. }) => {
                errors.push(field, capitalize(&e.to_string()));
                None
            }
        }
    }

    fn amount(&self, errors: &mut FormErrors) -> Option<Amount> {
        let choice = self.amount_choice.trim();
        if choice.is_empty() {
            errors.push("amount_choice", "Amount is required");
            return None;
        }
        if choice == OTHER_CHOICE {
            return match self.amount_custom.parse::<Amount>() {
                Ok(amount) => Some(amount),
                Err(AmountError::Empty) => {
                    errors.push("amount_custom", "Please enter an amount");
                    None
                }
                Err(_) => {
                    errors.push("amount_custom", "Amount must be a positive whole number");
                    None
                }
            };
        }
        match choice.parse::<Amount>() {
            Ok(amount) if amount.is_preset() => Some(amount),
            _ => {
                errors.push("amount_choice", "Please choose an amount from the list");
                None
            }
        }
    }
}

/// Validated login submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: Email,
    pub password: String,
}

/// Validate a login form.
///
/// # Errors
///
/// Returns the failing fields.
pub fn validate_login(email: &str, password: &str) -> Result<Credentials, FormErrors> {
    let mut errors = FormErrors::new();
    let email = parse_email(email, &mut errors);
    check_password("password", password, "Password", &mut errors);
    match email {
        Some(email) if errors.is_empty() => Ok(Credentials {
            email,
            password: password.to_owned(),
        }),
        _ => Err(errors),
    }
}

/// Validated sign-up submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUp {
    pub name: String,
    pub email: Email,
    pub password: String,
}

/// Validate a sign-up form.
///
/// # Errors
///
/// Returns the failing fields.
pub fn validate_signup(
    name: &str,
    email: &str,
    password: &str,
    password_confirm: &str,
) -> Result<SignUp, FormErrors> {
    let mut errors = FormErrors::new();
    let name = check_name(name, &mut errors);
    let email = parse_email(email, &mut errors);
    check_password("password", password, "Password", &mut errors);
    if password != password_confirm {
        errors.push("password_confirm", "Passwords do not match");
    }
    match email {
        Some(email) if errors.is_empty() => Ok(SignUp {
            name,
            email,
            password: password.to_owned(),
        }),
        _ => Err(errors),
    }
}

/// Validated password change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// Validate a password change form.
///
/// # Errors
///
/// Returns the failing fields.
pub fn validate_password_change(
    current_password: &str,
    new_password: &str,
    confirm_password: &str,
) -> Result<PasswordChange, FormErrors> {
    let mut errors = FormErrors::new();
    check_password("current_password", current_password, "Current password", &mut errors);
    check_password("new_password", new_password, "New password", &mut errors);
    if new_password != confirm_password {
        errors.push("confirm_password", "Passwords do not match");
    }
    errors.finish(|| PasswordChange {
        current_password: current_password.to_owned(),
        new_password: new_password.to_owned(),
    })
}

/// Validate a display name, returning it trimmed.
///
/// # Errors
///
/// Returns an error on the `name` field when the length is out of range.
pub fn validate_profile_name(name: &str) -> Result<String, FormErrors> {
    let mut errors = FormErrors::new();
    let name = check_name(name, &mut errors);
    errors.finish(|| name)
}

fn check_name(raw: &str, errors: &mut FormErrors) -> String {
    let name = raw.trim();
    let len = name.chars().count();
    if len < MIN_NAME_LENGTH {
        errors.push(
            "name",
            format!("Name must be at least {MIN_NAME_LENGTH} characters"),
        );
    } else if len > MAX_NAME_LENGTH {
        errors.push(
            "name",
            format!("Name must be at most {MAX_NAME_LENGTH} characters"),
        );
    }
    name.to_owned()
}

fn parse_email(raw: &str, errors: &mut FormErrors) -> Option<Email> {
    Email::parse(raw)
        .map_err(|_| errors.push("email", "Please enter a valid email address"))
        .ok()
}

fn check_password(field: &'static str, password: &str, label: &str, errors: &mut FormErrors) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(
            field,
            format!("{label} must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
}

fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
