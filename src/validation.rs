use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;

// Hardcoded pattern; compiling it cannot fail at runtime.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,12}$")
        .expect("hardcoded email regex is invalid")
});

/// Validate email shape
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Character count within `min..=max`
pub fn validate_length(value: &str, min: usize, max: usize) -> bool {
    let len = value.trim().chars().count();
    len >= min && len <= max
}

pub fn require_email(email: &str) -> Result<(), AppError> {
    if validate_email(email) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "This is an invalid email address.".into(),
        ))
    }
}

pub fn require_name(field: &str, value: &str) -> Result<(), AppError> {
    if validate_length(value, 2, 30) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{field} must be between 2 and 30 characters."
        )))
    }
}

pub fn require_password(password: &str) -> Result<(), AppError> {
    if validate_length(password, 6, 40) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Password must be between 6 and 40 characters.".into(),
        ))
    }
}

/// Birth date parts must form a real calendar date, not in the future and
/// not more than 120 years back.
pub fn require_birth_date(year: i32, month: u32, day: u32) -> Result<(), AppError> {
    let invalid = || AppError::Validation("Please enter a valid date of birth.".into());

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let today = Utc::now().date_naive();
    if date > today || today.year() - year > 120 {
        return Err(invalid());
    }
    Ok(())
}

/// Lowercased name with everything but ASCII alphanumerics stripped.
pub fn username_base(first_name: &str, last_name: &str) -> String {
    let base: String = format!("{first_name}{last_name}")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}
