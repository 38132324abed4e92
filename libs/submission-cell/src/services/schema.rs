use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;

use crate::models::{CleanSubmission, FieldError, SubmissionPayload};

const MIN_AGE: i32 = 18;
const MAX_AGE: i32 = 120;

/// Validate the mapped payload and normalize it for storage. `bypass`
/// relaxes only the CAPTCHA token requirement; every other rule still
/// applies.
pub fn validate(
    payload: SubmissionPayload,
    default_country_prefix: &str,
    bypass: bool,
) -> Result<CleanSubmission, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name_pattern = Regex::new(r"^[A-Za-z\s'-]+$").unwrap();

    let first_name = payload.first_name.trim().to_string();
    if first_name.is_empty() || first_name.len() > 50 {
        errors.push(FieldError::new("firstName", "must be 1-50 characters"));
    } else if !name_pattern.is_match(&first_name) {
        errors.push(FieldError::new(
            "firstName",
            "may only contain letters, spaces, apostrophes and hyphens",
        ));
    }

    let last_name = payload.last_name.trim().to_string();
    if last_name.is_empty() || last_name.len() > 50 {
        errors.push(FieldError::new("lastName", "must be 1-50 characters"));
    } else if !name_pattern.is_match(&last_name) {
        errors.push(FieldError::new(
            "lastName",
            "may only contain letters, spaces, apostrophes and hyphens",
        ));
    }

    let email = normalize_email(&payload.email);
    if email.is_empty() || email.len() > 100 {
        errors.push(FieldError::new("email", "must be 1-100 characters"));
    } else if !validate_email(&email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }

    let phone = match payload.phone.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match normalize_phone(raw, default_country_prefix) {
            Some(normalized) => Some(normalized),
            None => {
                errors.push(FieldError::new("phone", "must be a valid phone number"));
                None
            }
        },
    };

    let address = payload.address.filter(|a| a.any_field_set());
    if let Some(address) = &address {
        let has_country = address
            .country
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if !has_country {
            errors.push(FieldError::new(
                "address.country",
                "is required when an address is provided",
            ));
        }
    }

    let date_of_birth = match payload.date_of_birth.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => {
                let age = age_in_years(date);
                if !(MIN_AGE..=MAX_AGE).contains(&age) {
                    errors.push(FieldError::new(
                        "dateOfBirth",
                        format!("age must be between {MIN_AGE} and {MAX_AGE}"),
                    ));
                    None
                } else {
                    Some(date)
                }
            }
            Err(_) => {
                errors.push(FieldError::new("dateOfBirth", "must be YYYY-MM-DD"));
                None
            }
        },
    };

    let turnstile_token = payload
        .turnstile_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    if turnstile_token.is_none() && !bypass {
        errors.push(FieldError::new("turnstileToken", "is required"));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(CleanSubmission {
        first_name,
        last_name,
        email,
        phone,
        address,
        date_of_birth,
        turnstile_token,
    })
}

/// Lowercase and strip anything tag-shaped before the address is stored or
/// compared against the unique index.
pub fn normalize_email(raw: &str) -> String {
    let strip_tags = Regex::new(r"<[^>]*>").unwrap();
    strip_tags
        .replace_all(raw.trim(), "")
        .to_lowercase()
        .trim()
        .to_string()
}

fn validate_email(email: &str) -> bool {
    let pattern = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    pattern.is_match(email)
}

/// Normalize to E.164, assuming the default country prefix when the number
/// arrives without one. National trunk zeros are dropped.
pub fn normalize_phone(raw: &str, default_country_prefix: &str) -> Option<String> {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let candidate = if has_plus {
        format!("+{digits}")
    } else {
        let national = digits.trim_start_matches('0');
        if national.is_empty() {
            return None;
        }
        format!("{default_country_prefix}{national}")
    };

    let e164 = Regex::new(r"^\+[1-9]\d{1,14}$").unwrap();
    e164.is_match(&candidate).then_some(candidate)
}

fn age_in_years(date_of_birth: NaiveDate) -> i32 {
    let today = Utc::now().date_naive();
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}
