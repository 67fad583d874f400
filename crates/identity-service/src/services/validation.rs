//! Input validation, run before any side effect.
//!
//! Each check returns `IdentityError::Validation` naming the offending field.

use crate::errors::IdentityError;

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_FULL_NAME_LENGTH: usize = 200;
pub const MAX_AUTHORIZATION_CODE_LENGTH: usize = 2048;

/// Trim and lowercase an email. Lookups are case-insensitive anyway; this
/// keeps stored addresses in one canonical form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an email and return its normalized form.
pub fn validate_email(email: &str) -> Result<String, IdentityError> {
    let email = normalize_email(email);

    if email.is_empty() {
        return Err(IdentityError::validation("email", "must not be empty"));
    }
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(IdentityError::validation(
            "email",
            "must be at most 254 characters",
        ));
    }
    if !has_email_shape(&email) {
        return Err(IdentityError::validation("email", "is not a valid address"));
    }

    Ok(email)
}

// something@domain.tld with no empty labels and no whitespace
fn has_email_shape(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

pub fn validate_password(password: &str) -> Result<(), IdentityError> {
    let length = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(IdentityError::validation(
            "password",
            "must be 6 to 128 characters",
        ));
    }
    Ok(())
}

/// Validate a display name and return it trimmed.
pub fn validate_full_name(full_name: &str) -> Result<String, IdentityError> {
    let trimmed = full_name.trim();

    if trimmed.is_empty() {
        return Err(IdentityError::validation("full_name", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_FULL_NAME_LENGTH {
        return Err(IdentityError::validation(
            "full_name",
            "must be at most 200 characters",
        ));
    }

    Ok(trimmed.to_string())
}

pub fn validate_authorization_code(code: &str) -> Result<(), IdentityError> {
    if code.trim().is_empty() {
        return Err(IdentityError::validation("code", "must not be empty"));
    }
    if code.len() > MAX_AUTHORIZATION_CODE_LENGTH {
        return Err(IdentityError::validation(
            "code",
            "must be at most 2048 characters",
        ));
    }
    Ok(())
}
