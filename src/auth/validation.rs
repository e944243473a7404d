//! Sign-up field rules. Each check reports the first rule that fails so the
//! form can show a single message.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("First name must contain only letters")]
    FirstName,

    #[error("Last name must contain only letters")]
    LastName,

    #[error("Please enter a valid email address")]
    Email,

    #[error("Password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    #[error("Password must contain at least one lowercase letter")]
    PasswordNoLowercase,

    #[error("Password must contain at least one uppercase letter")]
    PasswordNoUppercase,

    #[error("Password must contain at least one digit")]
    PasswordNoDigit,
}

pub fn is_alphabetic_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(char::is_alphabetic)
}

/// Syntactic check only: `local@domain.tld` with no whitespace and no empty
/// domain labels.
pub fn is_valid_email(email: &str) -> bool {
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
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

pub fn check_names(first_name: &str, last_name: &str) -> Result<(), ValidationError> {
    if !is_alphabetic_name(first_name) {
        return Err(ValidationError::FirstName);
    }
    if !is_alphabetic_name(last_name) {
        return Err(ValidationError::LastName);
    }
    Ok(())
}

pub fn check_email(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::Email)
    }
}
