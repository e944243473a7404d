use super::validation::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// At least six characters with a lowercase letter, an uppercase letter and
/// a digit.
pub fn check_policy(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(ValidationError::PasswordNoLowercase);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(ValidationError::PasswordNoUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PasswordNoDigit);
    }
    Ok(())
}

/// Salted bcrypt hash. Runs on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| format!("Hash task failed: {}", e))?
        .map_err(|e| format!("Failed to hash password: {}", e))
}

/// Compare `password` against a stored bcrypt hash.
pub async fn verify_password(password: String, hash: String) -> Result<bool, String> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| format!("Verify task failed: {}", e))?
        .map_err(|e| format!("Invalid password hash: {}", e))
}
