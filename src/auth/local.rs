//! Email + password accounts.

use serde::Deserialize;
use thiserror::Error;

use super::password;
use super::validation::{self, ValidationError};
use crate::db::models::User;
use crate::store::users::{NewLocalUser, UserRepository};
use crate::store::StoreError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("An account with that email address already exists")]
    DuplicateUser,

    #[error("{0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("No account found for that email address")]
    UserNotFound,

    #[error("Incorrect password")]
    InvalidCredential,

    #[error("{0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate the sign-up form and create the account.
///
/// Rules are checked in form order (names, email, password) and the first
/// failure is returned. The username keeps the case it was typed in.
pub async fn register_local(
    users: &dyn UserRepository,
    form: &SignupForm,
    bcrypt_cost: u32,
) -> Result<User, RegisterError> {
    let first_name = form.first_name.trim();
    let last_name = form.last_name.trim();
    let username = form.username.trim();

    validation::check_names(first_name, last_name)?;
    validation::check_email(username)?;
    password::check_policy(&form.password)?;

    if users.find_by_username(username).await?.is_some() {
        return Err(RegisterError::DuplicateUser);
    }

    let password_hash = password::hash_password(form.password.clone(), bcrypt_cost)
        .await
        .map_err(RegisterError::Hash)?;

    let new_user = NewLocalUser {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        username: username.to_string(),
        password_hash,
    };

    match users.create_local(&new_user).await {
        Ok(user) => Ok(user),
        // Lost a race with a concurrent sign-up for the same address.
        Err(StoreError::Conflict(_)) => Err(RegisterError::DuplicateUser),
        Err(e) => Err(e.into()),
    }
}

/// Check an email/password pair. Accounts created through an OAuth provider
/// have no password and never match.
pub async fn authenticate_local(
    users: &dyn UserRepository,
    username: &str,
    password: &str,
) -> Result<User, LoginError> {
    let user = users
        .find_by_username(username)
        .await?
        .ok_or(LoginError::UserNotFound)?;

    let Some(hash) = user.password_hash.clone() else {
        return Err(LoginError::InvalidCredential);
    };

    let matches = password::verify_password(password.to_string(), hash)
        .await
        .map_err(LoginError::Hash)?;

    if matches {
        Ok(user)
    } else {
        Err(LoginError::InvalidCredential)
    }
}
