use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};

use super::{is_unique_violation, StoreError};
use crate::auth::oauth::{ExternalIdentity, Provider};
use crate::db::models::User;
use crate::state::DbPool;

/// Fields for a user signing up with an email address and password.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password_hash: String,
}

/// Identity store: user records keyed by username or provider id.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a local account. Fails with `Conflict` when the username is
    /// already taken, ignoring case.
    async fn create_local(&self, user: &NewLocalUser) -> Result<User, StoreError>;

    /// Case-insensitive lookup, for any script.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Find the user linked to this provider account, creating it on first
    /// sign-in.
    async fn find_or_create_external(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<User, StoreError>;
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, username, password_hash, google_id, facebook_id, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        password_hash: row.get(4)?,
        google_id: row.get(5)?,
        facebook_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Lookup key for a username: trimmed and lowercased with Unicode case
/// folding, so `Émile@…` and `émile@…` are the same account.
pub fn username_key(username: &str) -> String {
    username.trim().to_lowercase()
}

fn provider_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "google_id",
        Provider::Facebook => "facebook_id",
    }
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn select_one(
        &self,
        filter: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, filter);
        let user = conn
            .query_row(&sql, params![value], user_from_row)
            .optional()?;
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_local(&self, user: &NewLocalUser) -> Result<User, StoreError> {
        let id = uuid::Uuid::now_v7().to_string();
        {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO users (id, first_name, last_name, username, username_key, password_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    user.first_name,
                    user.last_name,
                    user.username,
                    username_key(&user.username),
                    user.password_hash
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e, "users.username_key") {
                    StoreError::Conflict(format!("username {} is taken", user.username))
                } else {
                    StoreError::Sql(e)
                }
            })?;
        }

        self.select_one("id", &id)?
            .ok_or_else(|| StoreError::Sql(rusqlite::Error::QueryReturnedNoRows))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.select_one("username_key", &username_key(username))
    }

    async fn find_or_create_external(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<User, StoreError> {
        let column = provider_column(identity.provider);

        if let Some(user) = self.select_one(column, &identity.external_id)? {
            return Ok(user);
        }

        {
            let conn = self.pool.get()?;
            let sql = format!(
                "INSERT OR IGNORE INTO users (id, first_name, last_name, {}) VALUES (?1, ?2, ?3, ?4)",
                column
            );
            conn.execute(
                &sql,
                params![
                    uuid::Uuid::now_v7().to_string(),
                    identity.first_name,
                    identity.last_name,
                    identity.external_id
                ],
            )?;
        }
        tracing::info!(
            "Created user for {} account {}",
            identity.provider,
            identity.external_id
        );

        // A concurrent first sign-in may have won the insert; either way the
        // row exists now.
        self.select_one(column, &identity.external_id)?
            .ok_or_else(|| StoreError::Sql(rusqlite::Error::QueryReturnedNoRows))
    }
}
