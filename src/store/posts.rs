use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};

use super::{is_unique_violation, StoreError};
use crate::db::models::Post;
use crate::state::DbPool;

/// A post ready to be written. Built by [`crate::posts::draft`].
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: String,
    pub user_id: String,
    pub poster_name: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub posted_at: String,
}

/// Post store. Posts live in one table; "posts by user" is a query on
/// `user_id`.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Every post, in insertion order.
    async fn list(&self) -> Result<Vec<Post>, StoreError>;

    async fn list_by_author(&self, user_id: &str) -> Result<Vec<Post>, StoreError>;

    /// Look a post up by its id (any case) or by its slug.
    async fn find(&self, id_or_slug: &str) -> Result<Option<Post>, StoreError>;

    /// Whether `user_id` already owns a post with this title, ignoring case.
    async fn title_taken(&self, user_id: &str, title: &str) -> Result<bool, StoreError>;

    /// Fails with `Conflict` only when the author already has the title.
    async fn insert(&self, post: &NewPost) -> Result<Post, StoreError>;

    /// Returns false when no post had this id.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

const POST_COLUMNS: &str =
    "id, user_id, poster_name, slug, title, body, posted_at, created_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        poster_name: row.get(2)?,
        slug: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        posted_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn list(&self) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM posts ORDER BY rowid", POST_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map([], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn list_by_author(&self, user_id: &str) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM posts WHERE user_id = ?1 ORDER BY rowid",
            POST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params![user_id], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn find(&self, id_or_slug: &str) -> Result<Option<Post>, StoreError> {
        let key = id_or_slug.trim().to_lowercase();
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM posts WHERE lower(id) = ?1 OR slug = ?1 LIMIT 1",
            POST_COLUMNS
        );
        let post = conn
            .query_row(&sql, params![key], post_from_row)
            .optional()?;
        Ok(post)
    }

    async fn title_taken(&self, user_id: &str, title: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE user_id = ?1 AND title = ?2 COLLATE NOCASE",
            params![user_id, title],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    async fn insert(&self, post: &NewPost) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, poster_name, slug, title, body, posted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                post.id,
                post.user_id,
                post.poster_name,
                post.slug,
                post.title,
                post.body,
                post.posted_at
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e, "posts.title") {
                StoreError::Conflict(format!("post title {:?} already used", post.title))
            } else {
                StoreError::Sql(e)
            }
        })?;

        let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
        let stored = conn.query_row(&sql, params![post.id], post_from_row)?;
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
