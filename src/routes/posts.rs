use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::flash::{redirect_with_flash, FlashMessage};
use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Flash, MaybeUser};
use crate::posts;
use crate::routes::home::Html;
use crate::state::AppState;
use crate::store::posts::PostRepository;
use crate::store::StoreError;

#[derive(Template)]
#[template(path = "pages/compose.html")]
pub struct ComposeTemplate {
    pub viewer: Option<String>,
    pub flash: Option<FlashMessage>,
    pub my_posts: Vec<Post>,
}

#[derive(Template)]
#[template(path = "pages/post.html")]
pub struct PostTemplate {
    pub viewer: Option<String>,
    pub flash: Option<FlashMessage>,
    pub post: Post,
    pub can_delete: bool,
}

#[derive(Debug, Deserialize)]
pub struct ComposeForm {
    #[serde(rename = "postTitle")]
    pub title: String,
    #[serde(rename = "postBody")]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    #[serde(rename = "postId")]
    pub post_id: String,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Please give your post a title")]
    EmptyTitle,

    #[error("Error: you already have a post with that title")]
    DuplicateTitle,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Publish a post for `author`. Titles are unique per author, ignoring case.
pub async fn compose_post(
    store: &dyn PostRepository,
    author: &CurrentUser,
    form: &ComposeForm,
    now: &NaiveDateTime,
) -> Result<Post, ComposeError> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(ComposeError::EmptyTitle);
    }

    if store.title_taken(&author.id, title).await? {
        return Err(ComposeError::DuplicateTitle);
    }

    let new_post = posts::draft(&author.id, &author.display_name(), title, &form.body, now);
    match store.insert(&new_post).await {
        Ok(post) => Ok(post),
        Err(StoreError::Conflict(_)) => Err(ComposeError::DuplicateTitle),
        Err(e) => Err(e.into()),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/compose", get(compose_page).post(compose_submit))
        .route("/posts/{post_id}", get(view_post))
        .route("/delete-post", post(delete_post))
}

/// GET /compose: the editor, plus the author's existing posts.
async fn compose_page(
    State(state): State<AppState>,
    user: CurrentUser,
    mut flash: Flash,
) -> AppResult<Response> {
    let my_posts = state.posts.list_by_author(&user.id).await?;

    let page = ComposeTemplate {
        viewer: Some(user.display_name()),
        flash: flash.take(),
        my_posts,
    };
    Ok((flash, Html(page)).into_response())
}

/// POST /compose
async fn compose_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<ComposeForm>,
) -> AppResult<Response> {
    let now = chrono::Local::now().naive_local();
    match compose_post(state.posts.as_ref(), &user, &form, &now).await {
        Ok(post) => {
            tracing::info!("User {} published post {} ({})", user.id, post.id, post.slug);
            Ok(Redirect::to("/").into_response())
        }
        Err(e @ (ComposeError::EmptyTitle | ComposeError::DuplicateTitle)) => {
            Ok(redirect_with_flash(&state, "/compose", FlashMessage::error(e.to_string())).await)
        }
        Err(ComposeError::Store(e)) => Err(e.into()),
    }
}

/// GET /posts/{post_id}: by slug, or by id in any case.
async fn view_post(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(post_id): Path<String>,
) -> AppResult<Response> {
    let post = state.posts.find(&post_id).await?.ok_or(AppError::NotFound)?;

    let page = PostTemplate {
        can_delete: maybe_user.id() == Some(post.user_id.as_str()),
        viewer: maybe_user.display_name(),
        flash: None,
        post,
    };
    Ok(Html(page).into_response())
}

/// POST /delete-post: only the author may delete a post.
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<DeleteForm>,
) -> AppResult<Response> {
    let post = state
        .posts
        .find(&form.post_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if post.user_id != user.id {
        tracing::warn!(
            "User {} tried to delete post {} owned by {}",
            user.id,
            post.id,
            post.user_id
        );
        return Err(AppError::Forbidden);
    }

    state.posts.delete(&post.id).await?;
    tracing::info!("User {} deleted post {}", user.id, post.id);

    Ok(redirect_with_flash(&state, "/", FlashMessage::info(format!("Deleted \"{}\"", post.title))).await)
}
