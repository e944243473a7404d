use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::flash::FlashMessage;
use crate::db::models::Post;
use crate::error::AppResult;
use crate::extractors::{Flash, MaybeUser};
use crate::posts;
use crate::state::AppState;

const HOME_INTRO: &str = "Stories, notes and half-finished thoughts from everyone who writes here. \
Sign up or log in with Google or Facebook to publish your own.";

const ABOUT_TEXT: &str = "This is a small community blog. Every member can publish posts under \
their own name; titles only have to be unique among a writer's own posts.";

const CONTACT_TEXT: &str = "Found a problem or want a post taken down? Get in touch with the \
site administrator and include the link to the post in question.";

/// A post as listed on the home page.
pub struct PostCard {
    pub post: Post,
    pub excerpt: String,
    pub owned: bool,
}

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub viewer: Option<String>,
    pub flash: Option<FlashMessage>,
    pub intro: &'static str,
    pub posts: Vec<PostCard>,
}

#[derive(Template)]
#[template(path = "pages/static.html")]
pub struct StaticPageTemplate {
    pub viewer: Option<String>,
    pub flash: Option<FlashMessage>,
    pub heading: &'static str,
    pub body: &'static str,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET /: every post, oldest first.
pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    mut flash: Flash,
) -> AppResult<Response> {
    let viewer_id = maybe_user.id();
    let cards = state
        .posts
        .list()
        .await?
        .into_iter()
        .map(|post| PostCard {
            excerpt: posts::excerpt(&post.body),
            owned: viewer_id == Some(post.user_id.as_str()),
            post,
        })
        .collect();

    let page = HomeTemplate {
        viewer: maybe_user.display_name(),
        flash: flash.take(),
        intro: HOME_INTRO,
        posts: cards,
    };
    Ok((flash, Html(page)).into_response())
}

/// GET /about
pub async fn about(maybe_user: MaybeUser) -> Html<StaticPageTemplate> {
    Html(StaticPageTemplate {
        viewer: maybe_user.display_name(),
        flash: None,
        heading: "About",
        body: ABOUT_TEXT,
    })
}

/// GET /contact
pub async fn contact(maybe_user: MaybeUser) -> Html<StaticPageTemplate> {
    Html(StaticPageTemplate {
        viewer: maybe_user.display_name(),
        flash: None,
        heading: "Contact",
        body: CONTACT_TEXT,
    })
}
