use axum::routing::get;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login_submit))
        .route("/signup", get(handlers::signup_page).post(handlers::signup_submit))
        .route("/logout", get(handlers::logout))
        .route("/auth/{provider}", get(handlers::oauth_start))
        .route("/auth/{provider}/blogpost", get(handlers::oauth_callback))
}
