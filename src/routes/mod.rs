pub mod assets;
pub mod auth;
pub mod home;
pub mod posts;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The complete site.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::index))
        .route("/about", get(home::about))
        .route("/contact", get(home::contact))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(posts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
