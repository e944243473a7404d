use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use blogpost::auth::oauth::{
    IdentityProvider, PendingAuthorization, Provider, ProviderError, ProviderProfile, Providers,
};
use blogpost::config::Config;
use blogpost::db;
use blogpost::routes;
use blogpost::state::AppState;

const PASSWORD: &str = "Secret1";

struct TestSite {
    app: Router,
    _dir: TempDir,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config
}

fn site_with(providers: Option<Providers>) -> TestSite {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut state = AppState::new(pool, test_config()).unwrap();
    if let Some(providers) = providers {
        state = state.with_providers(providers);
    }

    TestSite {
        app: routes::router(state),
        _dir: dir,
    }
}

fn site() -> TestSite {
    site_with(None)
}

impl TestSite {
    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookies: &[String]) -> Response {
        let mut builder = Request::builder().uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, fields: &[(&str, &str)], cookies: &[String]) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Sign up and return the session cookie pair.
    async fn signup(&self, first: &str, last: &str, email: &str) -> String {
        let response = self
            .post_form(
                "/signup",
                &[
                    ("firstName", first),
                    ("lastName", last),
                    ("username", email),
                    ("password", PASSWORD),
                ],
                &[],
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/compose");
        cookie(&response, "blogpost_session").expect("signup should set a session cookie")
    }

    async fn compose(&self, session: &str, title: &str, body: &str) -> Response {
        self.post_form(
            "/compose",
            &[("postTitle", title), ("postBody", body)],
            &[session.to_string()],
        )
        .await
    }

    /// Follow a flash redirect and return the rendered page.
    async fn follow(&self, response: &Response, session: Option<&str>) -> String {
        let mut cookies: Vec<String> = session.into_iter().map(str::to_string).collect();
        cookies.extend(cookie(response, "blogpost_flash"));
        body_text(self.get(&location(response), &cookies).await).await
    }
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` from the response's Set-Cookie headers, if set to a non-empty value.
fn cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.split_once('=')
                .is_some_and(|(k, v)| k == name && !v.is_empty())
        })
        .map(str::to_string)
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// -- Accounts --

#[tokio::test]
async fn signup_then_login_and_logout() {
    let site = site();
    let session = site.signup("Ada", "Lovelace", "ada@example.com").await;

    let page = body_text(site.get("/compose", &[session.clone()]).await).await;
    assert!(page.contains("Ada Lovelace"));

    let response = site.get("/logout", &[session.clone()]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    // The old session no longer works
    let response = site.get("/compose", &[session]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = site
        .post_form(
            "/login",
            &[("username", "ADA@example.com"), ("password", PASSWORD)],
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/compose");
    assert!(cookie(&response, "blogpost_session").is_some());
}

#[tokio::test]
async fn wrong_password_flashes_generic_error() {
    let site = site();
    site.signup("Ada", "Lovelace", "ada@example.com").await;

    for (username, password) in [("ada@example.com", "Wrong99"), ("nobody@example.com", PASSWORD)] {
        let response = site
            .post_form("/login", &[("username", username), ("password", password)], &[])
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
        assert!(cookie(&response, "blogpost_session").is_none());

        let page = site.follow(&response, None).await;
        assert!(page.contains("Incorrect email or password"));
    }
}

#[tokio::test]
async fn duplicate_signup_is_rejected() {
    let site = site();
    site.signup("Ada", "Lovelace", "ada@example.com").await;

    let response = site
        .post_form(
            "/signup",
            &[
                ("firstName", "Other"),
                ("lastName", "Person"),
                ("username", "Ada@Example.com"),
                ("password", PASSWORD),
            ],
            &[],
        )
        .await;
    assert_eq!(location(&response), "/signup");
    assert!(cookie(&response, "blogpost_session").is_none());
}

#[tokio::test]
async fn weak_password_is_rejected_with_message() {
    let site = site();
    let response = site
        .post_form(
            "/signup",
            &[
                ("firstName", "Ada"),
                ("lastName", "Lovelace"),
                ("username", "ada@example.com"),
                ("password", "abcdef1"),
            ],
            &[],
        )
        .await;
    assert_eq!(location(&response), "/signup");

    let page = site.follow(&response, None).await;
    assert!(page.contains("uppercase"));
}

#[tokio::test]
async fn flash_is_shown_once() {
    let site = site();
    let response = site
        .post_form(
            "/login",
            &[("username", "nobody@example.com"), ("password", PASSWORD)],
            &[],
        )
        .await;
    let flash = cookie(&response, "blogpost_flash").unwrap();

    let first = site.get("/login", &[flash.clone()]).await;
    let cleared = first
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().unwrap().starts_with("blogpost_flash=;"));
    assert!(cleared);
    assert!(body_text(first).await.contains("Incorrect email or password"));

    let second = body_text(site.get("/login", &[flash]).await).await;
    assert!(!second.contains("Incorrect email or password"));
}

#[tokio::test]
async fn anonymous_users_are_sent_to_login() {
    let site = site();

    let response = site.get("/compose", &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = site
        .post_form(
            "/compose",
            &[("postTitle", "Anonymous Scribble"), ("postBody", "x")],
            &[],
        )
        .await;
    assert_eq!(location(&response), "/login");

    let home = body_text(site.get("/", &[]).await).await;
    assert!(!home.contains("Anonymous Scribble"));

    let response = site.post_form("/delete-post", &[("postId", "x")], &[]).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn static_pages_and_assets_render() {
    let site = site();
    for uri in ["/", "/about", "/contact", "/login", "/signup"] {
        let response = site.get(uri, &[]).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
    }

    let response = site.get("/assets/css/site.css", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Posts --

#[tokio::test]
async fn composed_post_is_listed_and_viewable() {
    let site = site();
    let session = site.signup("Ada", "Lovelace", "ada@example.com").await;

    let response = site.compose(&session, "First Post", "Hello, world").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let home = body_text(site.get("/", &[]).await).await;
    assert!(home.contains("First Post"));
    assert!(home.contains("Ada Lovelace"));
    assert!(home.contains("Read More"));

    let slug = home
        .split("href=\"/posts/")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_string();
    assert!(slug.starts_with("first-post-"));

    let page = body_text(site.get(&format!("/posts/{}", slug), &[]).await).await;
    assert!(page.contains("Hello, world"));
    assert!(page.contains("Posted by Ada Lovelace"));
}

#[tokio::test]
async fn post_can_be_viewed_by_id_in_any_case() {
    let site = site();
    let session = site.signup("Ada", "Lovelace", "ada@example.com").await;
    site.compose(&session, "By Id", "body text").await;

    let compose = body_text(site.get("/", &[session]).await).await;
    let id = compose
        .split("name=\"postId\" value=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_string();

    for key in [id.clone(), id.to_uppercase()] {
        let response = site.get(&format!("/posts/{}", key), &[]).await;
        assert_eq!(response.status(), StatusCode::OK, "GET /posts/{}", key);
    }
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let site = site();
    let response = site.get("/posts/does-not-exist", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_title_is_rejected_per_author() {
    let site = site();
    let ada = site.signup("Ada", "Lovelace", "ada@example.com").await;
    let grace = site.signup("Grace", "Hopper", "grace@example.com").await;

    site.compose(&ada, "Notes", "one").await;

    let response = site.compose(&ada, "notes", "two").await;
    assert_eq!(location(&response), "/compose");
    let page = site.follow(&response, Some(&ada)).await;
    assert!(page.contains("already have a post with that title"));

    let response = site.compose(&grace, "Notes", "three").await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn only_the_author_can_delete() {
    let site = site();
    let ada = site.signup("Ada", "Lovelace", "ada@example.com").await;
    let grace = site.signup("Grace", "Hopper", "grace@example.com").await;

    site.compose(&ada, "Mine", "keep out").await;
    let home = body_text(site.get("/", &[ada.clone()]).await).await;
    let id = home
        .split("name=\"postId\" value=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_string();

    // Grace sees no delete button and is refused
    let grace_home = body_text(site.get("/", &[grace.clone()]).await).await;
    assert!(!grace_home.contains("name=\"postId\""));
    let response = site.post_form("/delete-post", &[("postId", id.as_str())], &[grace]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = site
        .post_form("/delete-post", &[("postId", id.as_str())], &[ada.clone()])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let home = site.follow(&response, Some(&ada)).await;
    assert!(home.contains("Deleted"));
    assert!(!home.contains("keep out"));

    let response = site.post_form("/delete-post", &[("postId", id.as_str())], &[ada]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- OAuth --

struct FakeGoogle;

#[async_trait]
impl IdentityProvider for FakeGoogle {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorize(&self) -> PendingAuthorization {
        let csrf_state = uuid::Uuid::now_v7().simple().to_string();
        PendingAuthorization {
            url: format!("https://accounts.example.test/authorize?state={}", csrf_state),
            csrf_state,
            pkce_verifier: "verifier".to_string(),
        }
    }

    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        if code != "good-code" || pkce_verifier != "verifier" {
            return Err(ProviderError::Exchange("bad code".into()));
        }
        Ok(ProviderProfile::Google {
            id: "g-123".to_string(),
            given_name: "Grace".to_string(),
            family_name: "Hopper".to_string(),
        })
    }
}

fn oauth_site() -> TestSite {
    site_with(Some(Providers::default().with(Arc::new(FakeGoogle))))
}

async fn start_google(site: &TestSite) -> String {
    let response = site.get("/auth/google", &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let url = url::Url::parse(&location(&response)).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test]
async fn oauth_callback_signs_user_in() {
    let site = oauth_site();

    let login = body_text(site.get("/login", &[]).await).await;
    assert!(login.contains("/auth/google"));
    assert!(!login.contains("/auth/facebook"));

    let state = start_google(&site).await;
    let response = site
        .get(
            &format!("/auth/google/blogpost?code=good-code&state={}", state),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/compose");

    let session = cookie(&response, "blogpost_session").unwrap();
    let page = body_text(site.get("/compose", &[session]).await).await;
    assert!(page.contains("Grace Hopper"));
}

#[tokio::test]
async fn oauth_state_is_single_use() {
    let site = oauth_site();
    let state = start_google(&site).await;
    let callback = format!("/auth/google/blogpost?code=good-code&state={}", state);

    let first = site.get(&callback, &[]).await;
    assert_eq!(location(&first), "/compose");

    let second = site.get(&callback, &[]).await;
    assert_eq!(location(&second), "/login");
    assert!(cookie(&second, "blogpost_session").is_none());
    let page = site.follow(&second, None).await;
    assert!(page.contains("Google sign-in failed"));
}

#[tokio::test]
async fn oauth_denied_and_unconfigured_go_back_to_login() {
    let site = oauth_site();

    let response = site
        .get("/auth/google/blogpost?error=access_denied", &[])
        .await;
    assert_eq!(location(&response), "/login");

    let response = site.get("/auth/facebook", &[]).await;
    assert_eq!(location(&response), "/login");
    assert!(cookie(&response, "blogpost_flash").is_some());
}

#[tokio::test]
async fn repeat_oauth_login_reuses_account() {
    let site = oauth_site();

    for _ in 0..2 {
        let state = start_google(&site).await;
        let response = site
            .get(
                &format!("/auth/google/blogpost?code=good-code&state={}", state),
                &[],
            )
            .await;
        let session = cookie(&response, "blogpost_session").unwrap();
        site.compose(&session, "Same Title", "body").await;
    }

    // Same account both times, so the second post collided on title
    let home = body_text(site.get("/", &[]).await).await;
    assert_eq!(home.matches("Same Title").count(), 1);
}
