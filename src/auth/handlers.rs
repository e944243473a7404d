use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::flash::{redirect_with_flash, FlashMessage};
use crate::auth::local::{self, LoginError, LoginForm, RegisterError, SignupForm};
use crate::auth::oauth::{self, Provider, ProviderError};
use crate::auth::session;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, Flash, MaybeUser};
use crate::routes::home::Html;
use crate::state::AppState;
use crate::store::StoreError;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub viewer: Option<String>,
    pub flash: Option<FlashMessage>,
    pub google_enabled: bool,
    pub facebook_enabled: bool,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub viewer: Option<String>,
    pub flash: Option<FlashMessage>,
    pub google_enabled: bool,
    pub facebook_enabled: bool,
}

// -- Request types --

#[derive(Deserialize)]
pub struct LoginQuery {
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

const LOGIN_FAILED: &str = "Incorrect email or password";

/// Create a session for `user_id` and redirect with the session cookie set.
fn start_session(state: &AppState, user_id: &str, location: &str) -> AppResult<Response> {
    let auth = &state.config.auth;
    let token = session::create_session(&state.db, user_id, auth.session_hours)?;

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (
                header::SET_COOKIE,
                session::session_cookie(&auth.cookie_name, &token, auth.session_hours),
            ),
        ],
    )
        .into_response())
}

// -- Local accounts --

/// GET /login: render the login form, with any flash or `?message=`.
pub async fn login_page(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Query(query): Query<LoginQuery>,
    mut flash: Flash,
) -> AppResult<Response> {
    let message = flash.take().or_else(|| {
        query
            .message
            .filter(|m| !m.trim().is_empty())
            .map(FlashMessage::info)
    });

    let page = LoginTemplate {
        viewer: maybe_user.display_name(),
        flash: message,
        google_enabled: state.providers.is_enabled(Provider::Google),
        facebook_enabled: state.providers.is_enabled(Provider::Facebook),
    };
    Ok((flash, Html(page)).into_response())
}

/// POST /login: check credentials and start a session.
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    match local::authenticate_local(state.users.as_ref(), &form.username, &form.password).await {
        Ok(user) => {
            tracing::info!("{} ({}) logged in", user.full_name(), user.id);
            start_session(&state, &user.id, "/compose")
        }
        Err(e @ (LoginError::UserNotFound | LoginError::InvalidCredential)) => {
            tracing::warn!("Failed login for {}: {}", form.username.trim(), e);
            Ok(redirect_with_flash(&state, "/login", FlashMessage::error(LOGIN_FAILED)).await)
        }
        Err(LoginError::Hash(msg)) => Err(AppError::Internal(msg)),
        Err(LoginError::Store(e)) => Err(e.into()),
    }
}

/// GET /signup
pub async fn signup_page(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    mut flash: Flash,
) -> AppResult<Response> {
    let page = SignupTemplate {
        viewer: maybe_user.display_name(),
        flash: flash.take(),
        google_enabled: state.providers.is_enabled(Provider::Google),
        facebook_enabled: state.providers.is_enabled(Provider::Facebook),
    };
    Ok((flash, Html(page)).into_response())
}

/// POST /signup: create a local account and sign it in.
pub async fn signup_submit(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let cost = state.config.auth.bcrypt_cost;
    match local::register_local(state.users.as_ref(), &form, cost).await {
        Ok(user) => {
            tracing::info!("New account {} for {}", user.id, form.username.trim());
            start_session(&state, &user.id, "/compose")
        }
        Err(e @ (RegisterError::Validation(_) | RegisterError::DuplicateUser)) => {
            Ok(redirect_with_flash(&state, "/signup", FlashMessage::error(e.to_string())).await)
        }
        Err(RegisterError::Hash(msg)) => Err(AppError::Internal(msg)),
        Err(RegisterError::Store(e)) => Err(e.into()),
    }
}

/// GET /logout: delete the session and go home.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = cookie_value(&headers, cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, session::clear_session_cookie(cookie_name)),
        ],
    )
        .into_response())
}

// -- OAuth --

/// GET /auth/{provider}: send the browser to the provider's consent page.
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<Provider>,
) -> AppResult<Response> {
    let Some(client) = state.providers.get(provider) else {
        let message = ProviderError::NotConfigured(provider).to_string();
        return Ok(redirect_with_flash(&state, "/login", FlashMessage::error(message)).await);
    };

    let pending = client.authorize();
    state
        .oauth_states
        .lock()
        .await
        .insert(provider, pending.csrf_state, pending.pkce_verifier);

    Ok(Redirect::to(&pending.url).into_response())
}

enum CallbackError {
    Provider(ProviderError),
    Store(StoreError),
}

impl From<ProviderError> for CallbackError {
    fn from(e: ProviderError) -> Self {
        CallbackError::Provider(e)
    }
}

impl From<StoreError> for CallbackError {
    fn from(e: StoreError) -> Self {
        CallbackError::Store(e)
    }
}

async fn complete_oauth(
    state: &AppState,
    provider: Provider,
    query: CallbackQuery,
) -> Result<User, CallbackError> {
    if let Some(reason) = query.error {
        return Err(ProviderError::Denied(reason).into());
    }

    let client = state
        .providers
        .get(provider)
        .ok_or(ProviderError::NotConfigured(provider))?;

    let csrf_state = query.state.ok_or(ProviderError::InvalidState)?;
    let verifier = state
        .oauth_states
        .lock()
        .await
        .take(provider, &csrf_state)
        .ok_or(ProviderError::InvalidState)?;

    let code = query
        .code
        .ok_or_else(|| ProviderError::Exchange("missing authorization code".into()))?;

    let profile = client.exchange(&code, &verifier).await?;
    Ok(oauth::authenticate_oauth(state.users.as_ref(), profile).await?)
}

/// GET /auth/{provider}/blogpost: provider callback.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<Provider>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    match complete_oauth(&state, provider, query).await {
        Ok(user) => {
            tracing::info!(
                "{} ({}) signed in with {}",
                user.full_name(),
                user.id,
                provider.label()
            );
            start_session(&state, &user.id, "/compose")
        }
        Err(CallbackError::Provider(e)) => {
            tracing::warn!("{} sign-in failed: {}", provider.label(), e);
            let message = format!("{} sign-in failed. Please try again.", provider.label());
            Ok(redirect_with_flash(&state, "/login", FlashMessage::error(message)).await)
        }
        Err(CallbackError::Store(e)) => Err(e.into()),
    }
}
