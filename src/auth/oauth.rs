//! Sign-in through Google and Facebook.
//!
//! The browser is sent to the provider with a random CSRF `state` and a PKCE
//! challenge; both are remembered in [`OAuthStateStore`] until the provider
//! redirects back to `/auth/{provider}/blogpost`. The callback trades the
//! code for an access token, fetches the profile, and normalises it into an
//! [`ExternalIdentity`] before the identity store sees it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use thiserror::Error;

use crate::config::OAuthConfig;
use crate::db::models::User;
use crate::store::users::UserRepository;
use crate::store::StoreError;

const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Facebook => "Facebook",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile data as each provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderProfile {
    Google {
        id: String,
        given_name: String,
        family_name: String,
    },
    Facebook {
        id: String,
        display_name: String,
    },
}

/// A provider account reduced to what the identity store keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: Provider,
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
}

/// Split a display name at the first run of whitespace.
fn split_display_name(name: &str) -> (String, String) {
    match name.trim().split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}

impl From<ProviderProfile> for ExternalIdentity {
    fn from(profile: ProviderProfile) -> Self {
        let (provider, external_id, first_name, last_name) = match profile {
            ProviderProfile::Google {
                id,
                given_name,
                family_name,
            } => (
                Provider::Google,
                id,
                given_name.trim().to_string(),
                family_name.trim().to_string(),
            ),
            ProviderProfile::Facebook { id, display_name } => {
                let (first, last) = split_display_name(&display_name);
                (Provider::Facebook, id, first, last)
            }
        };

        ExternalIdentity {
            provider,
            external_id,
            first_name: if first_name.is_empty() {
                provider.label().to_string()
            } else {
                first_name
            },
            last_name,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} sign-in is not configured")]
    NotConfigured(Provider),

    #[error("Sign-in request expired or was not started here")]
    InvalidState,

    #[error("Provider denied the request: {0}")]
    Denied(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Could not read profile: {0}")]
    Profile(String),
}

/// Where to send the browser, and what to remember until it comes back.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn authorize(&self) -> PendingAuthorization;

    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, ProviderError>;
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

struct Endpoints {
    auth_url: &'static str,
    token_url: &'static str,
    profile_url: &'static str,
    scopes: &'static [&'static str],
}

fn endpoints(provider: Provider) -> Endpoints {
    match provider {
        Provider::Google => Endpoints {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            profile_url: "https://www.googleapis.com/oauth2/v3/userinfo",
            scopes: &["profile"],
        },
        Provider::Facebook => Endpoints {
            auth_url: "https://www.facebook.com/v19.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
            profile_url: "https://graph.facebook.com/me?fields=id,name",
            scopes: &["public_profile"],
        },
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookMe {
    id: String,
    name: Option<String>,
}

fn google_profile(info: GoogleUserInfo) -> ProviderProfile {
    let (fallback_given, fallback_family) = split_display_name(info.name.as_deref().unwrap_or(""));
    ProviderProfile::Google {
        id: info.sub,
        given_name: info.given_name.unwrap_or(fallback_given),
        family_name: info.family_name.unwrap_or(fallback_family),
    }
}

/// Authorization-code flow against a real provider.
pub struct OAuth2Provider {
    provider: Provider,
    client: ConfiguredClient,
    http: reqwest::Client,
}

impl OAuth2Provider {
    pub fn new(
        provider: Provider,
        client_id: &str,
        client_secret: &str,
        redirect_url: String,
    ) -> anyhow::Result<Self> {
        let endpoints = endpoints(provider);
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(AuthUrl::new(endpoints.auth_url.to_string())?)
            .set_token_uri(TokenUrl::new(endpoints.token_url.to_string())?)
            .set_redirect_uri(RedirectUrl::new(redirect_url)?);

        // Token and profile endpoints are never followed through redirects.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            provider,
            client,
            http,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let response = self
            .http
            .get(endpoints(self.provider).profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        match self.provider {
            Provider::Google => {
                let info: GoogleUserInfo = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Profile(e.to_string()))?;
                Ok(google_profile(info))
            }
            Provider::Facebook => {
                let me: FacebookMe = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Profile(e.to_string()))?;
                Ok(ProviderProfile::Facebook {
                    id: me.id,
                    display_name: me.name.unwrap_or_default(),
                })
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for OAuth2Provider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn authorize(&self) -> PendingAuthorization {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in endpoints(self.provider).scopes {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, csrf_state) = request.set_pkce_challenge(pkce_challenge).url();

        PendingAuthorization {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        self.fetch_profile(token.access_token().secret()).await
    }
}

/// The identity providers this server offers.
#[derive(Clone, Default)]
pub struct Providers {
    google: Option<Arc<dyn IdentityProvider>>,
    facebook: Option<Arc<dyn IdentityProvider>>,
}

impl Providers {
    pub fn from_config(config: &OAuthConfig) -> anyhow::Result<Self> {
        let mut providers = Self::default();
        for provider in [Provider::Google, Provider::Facebook] {
            if let Some((id, secret)) = config.credentials(provider) {
                let client =
                    OAuth2Provider::new(provider, id, secret, config.redirect_url(provider))?;
                providers = providers.with(Arc::new(client));
                tracing::info!("{} sign-in enabled", provider.label());
            }
        }
        Ok(providers)
    }

    pub fn with(mut self, client: Arc<dyn IdentityProvider>) -> Self {
        match client.provider() {
            Provider::Google => self.google = Some(client),
            Provider::Facebook => self.facebook = Some(client),
        }
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn IdentityProvider>> {
        match provider {
            Provider::Google => self.google.clone(),
            Provider::Facebook => self.facebook.clone(),
        }
    }

    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.get(provider).is_some()
    }
}

struct PendingLogin {
    provider: Provider,
    pkce_verifier: String,
    created: Instant,
}

/// Outstanding sign-in attempts keyed by CSRF state. Each entry is single-use
/// and expires after ten minutes.
pub struct OAuthStateStore {
    pending: HashMap<String, PendingLogin>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    pub fn insert(&mut self, provider: Provider, csrf_state: String, pkce_verifier: String) {
        self.clear_stale();
        self.pending.insert(
            csrf_state,
            PendingLogin {
                provider,
                pkce_verifier,
                created: Instant::now(),
            },
        );
    }

    /// Remove the entry for `csrf_state` and return its PKCE verifier if it
    /// belongs to `provider` and has not expired.
    pub fn take(&mut self, provider: Provider, csrf_state: &str) -> Option<String> {
        let pending = self.pending.remove(csrf_state)?;
        if pending.provider != provider || pending.created.elapsed() > STATE_TTL {
            return None;
        }
        Some(pending.pkce_verifier)
    }

    fn clear_stale(&mut self) {
        self.pending
            .retain(|_, pending| pending.created.elapsed() <= STATE_TTL);
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a provider profile to a local user, creating one on first sign-in.
pub async fn authenticate_oauth(
    users: &dyn UserRepository,
    profile: ProviderProfile,
) -> Result<User, StoreError> {
    let identity = ExternalIdentity::from(profile);
    users.find_or_create_external(&identity).await
}
