use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

use crate::auth::oauth::Provider;

#[derive(Parser, Debug)]
#[command(name = "blogpost", about = "A small multi-user blog")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub oauth: OAuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub bcrypt_cost: u32,
}

/// OAuth client credentials. A provider is offered on the login page only
/// when both its id and secret are present.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OAuthConfig {
    /// Public origin the providers redirect back to.
    pub callback_base: String,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub facebook_client_id: Option<String>,
    pub facebook_client_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "blogpost_session".to_string(),
            session_hours: 720,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            callback_base: "http://localhost:3000".to_string(),
            google_client_id: None,
            google_client_secret: None,
            facebook_client_id: None,
            facebook_client_secret: None,
        }
    }
}

impl OAuthConfig {
    /// `(client_id, client_secret)` for `provider`, if fully configured.
    pub fn credentials(&self, provider: Provider) -> Option<(&str, &str)> {
        let (id, secret) = match provider {
            Provider::Google => (&self.google_client_id, &self.google_client_secret),
            Provider::Facebook => (&self.facebook_client_id, &self.facebook_client_secret),
        };
        match (id.as_deref(), secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }

    /// Where `provider` sends the browser after consent.
    pub fn redirect_url(&self, provider: Provider) -> String {
        format!(
            "{}/auth/{}/blogpost",
            self.callback_base.trim_end_matches('/'),
            provider
        )
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("blogpost.db"));
        }

        Ok(config)
    }

    /// Overlay OAuth settings from the environment (`.env` included).
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let oauth = &mut self.oauth;
        let overrides: [(&str, &mut Option<String>); 4] = [
            ("GOOGLE_CLIENT_ID", &mut oauth.google_client_id),
            ("GOOGLE_CLIENT_SECRET", &mut oauth.google_client_secret),
            ("FACEBOOK_APP_ID", &mut oauth.facebook_client_id),
            ("FACEBOOK_APP_SECRET", &mut oauth.facebook_client_secret),
        ];
        for (key, slot) in overrides {
            if let Some(value) = var(key) {
                *slot = Some(value);
            }
        }
        if let Some(base) = var("CALLBACK_BASE_URL") {
            oauth.callback_base = base;
        }
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".blogpost")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("blogpost.db"))
    }
}
