use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::auth::flash::FlashStore;
use crate::auth::oauth::{OAuthStateStore, Providers};
use crate::config::Config;
use crate::store::posts::{PostRepository, SqlitePostRepository};
use crate::store::users::{SqliteUserRepository, UserRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub flashes: Arc<Mutex<FlashStore>>,
    pub oauth_states: Arc<Mutex<OAuthStateStore>>,
    pub providers: Providers,
}

impl AppState {
    /// Wire the SQLite stores and any OAuth providers enabled in `config`.
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let providers = Providers::from_config(&config.oauth)?;
        Ok(Self {
            users: Arc::new(SqliteUserRepository::new(db.clone())),
            posts: Arc::new(SqlitePostRepository::new(db.clone())),
            flashes: Arc::new(Mutex::new(FlashStore::new())),
            oauth_states: Arc::new(Mutex::new(OAuthStateStore::new())),
            providers,
            db,
            config,
        })
    }

    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }
}
