//! Application state shared across routes

use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::config::Config;
use crate::matchmaking::LobbyService;
use crate::store::{MemoryUserStore, RestUserStore, UserStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn UserStore>,
    pub lobby: Arc<LobbyService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        // Initialize user store
        let store: Arc<dyn UserStore> = match (&config.user_store_url, &config.user_store_key) {
            (Some(url), Some(key)) => Arc::new(RestUserStore::new(url, key)),
            _ => {
                warn!("USER_STORE_URL not set, using in-memory user store");
                Arc::new(MemoryUserStore::open())
            }
        };

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn UserStore>) -> Self {
        let lobby = Arc::new(LobbyService::new(config.rules, store.clone()));

        Self {
            config: Arc::new(config),
            store,
            lobby,
            started_at: Instant::now(),
        }
    }
}
