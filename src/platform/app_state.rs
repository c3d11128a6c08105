use std::sync::Arc;

use reqwest::Client;

use crate::platform::{aliases::DbPool, config::AppConfig};

/// Shared state handed to every handler and background task.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: Client,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: AppConfig) -> Self {
        Self {
            db_pool,
            http_client: Client::new(),
            config: Arc::new(config),
        }
    }
}
