pub mod api;
pub mod budget;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod generators;
pub mod providers;
pub mod router;
pub mod store;

use crate::config::Config;
use crate::db::Database;
use crate::router::AiRouter;

use std::sync::Arc;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub router: Arc<AiRouter>,
}
