use moka::sync::Cache;
use std::sync::Arc;

use crate::clients::auth_client::AuthGateway;
use crate::config::Config;
use crate::db::docstore::DocumentStore;
use crate::services::access_service;
use crate::ws::registry::RoomRegistry;

/// Everything the handlers share, assembled once in `main` and injected
/// through axum state. Tests build their own with in-memory collaborators.
pub struct AppState {
    pub config: Config,
    pub auth: Arc<dyn AuthGateway>,
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<RoomRegistry>,
    pub membership: Cache<String, bool>,
}

impl AppState {
    pub fn new(config: Config, auth: Arc<dyn AuthGateway>, store: Arc<dyn DocumentStore>) -> Self {
        let membership = access_service::build_membership_cache(config.membership_cache_ttl());
        Self {
            config,
            auth,
            store,
            registry: Arc::new(RoomRegistry::new()),
            membership,
        }
    }
}
