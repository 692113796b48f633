use std::sync::Arc;

use async_trait::async_trait;

use crate::application::likes::LikeCounterService;
use crate::infra::db::PostgresRepositories;

/// Liveness check for the authoritative store.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

#[async_trait]
impl HealthCheck for PostgresRepositories {
    async fn check(&self) -> Result<(), String> {
        self.health_check().await.map_err(|err| err.to_string())
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub likes: Arc<LikeCounterService>,
    pub health: Arc<dyn HealthCheck>,
}
