// Repository trait for dashboard definitions
use crate::domain::dashboard::{DashboardConfig, DashboardDefinition};
use async_trait::async_trait;

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Dashboard config only, enough for pagination. `None` if unknown.
    async fn load_config(&self, name: &str) -> anyhow::Result<Option<DashboardConfig>>;

    /// Config, base layout and every page body. `None` if unknown.
    async fn load(&self, name: &str) -> anyhow::Result<Option<DashboardDefinition>>;
}
