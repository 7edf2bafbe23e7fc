// Repository trait for Home Assistant data access
use crate::domain::home_assistant::{CalendarEvent, EntityState, ServiceCallResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

#[async_trait]
pub trait HomeAssistantRepository: Send + Sync {
    /// Current state of a single entity
    async fn get_state(&self, entity_id: &str) -> anyhow::Result<EntityState>;

    /// Events of one calendar overlapping `[start, end)`
    async fn get_calendar(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarEvent>>;

    /// Invoke `domain.service` with `data`. With `return_response` the
    /// backend answers with the service's own response object instead of
    /// the list of changed states.
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &Value,
        return_response: bool,
    ) -> anyhow::Result<ServiceCallResult>;
}
