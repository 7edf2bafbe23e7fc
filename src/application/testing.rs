// In-memory fakes of the application ports for tests
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::home_assistant_repository::HomeAssistantRepository;
use crate::application::rasterizer::{RasterOptions, RasterizeError, Rasterizer};
use crate::domain::dashboard::{DashboardConfig, DashboardDefinition, LayoutDefinition, PageDefinition};
use crate::domain::home_assistant::{CalendarEvent, EntityState, ServiceCallResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FakeHomeAssistant {
    pub states: HashMap<String, EntityState>,
    pub calendars: HashMap<String, Vec<CalendarEvent>>,
    pub services: HashMap<String, Value>,
    pub failing: HashSet<String>,
    pub calendar_requests: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
}

impl FakeHomeAssistant {
    pub fn with_state(mut self, entity_id: &str, state: &str) -> Self {
        self.states.insert(entity_id.to_string(), entity_state(entity_id, state));
        self
    }

    pub fn with_calendar(mut self, calendar_id: &str, events: Vec<CalendarEvent>) -> Self {
        self.calendars.insert(calendar_id.to_string(), events);
        self
    }

    pub fn with_service(mut self, domain: &str, service: &str, response: Value) -> Self {
        self.services.insert(format!("{domain}.{service}"), response);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

pub fn entity_state(entity_id: &str, state: &str) -> EntityState {
    let changed = DateTime::parse_from_rfc3339("2024-05-01T08:00:00+00:00").unwrap();
    EntityState {
        entity_id: entity_id.to_string(),
        state: state.to_string(),
        attributes: Map::new(),
        last_changed: changed,
        last_updated: changed,
    }
}

#[async_trait]
impl HomeAssistantRepository for FakeHomeAssistant {
    async fn get_state(&self, entity_id: &str) -> anyhow::Result<EntityState> {
        if self.failing.contains(entity_id) {
            anyhow::bail!("entity {} unavailable", entity_id);
        }
        self.states
            .get(entity_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown entity {}", entity_id))
    }

    async fn get_calendar(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        self.calendar_requests
            .lock()
            .unwrap()
            .push((calendar_id.to_string(), start, end));
        if self.failing.contains(calendar_id) {
            anyhow::bail!("calendar {} unavailable", calendar_id);
        }
        Ok(self.calendars.get(calendar_id).cloned().unwrap_or_default())
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &Value,
        return_response: bool,
    ) -> anyhow::Result<ServiceCallResult> {
        let key = format!("{domain}.{service}");
        if self.failing.contains(&key) {
            anyhow::bail!("service {} failed", key);
        }
        if return_response {
            let response = self.services.get(&key).cloned().unwrap_or(Value::Null);
            Ok(ServiceCallResult::Response(serde_json::json!({
                "request": data,
                "response": response,
            })))
        } else {
            Ok(ServiceCallResult::ChangedStates(Vec::new()))
        }
    }
}

#[derive(Default)]
pub struct FakeDashboards {
    pub dashboards: HashMap<String, DashboardDefinition>,
}

impl FakeDashboards {
    pub fn with(mut self, dashboard: DashboardDefinition) -> Self {
        self.dashboards.insert(dashboard.config.name.clone(), dashboard);
        self
    }
}

#[async_trait]
impl DashboardRepository for FakeDashboards {
    async fn load_config(&self, name: &str) -> anyhow::Result<Option<DashboardConfig>> {
        Ok(self.dashboards.get(name).map(|d| d.config.clone()))
    }

    async fn load(&self, name: &str) -> anyhow::Result<Option<DashboardDefinition>> {
        Ok(self.dashboards.get(name).cloned())
    }
}

/// Builds a dashboard from a config document plus `(file name, body)` pages
pub fn dashboard(config: &str, layout: &str, pages: &[(&str, &str)]) -> DashboardDefinition {
    let config: DashboardConfig = toml::from_str(config).unwrap();
    let pages = pages
        .iter()
        .enumerate()
        .map(|(index, (file, body))| PageDefinition {
            index,
            name: file.rsplit_once('.').map_or(*file, |(stem, _)| stem).to_string(),
            body: body.to_string(),
            vars: Map::new(),
        })
        .collect();
    DashboardDefinition {
        config,
        layout: LayoutDefinition {
            body: layout.to_string(),
            vars: Map::new(),
        },
        pages,
    }
}

/// Rasterizer that paints a solid image of the requested size
#[derive(Default)]
pub struct FakeRasterizer {
    pub fail: bool,
    pub delay: Option<Duration>,
    pub seen: Mutex<Vec<String>>,
}

impl FakeRasterizer {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        html: String,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterizeError> {
        self.seen.lock().unwrap().push(html);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RasterizeError::EmptyOutput);
        }
        let image = image::RgbImage::from_pixel(options.width, options.height, image::Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| RasterizeError::Io(std::io::Error::other(e)))?;
        Ok(out.into_inner())
    }
}
