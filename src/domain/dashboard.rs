// Dashboard definition: layout, pages and the live data they need
use serde::Deserialize;
use serde_json::{Map, Value};

use super::calendar::CalendarSpec;

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    480
}

fn default_quality() -> u8 {
    100
}

fn default_base() -> String {
    "base.html".to_string()
}

/// Contents of `<dashboard>/config.toml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashboardConfig {
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_base")]
    pub base: String,
    pub pages: Vec<String>,
    #[serde(default)]
    pub home_assistant: HomeAssistantRequirements,
}

impl DashboardConfig {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HomeAssistantRequirements {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub calendars: Vec<CalendarSpec>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl HomeAssistantRequirements {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.calendars.is_empty() && self.services.is_empty()
    }
}

/// Entity exposed to templates under `name`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub domain: String,
    pub service: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub return_response: bool,
}

/// Base layout body plus the dashboard-wide variables from its front matter
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDefinition {
    pub body: String,
    pub vars: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageDefinition {
    pub index: usize,
    /// File stem, the name the base layout can include the page by
    pub name: String,
    pub body: String,
    pub vars: Map<String, Value>,
}

/// Fully loaded dashboard, immutable for the duration of a render
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardDefinition {
    pub config: DashboardConfig,
    pub layout: LayoutDefinition,
    pub pages: Vec<PageDefinition>,
}

impl DashboardDefinition {
    pub fn page(&self, index: usize) -> Option<&PageDefinition> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
