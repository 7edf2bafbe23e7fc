// Render context and output formats
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::dashboard::{DashboardDefinition, PageDefinition};
use super::home_assistant::HomeAssistantData;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRenderData {
    pub index: usize,
    pub name: String,
    pub vars: Map<String, Value>,
}

impl From<&PageDefinition> for PageRenderData {
    fn from(page: &PageDefinition) -> Self {
        Self {
            index: page.index,
            name: page.name.clone(),
            vars: page.vars.clone(),
        }
    }
}

/// Everything a dashboard template can see. Built fresh for each request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    pub dashboard: String,
    pub width: u32,
    pub height: u32,
    pub page_index: usize,
    pub page_count: usize,
    pub page: PageRenderData,
    pub pages: Vec<PageRenderData>,
    pub vars: Map<String, Value>,
    /// RFC 3339, in the display timezone
    pub now: String,
    pub home_assistant: HomeAssistantData,
}

impl RenderContext {
    /// Returns `None` when `page_index` is not a page of the dashboard
    pub fn new(
        dashboard: &DashboardDefinition,
        page_index: usize,
        now: String,
        home_assistant: HomeAssistantData,
    ) -> Option<Self> {
        let page = dashboard.page(page_index)?;
        Some(Self {
            dashboard: dashboard.config.name.clone(),
            width: dashboard.config.width,
            height: dashboard.config.height,
            page_index,
            page_count: dashboard.page_count(),
            page: page.into(),
            pages: dashboard.pages.iter().map(PageRenderData::from).collect(),
            vars: dashboard.layout.vars.clone(),
            now,
            home_assistant,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported format: {0}")]
pub struct UnsupportedFormat(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Html,
    Png,
    Jpeg,
    Bmp,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Html => "text/html; charset=utf-8",
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Bmp => "image/bmp",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, OutputFormat::Html)
    }
}

impl FromStr for OutputFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "html" => Ok(OutputFormat::Html),
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "bmp" => Ok(OutputFormat::Bmp),
            other => Err(UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Html => "html",
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Bmp => "bmp",
        };
        f.write_str(name)
    }
}
