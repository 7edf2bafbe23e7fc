// Render service - Pagination and the HTML/image render pipeline
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::fetch_service::DataFetchService;
use crate::application::rasterizer::{RasterOptions, RasterizeError, Rasterizer};
use crate::domain::pagination::{next_page_index, Action, PaginationError};
use crate::domain::render::{OutputFormat, RenderContext, UnsupportedFormat};
use crate::infrastructure::image_processor::{ImageError, ImageProcessor};
use crate::infrastructure::template_engine::{TemplateEngine, TemplateError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("dashboard {0} not found")]
    DashboardNotFound(String),
    #[error("dashboard {0} has no pages")]
    NoPages(String),
    #[error("invalid page index {0}")]
    InvalidPage(i64),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
    #[error("failed to load dashboard: {0:#}")]
    Store(#[source] anyhow::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Rasterize(#[from] RasterizeError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("render did not finish within {0:?}")]
    Cancelled(Duration),
}

impl RenderError {
    /// Errors caused by the request itself rather than the pipeline
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidPage(_)
                | RenderError::Pagination(_)
                | RenderError::UnsupportedFormat(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub body: Bytes,
    pub content_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Timezone "now" and the calendar grids are computed in
    pub timezone: Tz,
    /// Deadline for a whole render, fetches and rasterizing included
    pub timeout: Duration,
    /// Root of the dashboard directories, handed to the rasterizer for assets
    pub dashboard_dir: Option<PathBuf>,
    /// Overrides the dashboard's own quality for jpeg output
    pub jpeg_quality: Option<u8>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            timeout: Duration::from_secs(30),
            dashboard_dir: None,
            jpeg_quality: None,
        }
    }
}

#[derive(Clone)]
pub struct DashboardRenderService {
    dashboards: Arc<dyn DashboardRepository>,
    fetcher: DataFetchService,
    templates: Arc<TemplateEngine>,
    rasterizer: Arc<dyn Rasterizer>,
    images: ImageProcessor,
    settings: RenderSettings,
}

impl DashboardRenderService {
    pub fn new(
        dashboards: Arc<dyn DashboardRepository>,
        fetcher: DataFetchService,
        templates: Arc<TemplateEngine>,
        rasterizer: Arc<dyn Rasterizer>,
        images: ImageProcessor,
        settings: RenderSettings,
    ) -> Self {
        Self {
            dashboards,
            fetcher,
            templates,
            rasterizer,
            images,
            settings,
        }
    }

    /// Page index the display should show after `action`
    pub async fn next_page(
        &self,
        dashboard: &str,
        current: i64,
        action: &str,
    ) -> Result<i64, RenderError> {
        let action: Action = action.parse()?;
        let config = self
            .dashboards
            .load_config(dashboard)
            .await
            .map_err(RenderError::Store)?
            .ok_or_else(|| RenderError::DashboardNotFound(dashboard.to_string()))?;
        if config.page_count() == 0 {
            return Err(RenderError::NoPages(dashboard.to_string()));
        }

        Ok(next_page_index(current, action, config.page_count()))
    }

    /// Render a page with the current time, bounded by the configured deadline
    pub async fn render(
        &self,
        dashboard: &str,
        page: i64,
        format: OutputFormat,
    ) -> Result<RenderedPage, RenderError> {
        let now = Utc::now().with_timezone(&self.settings.timezone);
        tokio::time::timeout(self.settings.timeout, self.render_at(dashboard, page, format, now))
            .await
            .map_err(|_| RenderError::Cancelled(self.settings.timeout))?
    }

    pub async fn render_at(
        &self,
        dashboard: &str,
        page: i64,
        format: OutputFormat,
        now: DateTime<Tz>,
    ) -> Result<RenderedPage, RenderError> {
        let html = self.render_html(dashboard, page, now).await?;
        if !format.is_image() {
            return Ok(RenderedPage {
                body: Bytes::from(html.body),
                content_type: format.content_type(),
            });
        }

        let quality = match format {
            OutputFormat::Jpeg => self.settings.jpeg_quality.unwrap_or(html.quality),
            _ => html.quality,
        };
        let options = RasterOptions {
            width: html.width,
            height: html.height,
            quality,
            asset_root: self.settings.dashboard_dir.as_ref().map(|dir| dir.join(dashboard)),
        };
        let raw = self.rasterizer.rasterize(html.body, &options).await?;
        let encoded = self.images.process(&raw, format, quality)?;

        tracing::debug!(
            dashboard = %dashboard,
            page = page,
            format = %format,
            bytes = encoded.len(),
            "rendered image"
        );
        Ok(RenderedPage {
            body: Bytes::from(encoded),
            content_type: format.content_type(),
        })
    }

    async fn render_html(
        &self,
        dashboard: &str,
        page: i64,
        now: DateTime<Tz>,
    ) -> Result<RenderedHtml, RenderError> {
        let definition = self
            .dashboards
            .load(dashboard)
            .await
            .map_err(RenderError::Store)?
            .ok_or_else(|| RenderError::DashboardNotFound(dashboard.to_string()))?;
        if definition.page_count() == 0 {
            return Err(RenderError::NoPages(dashboard.to_string()));
        }
        let index = usize::try_from(page)
            .ok()
            .filter(|i| *i < definition.page_count())
            .ok_or(RenderError::InvalidPage(page))?;

        let data = self
            .fetcher
            .fetch(&definition.config.home_assistant, &now)
            .await;
        let context = RenderContext::new(&definition, index, now.to_rfc3339(), data)
            .ok_or(RenderError::InvalidPage(page))?;
        let body = self.templates.render(&definition, &context, now)?;

        Ok(RenderedHtml {
            body,
            width: definition.config.width,
            height: definition.config.height,
            quality: definition.config.quality,
        })
    }
}

struct RenderedHtml {
    body: String,
    width: u32,
    height: u32,
    quality: u8,
}
