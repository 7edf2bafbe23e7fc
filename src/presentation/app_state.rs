// Application state for HTTP handlers
use crate::application::render_service::DashboardRenderService;
use std::path::PathBuf;

#[derive(Clone)]
pub struct AppState {
    pub render_service: DashboardRenderService,
    /// Root of the dashboard directories, assets live in `<dir>/<dashboard>/assets`
    pub dashboard_dir: PathBuf,
}
