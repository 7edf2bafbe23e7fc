use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::infrastructure::image_processor::Palette;
use crate::infrastructure::rasterizer::RasterizerKind;

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_dashboard_dir() -> PathBuf {
    PathBuf::from("dashboards")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_dashboard_dir")]
    pub dashboard_dir: PathBuf,
    /// Shared partial templates available to every dashboard
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log: LogSettings,
    pub home_assistant: Option<HomeAssistantSettings>,
    #[serde(default)]
    pub renderer: RendererSettings,
    #[serde(default)]
    pub image: ImageSettings,
}

impl AppConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.listen_addr, self.listen_port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {}: {}", addr, e))
    }

    pub fn timezone(&self) -> anyhow::Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone {}: {}", self.timezone, e))
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub add_source: bool,
    #[serde(default)]
    pub no_color: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            add_source: false,
            no_color: false,
        }
    }
}

fn default_ha_port() -> u16 {
    8123
}

fn default_ha_timeout_secs() -> u64 {
    10
}

#[derive(Deserialize, Clone)]
pub struct HomeAssistantSettings {
    pub host: String,
    #[serde(default = "default_ha_port")]
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    pub token: String,
    #[serde(default = "default_ha_timeout_secs")]
    pub timeout_secs: u64,
}

impl HomeAssistantSettings {
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

// Token never reaches the logs
impl fmt::Debug for HomeAssistantSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeAssistantSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("token", &"*".repeat(self.token.len()))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_max_concurrent() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RendererSettings {
    #[serde(default)]
    pub kind: RasterizerKind,
    /// Executable to run, defaults to the kind's usual binary name
    pub binary: Option<PathBuf>,
    /// Local directory the converter may read assets from
    pub assets_dir: Option<PathBuf>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            kind: RasterizerKind::default(),
            binary: None,
            assets_dir: None,
            max_concurrent: default_max_concurrent(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ImageSettings {
    #[serde(default)]
    pub palette: Palette,
    pub jpeg_quality: Option<u8>,
}

/// Load `path` (extension optional) overlaid with `DASHBOARD__*` environment variables
pub fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
