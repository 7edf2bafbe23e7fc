// File-backed dashboard repository: <root>/<dashboard>/config.toml plus template files
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::dashboard::{DashboardConfig, DashboardDefinition, LayoutDefinition, PageDefinition};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct FileDashboardRepository {
    root: PathBuf,
}

impl FileDashboardRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of a dashboard, `None` for names that would escape the root
    fn dashboard_dir(&self, name: &str) -> Option<PathBuf> {
        is_plain_name(name).then(|| self.root.join(name))
    }

    async fn read_config(&self, name: &str) -> Result<Option<(PathBuf, DashboardConfig)>> {
        let Some(dir) = self.dashboard_dir(name) else {
            tracing::debug!(dashboard = %name, "rejected dashboard name");
            return Ok(None);
        };
        let path = dir.join(CONFIG_FILE);
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let config = toml::from_str(&source)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some((dir, config)))
    }
}

#[async_trait]
impl DashboardRepository for FileDashboardRepository {
    async fn load_config(&self, name: &str) -> Result<Option<DashboardConfig>> {
        Ok(self.read_config(name).await?.map(|(_, config)| config))
    }

    async fn load(&self, name: &str) -> Result<Option<DashboardDefinition>> {
        let Some((dir, config)) = self.read_config(name).await? else {
            return Ok(None);
        };

        let (vars, body) = read_template(&template_path(&dir, &config.base)?).await?;
        let layout = LayoutDefinition { body, vars };

        let pages = try_join_all(config.pages.iter().enumerate().map(|(index, file)| {
            let dir = &dir;
            async move {
                let (vars, body) = read_template(&template_path(dir, file)?).await?;
                let name = Path::new(file)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(file)
                    .to_string();
                Ok::<_, anyhow::Error>(PageDefinition {
                    index,
                    name,
                    body,
                    vars,
                })
            }
        }))
        .await?;

        tracing::debug!(dashboard = %name, pages = pages.len(), "loaded dashboard");
        Ok(Some(DashboardDefinition {
            config,
            layout,
            pages,
        }))
    }
}

/// A single path component that stays inside its parent directory
fn is_plain_name(name: &str) -> bool {
    !(name.is_empty() || name.contains(['/', '\\']) || name == "." || name == "..")
}

fn template_path(dir: &Path, file: &str) -> Result<PathBuf> {
    if !is_plain_name(file) {
        anyhow::bail!("template {file:?} is outside of {}", dir.display());
    }
    Ok(dir.join(file))
}

async fn read_template(path: &Path) -> Result<(Map<String, Value>, String)> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    let (vars, body) = split_front_matter(&source)
        .with_context(|| format!("Failed to parse front matter of {}", path.display()))?;
    Ok((vars, body.to_string()))
}

/// Split optional `---` (YAML) or `+++` (TOML) front matter from a template body
pub fn split_front_matter(source: &str) -> Result<(Map<String, Value>, &str)> {
    if let Some((matter, body)) = fenced(source, "---")? {
        if matter.trim().is_empty() {
            return Ok((Map::new(), body));
        }
        let value: Value = serde_yaml::from_str(matter)?;
        return Ok((into_vars(value)?, body));
    }
    if let Some((matter, body)) = fenced(source, "+++")? {
        let table: toml::Table = toml::from_str(matter)?;
        return Ok((into_vars(serde_json::to_value(table)?)?, body));
    }
    Ok((Map::new(), source))
}

fn fenced<'a>(source: &'a str, fence: &str) -> Result<Option<(&'a str, &'a str)>> {
    let Some(rest) = source.strip_prefix(fence) else {
        return Ok(None);
    };
    let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return Ok(None);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == fence {
            return Ok(Some((&rest[..offset], &rest[offset + line.len()..])));
        }
        offset += line.len();
    }
    anyhow::bail!("front matter opened with {} is never closed", fence)
}

fn into_vars(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => anyhow::bail!("front matter must be a mapping, got {}", other),
    }
}
