//! Out-of-process rasterizers.
//!
//! Every render runs its own converter process: wkhtmltoimage reading the
//! page from stdin, or a headless Chrome taking a screenshot of a page file in
//! a private temp directory. A semaphore bounds how many run at once. The
//! permit and the child process are both tied to the render future, so a
//! failed, timed out or abandoned render releases its slot and kills the
//! process.

use async_trait::async_trait;
use minijinja::HtmlEscape;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::application::rasterizer::{RasterOptions, RasterizeError, Rasterizer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterizerKind {
    #[default]
    Wkhtmltoimage,
    Chrome,
}

impl RasterizerKind {
    fn default_binary(&self) -> &'static str {
        match self {
            RasterizerKind::Wkhtmltoimage => "wkhtmltoimage",
            RasterizerKind::Chrome => "chromium",
        }
    }
}

pub struct CommandRasterizer {
    kind: RasterizerKind,
    binary: PathBuf,
    assets_dir: Option<PathBuf>,
    extra_args: Vec<String>,
    sessions: Arc<Semaphore>,
}

impl CommandRasterizer {
    pub fn new(
        kind: RasterizerKind,
        binary: Option<PathBuf>,
        assets_dir: Option<PathBuf>,
        max_concurrent: usize,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            kind,
            binary: binary.unwrap_or_else(|| PathBuf::from(kind.default_binary())),
            assets_dir,
            extra_args,
            sessions: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    async fn run_wkhtmltoimage(
        &self,
        html: String,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterizeError> {
        let allow = options.asset_root.as_deref().or(self.assets_dir.as_deref());
        let args = wkhtmltoimage_args(options, allow, &self.extra_args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RasterizeError::Spawn)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("stdin of rasterizer not captured"))?;
        let write = async move {
            stdin.write_all(html.as_bytes()).await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            return Err(RasterizeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;

        if output.stdout.is_empty() {
            return Err(RasterizeError::EmptyOutput);
        }
        Ok(output.stdout)
    }

    async fn run_chrome(
        &self,
        html: String,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterizeError> {
        let workdir = tempfile::tempdir()?;
        let page = workdir.path().join("page.html");
        let screenshot = workdir.path().join("screenshot.png");
        // the page lives in a temp dir, so relative asset links need a base
        let html = match options.asset_root.as_deref().or(self.assets_dir.as_deref()) {
            Some(root) => with_base_href(&html, root),
            None => html,
        };
        tokio::fs::write(&page, html).await?;

        // chrome always screenshots png; quality only applies when re-encoding

        let args = chrome_args(options, workdir.path(), &page, &screenshot, &self.extra_args);
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RasterizeError::Spawn)?;
        if !output.status.success() {
            return Err(RasterizeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let image = match tokio::fs::read(&screenshot).await {
            Ok(image) => image,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RasterizeError::EmptyOutput);
            }
            Err(e) => return Err(e.into()),
        };
        if image.is_empty() {
            return Err(RasterizeError::EmptyOutput);
        }
        Ok(image)
    }
}

#[async_trait]
impl Rasterizer for CommandRasterizer {
    async fn rasterize(
        &self,
        html: String,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterizeError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|_| RasterizeError::Closed)?;

        tracing::debug!(
            kind = ?self.kind,
            binary = %self.binary.display(),
            width = options.width,
            height = options.height,
            html_bytes = html.len(),
            "rasterizing page"
        );

        match self.kind {
            RasterizerKind::Wkhtmltoimage => self.run_wkhtmltoimage(html, options).await,
            RasterizerKind::Chrome => self.run_chrome(html, options).await,
        }
    }
}

fn wkhtmltoimage_args(options: &RasterOptions, allow: Option<&Path>, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "--width".to_string(),
        options.width.to_string(),
        "--height".to_string(),
        options.height.to_string(),
        "--quality".to_string(),
        options.quality.to_string(),
    ];
    if let Some(dir) = allow {
        args.push("--allow".to_string());
        args.push(dir.display().to_string());
    }
    args.extend(
        ["--disable-smart-width", "--disable-javascript", "--disable-plugins", "-f", "png"]
            .map(String::from),
    );
    args.extend(extra.iter().cloned());
    // read html from stdin, write the image to stdout
    args.push("-".to_string());
    args.push("-".to_string());
    args
}

/// Points relative links at `root` unless the page already sets a `<base>`
fn with_base_href(html: &str, root: &Path) -> String {
    let lower = html.to_ascii_lowercase();
    if lower.contains("<base") {
        return html.to_string();
    }
    let href = format!("file://{}/", root.display().to_string().trim_end_matches('/'));
    let tag = format!("<base href=\"{}\">", HtmlEscape(&href));
    let at = lower
        .find("<head")
        .and_then(|start| lower[start..].find('>').map(|end| start + end + 1));
    match at {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{tag}{html}"),
    }
}

fn chrome_args(
    options: &RasterOptions,
    workdir: &Path,
    page: &Path,
    screenshot: &Path,
    extra: &[String],
) -> Vec<String> {
    let mut args = vec![
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--hide-scrollbars".to_string(),
        format!("--user-data-dir={}", workdir.join("profile").display()),
        format!("--window-size={},{}", options.width, options.height),
        format!("--screenshot={}", screenshot.display()),
    ];
    args.extend(extra.iter().cloned());
    args.push(format!("file://{}", page.display()));
    args
}
