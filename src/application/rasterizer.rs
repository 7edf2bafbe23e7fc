// Port for the out-of-process HTML rasterizer
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOptions {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    /// Local directory the page may load assets from
    pub asset_root: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    #[error("failed to start rasterizer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("rasterizer io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("rasterizer exited with {status}: {stderr:?}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("rasterizer produced no image")]
    EmptyOutput,
    #[error("rasterizer session pool is closed")]
    Closed,
}

/// Turns a complete HTML document into a raw PNG screenshot
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, html: String, options: &RasterOptions)
        -> Result<Vec<u8>, RasterizeError>;
}
