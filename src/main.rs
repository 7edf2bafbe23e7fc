// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use crate::application::fetch_service::DataFetchService;
use crate::application::home_assistant_repository::HomeAssistantRepository;
use crate::application::render_service::{DashboardRenderService, RenderSettings};
use crate::infrastructure::config::{load_config, LogFormat, LogSettings};
use crate::infrastructure::dashboard_store::FileDashboardRepository;
use crate::infrastructure::home_assistant_client::{HomeAssistantClient, UnconfiguredHomeAssistant};
use crate::infrastructure::image_processor::ImageProcessor;
use crate::infrastructure::rasterizer::CommandRasterizer;
use crate::infrastructure::template_engine::TemplateEngine;
use crate::presentation::app_state::AppState;
use crate::presentation::routes::router;

#[derive(Parser, Debug)]
#[command(name = "esphome-dashboard", version, about = "Renders dashboards for e-ink displays")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

fn init_tracing(settings: &LogSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(settings.add_source)
        .with_line_number(settings.add_source)
        .with_ansi(!settings.no_color);

    match settings.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(err = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(err = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config.log);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?config, "starting dashboard");

    let timezone = config.timezone()?;

    // Home Assistant backend (infrastructure layer)
    let home_assistant: Arc<dyn HomeAssistantRepository> = match &config.home_assistant {
        Some(settings) => {
            let client = HomeAssistantClient::from_settings(settings)?;
            match client.test_connection().await {
                Ok(message) => tracing::info!(url = %settings.base_url(), message = %message, "connected to home assistant"),
                Err(e) => tracing::warn!(url = %settings.base_url(), err = %format!("{e:#}"), "home assistant not reachable"),
            }
            Arc::new(client)
        }
        None => {
            tracing::warn!("home assistant not configured, live data will be missing");
            Arc::new(UnconfiguredHomeAssistant)
        }
    };

    let renderer = &config.renderer;
    let rasterizer = Arc::new(CommandRasterizer::new(
        renderer.kind,
        renderer.binary.clone(),
        renderer.assets_dir.clone(),
        renderer.max_concurrent,
        renderer.extra_args.clone(),
    ));
    let templates = Arc::new(TemplateEngine::from_dir(&config.templates_dir)?);
    tracing::info!(
        dir = %config.templates_dir.display(),
        partials = ?templates.partial_names().collect::<Vec<_>>(),
        "loaded shared templates"
    );
    let dashboards = Arc::new(FileDashboardRepository::new(&config.dashboard_dir));

    // Services (application layer)
    let render_service = DashboardRenderService::new(
        dashboards,
        DataFetchService::new(home_assistant),
        templates,
        rasterizer,
        ImageProcessor::new(config.image.palette),
        RenderSettings {
            timezone,
            timeout: Duration::from_secs(config.request_timeout_secs),
            dashboard_dir: Some(config.dashboard_dir.clone()),
            jpeg_quality: config.image.jpeg_quality,
        },
    );

    // Router (presentation layer)
    let state = Arc::new(AppState {
        render_service,
        dashboard_dir: config.dashboard_dir.clone(),
    });
    let router = router(state);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
