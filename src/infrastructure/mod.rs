// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod dashboard_store;
pub mod home_assistant_client;
pub mod http_response;
pub mod image_processor;
pub mod rasterizer;
pub mod template_engine;
