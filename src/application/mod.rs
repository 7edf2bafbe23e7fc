// Application layer - Use cases and the ports they depend on
pub mod dashboard_repository;
pub mod fetch_service;
pub mod home_assistant_repository;
pub mod rasterizer;
pub mod render_service;

#[cfg(test)]
pub mod testing;
