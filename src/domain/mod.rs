// Domain layer - Pure types and algorithms, no IO
pub mod calendar;
pub mod dashboard;
pub mod home_assistant;
pub mod pagination;
pub mod render;
