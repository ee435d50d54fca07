// Presentation layer - Local editing API
pub mod app_state;
pub mod handlers;
