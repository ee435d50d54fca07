// Infrastructure layer - External services, storage and HTTP adapters
pub mod config;
pub mod file_store;
pub mod http_response;
pub mod metrics_client;
pub mod visuals_client;
