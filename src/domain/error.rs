// Domain errors and user-facing error messages
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("request failed with status {status}")]
    Http { status: u16, body: String },

    #[error("Select at least one metric.")]
    MissingMetric,

    #[error("A time range is required for this tile.")]
    MissingTimeRange,

    #[error("No dashboard is open.")]
    NoActiveDashboard,

    #[error("Tile not found: {0}")]
    TileNotFound(String),

    #[error("Dashboard not found: {0}")]
    DashboardNotFound(String),

    #[error("Unknown breakpoint: {0}")]
    UnknownBreakpoint(String),

    #[error("{0}")]
    InvalidPayload(String),
}

impl StudioError {
    /// Message shown to the user for an upstream HTTP failure.
    ///
    /// FastAPI style `{"detail": "..."}` bodies are unwrapped; any other
    /// non-empty body is returned as-is.
    fn http_message(status: u16, body: &str) -> String {
        let trimmed = body.trim();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            match value.get("detail") {
                Some(serde_json::Value::String(detail)) if !detail.trim().is_empty() => {
                    return detail.trim().to_string();
                }
                Some(detail) if !detail.is_null() => return detail.to_string(),
                _ => {}
            }
        }
        if trimmed.is_empty() {
            format!("Request failed with status {}", status)
        } else {
            trimmed.to_string()
        }
    }
}

/// Turn any failure into the string surfaced in page, tile and draft status.
pub fn describe_error(err: &anyhow::Error, fallback: &str) -> String {
    if let Some(StudioError::Http { status, body }) = err.downcast_ref::<StudioError>() {
        return StudioError::http_message(*status, body);
    }
    let message = err.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
