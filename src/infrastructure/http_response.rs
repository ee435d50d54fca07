// HTTP response utilities for the local API
use crate::domain::error::{StudioError, describe_error};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Any handler failure, rendered as `{"detail": "..."}` with a mapped status.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<StudioError>() {
            Some(StudioError::TileNotFound(_)) | Some(StudioError::DashboardNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Some(StudioError::InvalidPayload(_))
            | Some(StudioError::UnknownBreakpoint(_))
            | Some(StudioError::MissingMetric)
            | Some(StudioError::MissingTimeRange) => StatusCode::BAD_REQUEST,
            Some(StudioError::NoActiveDashboard) => StatusCode::CONFLICT,
            Some(StudioError::Http { status: 404, .. }) => StatusCode::NOT_FOUND,
            Some(StudioError::Http { .. }) => StatusCode::BAD_GATEWAY,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = describe_error(&self.0, "Request failed.");
        if status.is_server_error() {
            tracing::error!("{} {:#}", status, self.0);
        } else {
            tracing::debug!("{} {}", status, detail);
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StudioError::TileNotFound("a".into()), StatusCode::NOT_FOUND),
            (StudioError::UnknownBreakpoint("xl".into()), StatusCode::BAD_REQUEST),
            (StudioError::NoActiveDashboard, StatusCode::CONFLICT),
            (
                StudioError::Http { status: 500, body: String::new() },
                StatusCode::BAD_GATEWAY,
            ),
            (
                StudioError::Http { status: 404, body: String::new() },
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_context_keeps_mapping() {
        let err = anyhow::Error::new(StudioError::MissingMetric).context("resolving tile");
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
        let plain = anyhow::anyhow!("boom");
        assert_eq!(ApiError::from(plain).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
