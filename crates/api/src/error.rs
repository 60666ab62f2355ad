use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};
use vdash_kubehub::FetchError;

/// Handler failure, rendered as `{"error": <summary>, "details": <message>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{summary}: {message}")]
    BadRequest { summary: &'static str, message: String },
    #[error("{summary}: {source}")]
    Upstream {
        summary: &'static str,
        #[source]
        source: FetchError,
    },
    #[error("{summary}: {message}")]
    Internal { summary: &'static str, message: String },
}

impl ApiError {
    /// Adapter for `map_err` on cluster calls.
    pub fn upstream(summary: &'static str) -> impl FnOnce(FetchError) -> ApiError {
        move |source| ApiError::Upstream { summary, source }
    }

    pub fn internal(summary: &'static str) -> impl FnOnce(String) -> ApiError {
        move |message| ApiError::Internal { summary, message }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Upstream { source: FetchError::NotFound(_), .. } => StatusCode::NOT_FOUND,
            ApiError::Upstream { .. } | ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn parts(&self) -> (&'static str, String) {
        match self {
            ApiError::BadRequest { summary, message } | ApiError::Internal { summary, message } => {
                (*summary, message.clone())
            }
            ApiError::Upstream { summary, source } => (*summary, source.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (summary, details) = self.parts();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "api: request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "api: request rejected");
        }
        (status, Json(json!({ "error": summary, "details": details }))).into_response()
    }
}
