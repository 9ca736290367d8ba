//! Mapping of control-plane errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{Error, ErrorKind};

/// Error body returned by every admin handler.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub op: &'static str,
    pub message: String,
}

/// Wrapper so handlers can return `Result<_, ApiError>` and use `?`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: &ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        ErrorKind::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::Schema(_) => (StatusCode::UNPROCESSABLE_ENTITY, "schema"),
        ErrorKind::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        ErrorKind::TransientStore(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient_store"),
        ErrorKind::Compacted(_) => (StatusCode::GONE, "compacted"),
        ErrorKind::UnknownOperation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "unknown_operation"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = status_for(self.0.kind());
        if status.is_server_error() {
            tracing::error!(op = self.0.op(), error = %self.0, "Admin request failed");
        }
        let body = ErrorBody {
            kind,
            op: self.0.op(),
            message: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
