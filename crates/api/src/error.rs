use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mtbridge_service::{ErrorKind, ServiceError};
use tracing::warn;

/// Failure envelope: `{"success": false, "error": ..., "kind": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::ValidationError,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ValidationError | ErrorKind::AuthError | ErrorKind::InitError => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::SessionInUse => StatusCode::CONFLICT,
        ErrorKind::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            kind,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(kind = self.kind.as_str(), "Request failed: {}", self.message);
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message,
            "kind": self.kind.as_str(),
        }));
        (self.status, body).into_response()
    }
}
