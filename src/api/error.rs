//! Mapping from crate errors to HTTP responses.

use crate::Error;
use axum::Json;
use axum::extract::rejection::{BytesRejection, FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// JSON error body: `{"error": message}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl ErrorBody {
    /// Creates a body with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// An [`Error`] on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    /// Returns the status code for the wrapped error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::StoreFailure { .. } | Error::OperationFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Returns the message placed in the response body.
    ///
    /// Store failures carry the store's own message.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.0 {
            Error::NotFound(_) => "Not found".to_string(),
            Error::StoreFailure { cause, .. } => cause.clone(),
            Error::InvalidInput(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidInput(rejection.body_text()))
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self(Error::InvalidInput(rejection.body_text()))
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self(Error::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        (status, Json(ErrorBody::new(self.message()))).into_response()
    }
}
