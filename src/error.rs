use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Envelope {
    OpenAi,
    Message,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub error_type: String,
    pub param: Option<String>,
    envelope: Envelope,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            error_type: "invalid_request_error".to_string(),
            param: None,
            envelope: Envelope::OpenAi,
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    /// Renders as `{"error": "<message>"}` instead of the OpenAI error object.
    pub fn with_plain_body(mut self) -> Self {
        self.envelope = Envelope::Message;
        self
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Unauthorized access",
        )
        .with_plain_body()
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    param: Option<String>,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.envelope == Envelope::Message {
            return (self.status, axum::Json(json!({ "error": self.message }))).into_response();
        }
        let body = ErrorEnvelope {
            error: ErrorBody {
                message: self.message,
                error_type: self.error_type,
                param: self.param,
                code: self.code,
            },
        };
        (self.status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Request-time failures of the proxy engine.
///
/// None of the messages carry credential values; resource names only show up
/// in server logs, never in caller-facing bodies.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no credential configured for resource {resource}")]
    MissingCredential { resource: String },
    #[error("credential for resource {resource} is not a valid header value")]
    InvalidCredential { resource: String },
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::NotFound => AppError::new(StatusCode::NOT_FOUND, "not_found", "Not Found"),
            ProxyError::BadRequest(detail) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", detail)
            }
            ProxyError::MissingCredential { resource } => {
                tracing::error!(%resource, "resource has no credential configured");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "resource_key_missing",
                    "gateway is misconfigured",
                )
                .with_type("server_error")
            }
            ProxyError::InvalidCredential { resource } => {
                tracing::error!(%resource, "resource credential is not a valid header value");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "resource_key_invalid",
                    "gateway is misconfigured",
                )
                .with_type("server_error")
            }
            ProxyError::Upstream(detail) => {
                tracing::warn!(%detail, "upstream call failed");
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    "upstream_unreachable",
                    "upstream request failed",
                )
                .with_type("server_error")
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
