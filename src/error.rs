//! Application error type shared by the control plane, the reconcilers and the HTTP API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::response::{ApiError, ErrorBody};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("no route from {from} to {to}")]
    NoRoute { from: String, to: String },

    #[error("routing loop detected at node {0}")]
    RoutingLoop(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),

    #[error("kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl AppError {
    pub fn internal(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }

    pub fn unknown_uuid(uuid: &str) -> Self {
        AppError::NotFound(format!("uuid {} does not exist", uuid))
    }

    /// Failures worth retrying with backoff: agent pushes, fetches, addresses not yet assigned.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Unavailable(_) | AppError::Http(_) => true,
            AppError::Kubernetes(kube::Error::Api(e)) => e.code >= 500 || e.code == 429,
            AppError::Kubernetes(_) => true,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
            || matches!(self, AppError::Kubernetes(kube::Error::Api(e)) if e.code == 409)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
            || matches!(self, AppError::Kubernetes(kube::Error::Api(e)) if e.code == 404)
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            AppError::NoRoute { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "NO_ROUTE"),
            AppError::RoutingLoop(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ROUTING_LOOP"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Kubernetes(_) => (StatusCode::INTERNAL_SERVER_ERROR, "KUBERNETES_ERROR"),
            AppError::Http(_) => (StatusCode::INTERNAL_SERVER_ERROR, "HTTP_ERROR"),
            AppError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "JSON_ERROR"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: ApiError {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
