//! Error type shared by the store, the query configuration and the HTTP layer.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate.
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Unknown event-type key, missing payload field or unsupported filter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required request argument was not supplied.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// A request argument was supplied but could not be parsed.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A configuration entry addressed by key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The event store failed.
    #[error("data source error: {0}")]
    DataSource(String),
}

impl AnalyticsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn data_source(err: impl std::fmt::Display) -> Self {
        Self::DataSource(err.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyticsError::Configuration(_) => StatusCode::BAD_REQUEST,
            AnalyticsError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AnalyticsError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            AnalyticsError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalyticsError::DataSource(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AnalyticsError::Configuration(_) => "configuration_error",
            AnalyticsError::MissingParameter(_) => "missing_parameter",
            AnalyticsError::InvalidParameter { .. } => "invalid_parameter",
            AnalyticsError::NotFound(_) => "not_found",
            AnalyticsError::DataSource(_) => "data_source_error",
        }
    }
}

impl From<rusqlite::Error> for AnalyticsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::data_source(err)
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("invalid JSON: {err}"))
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        Self::configuration(format!("I/O error: {err}"))
    }
}

impl From<JsonRejection> for AnalyticsError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidParameter {
            name: "body",
            reason: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AnalyticsError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidParameter {
            name: "query",
            reason: rejection.body_text(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
