use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::admin::AuthError;
use crate::notifications::{DispatchError, FailureReason};
use crate::registration::{IntakeError, ReviewError, UploadError};

/// Error type for HTTP handlers; renders a consistent JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: Option<Vec<String>>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Email already sent")]
    AlreadySent { sent_at: Option<DateTime<Utc>> },
    #[error("Email send failed: {detail}")]
    Dependency {
        detail: String,
        reason: FailureReason,
    },
    /// Body could not be read at all; carries the extractor's status.
    #[error("{message}")]
    Malformed { status: StatusCode, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation { message, fields } => {
                let body = match fields {
                    Some(fields) => json!({ "error": message, "fields": fields }),
                    None => json!({ "error": message }),
                };
                (StatusCode::BAD_REQUEST, body)
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::AlreadySent { sent_at } => (
                StatusCode::CONFLICT,
                json!({ "error": "Email already sent", "sentAt": sent_at }),
            ),
            ApiError::Dependency { detail, reason } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Email send failed",
                    "detail": detail,
                    "reason": reason.as_str(),
                }),
            ),
            ApiError::Malformed { status, message } => (status, json!({ "error": message })),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Upload(_) | IntakeError::Store(_) => ApiError::Internal(err.to_string()),
            IntakeError::InvalidEventType
            | IntakeError::MissingFields(_)
            | IntakeError::TooManyVideos => ApiError::Validation {
                fields: err.fields(),
                message: err.to_string(),
            },
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::InvalidStatus | ReviewError::InvalidEventType => {
                ApiError::bad_request(err.to_string())
            }
            ReviewError::NotFound => ApiError::NotFound(err.to_string()),
            ReviewError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MissingRecipient | DispatchError::InvalidRecipient => {
                ApiError::bad_request(err.to_string())
            }
            DispatchError::NotFound => ApiError::NotFound(err.to_string()),
            DispatchError::AlreadySent { sent_at, .. } => ApiError::AlreadySent { sent_at },
            DispatchError::Mail(err) => ApiError::Dependency {
                reason: err.reason(),
                detail: err.to_string(),
            },
            DispatchError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Malformed {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

/// Unreadable or mistyped JSON is a validation failure. An oversized body
/// keeps its 413.
impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::Malformed {
                status: err.status(),
                message: err.body_text(),
            };
        }
        ApiError::bad_request(err.body_text())
    }
}
