// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::session::SessionStatus;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., session already submitted)
    Conflict(String),

    // 422 Unprocessable Entity, naming the incomplete questions
    Unprocessable {
        message: String,
        unanswered: Vec<i64>,
    },

    // 503 Service Unavailable, safe to retry
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Unprocessable {
                message,
                unanswered,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "unanswered": unanswered }),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": msg, "retryable": true }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Failure of an external collaborator (snapshot store, exam provider,
/// submission store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data was readable but failed validation.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Which remote write of the submission pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    Submission,
    Answers,
}

impl fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitStage::Submission => write!(f, "submission record"),
            SubmitStage::Answers => write!(f, "answer records"),
        }
    }
}

/// Errors raised by the session engine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("required questions are unanswered: {unanswered:?}")]
    Validation { unanswered: Vec<i64> },

    #[error("applicant name is required")]
    MissingApplicantName,

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(i64),

    #[error("option '{option_id}' is not offered by question {question_id}")]
    InvalidOption { question_id: i64, option_id: String },

    #[error("session is {0}")]
    NotActive(SessionStatus),

    #[error("time limit has expired")]
    Expired,

    #[error("failed to persist {stage}: {source}")]
    RemoteSubmission {
        stage: SubmitStage,
        #[source]
        source: StoreError,
    },

    #[error("exam {0} not found")]
    ExamNotFound(i64),

    #[error("exam {0} requires an authenticated candidate")]
    IdentityRequired(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Whether the caller can retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::RemoteSubmission { .. })
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation { unanswered } => AppError::Unprocessable {
                message: "Required questions are unanswered".to_string(),
                unanswered,
            },
            SessionError::MissingApplicantName => AppError::Unprocessable {
                message: "Applicant name is required".to_string(),
                unanswered: Vec::new(),
            },
            e @ (SessionError::UnknownQuestion(_) | SessionError::InvalidOption { .. }) => {
                AppError::BadRequest(e.to_string())
            }
            e @ (SessionError::NotActive(_) | SessionError::Expired) => {
                AppError::Conflict(e.to_string())
            }
            e @ SessionError::RemoteSubmission { .. } => {
                tracing::error!("Submission failed: {}", e);
                AppError::ServiceUnavailable(e.to_string())
            }
            e @ SessionError::ExamNotFound(_) => AppError::NotFound(e.to_string()),
            e @ SessionError::IdentityRequired(_) => AppError::AuthError(e.to_string()),
            SessionError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}
