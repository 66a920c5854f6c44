//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **`AppError`**: failures of the HTTP surface, converted into JSON responses
//!   through actix's `ResponseError` trait.
//! - **`AdapterError` / `PipelineError`**: failures while processing one audio window.
//!   These never reach the client. The session loop logs them and moves on to the
//!   next window, so they carry just enough context (kind and stage) to diagnose.
//!
//! ## Why custom errors:
//! Custom error types make it easy to handle different failure scenarios
//! and keep the retry/alerting policy separable per error kind.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the HTTP surface.
///
/// ## Error Categories:
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **ValidationError**: Data validation failed (400 errors)
/// - **ServiceUnavailable**: Session capacity exhausted (503 errors)
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    ValidationError(String),
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts errors into HTTP responses with a consistent JSON body:
///
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Window threshold must be greater than 0",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::ValidationError(msg) => ("validation_error", msg),
            AppError::ServiceUnavailable(msg) => ("service_unavailable", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// JSON parsing errors are almost always caused by the client, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Failure reported by an external speech or emotion service client.
#[derive(Debug)]
pub enum AdapterError {
    /// Network-level failure (connect, TLS, reset)
    Transport(String),
    /// The service answered with a non-success HTTP status
    Status { code: u16, body: String },
    /// The service answered but the body could not be understood
    Decode(String),
    /// Nothing to classify
    EmptyInput,
    /// The classifier returned no labels at all
    EmptyScores,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Transport(msg) => write!(f, "transport error: {}", msg),
            AdapterError::Status { code, body } => write!(f, "service returned {}: {}", code, body),
            AdapterError::Decode(msg) => write!(f, "could not decode response: {}", msg),
            AdapterError::EmptyInput => write!(f, "input text is empty"),
            AdapterError::EmptyScores => write!(f, "classifier returned no usable scores"),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Decode(err.to_string())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

/// Step of the window pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcode,
    Transcription,
    Classification,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcode => "transcode",
            Stage::Transcription => "transcription",
            Stage::Classification => "classification",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of window failures.
///
/// Every variant is contained per window today; the split exists so that
/// retry or alerting can later treat, say, timeouts differently from format errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Transcription,
    Classification,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Format => "format",
            ErrorKind::Transcription => "transcription",
            ErrorKind::Classification => "classification",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Failure while turning one window into an emotion result.
#[derive(Debug)]
pub enum PipelineError {
    /// Window bytes are not a whole number of samples
    Format { len: usize, sample_width: u16 },
    /// The container could not be serialized
    Encode(String),
    Transcription(AdapterError),
    Classification(AdapterError),
    Timeout(Stage),
    /// A panic caught while processing the window
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Format { .. } | PipelineError::Encode(_) => ErrorKind::Format,
            PipelineError::Transcription(_) => ErrorKind::Transcription,
            PipelineError::Classification(_) => ErrorKind::Classification,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stage that failed, if known. Panics are not attributed to a stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Format { .. } | PipelineError::Encode(_) => Some(Stage::Transcode),
            PipelineError::Transcription(_) => Some(Stage::Transcription),
            PipelineError::Classification(_) => Some(Stage::Classification),
            PipelineError::Timeout(stage) => Some(*stage),
            PipelineError::Internal(_) => None,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Format { len, sample_width } => write!(
                f,
                "window of {} bytes is not a multiple of the {}-byte sample width",
                len, sample_width
            ),
            PipelineError::Encode(msg) => write!(f, "failed to encode window: {}", msg),
            PipelineError::Transcription(err) => write!(f, "transcription failed: {}", err),
            PipelineError::Classification(err) => write!(f, "classification failed: {}", err),
            PipelineError::Timeout(stage) => write!(f, "{} timed out", stage),
            PipelineError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::ValidationError("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::ServiceUnavailable("x".into()).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_error_kind_and_stage() {
        let err = PipelineError::Format { len: 3, sample_width: 2 };
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.stage(), Some(Stage::Transcode));

        let err = PipelineError::Timeout(Stage::Classification);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.stage(), Some(Stage::Classification));
        assert_eq!(err.to_string(), "classification timed out");

        let err = PipelineError::Internal("boom".into());
        assert_eq!(err.stage(), None);
    }
}
