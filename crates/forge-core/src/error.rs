//! Error types for onnx-forge.
//!
//! Every failure a conversion can run into (bad input, hub rejection, builder
//! crash, filesystem trouble) is folded into `ForgeError` before it leaves the
//! library. Nothing raised by the builder process crosses this boundary raw.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Which part of a conversion request failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationErrorKind {
    InvalidModel,
    MissingToken,
    InvalidPrecision,
    InvalidExecutionProvider,
    /// Body was not JSON, or not a JSON object.
    MalformedBody,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::InvalidModel => "InvalidModel",
            ValidationErrorKind::MissingToken => "MissingToken",
            ValidationErrorKind::InvalidPrecision => "InvalidPrecision",
            ValidationErrorKind::InvalidExecutionProvider => "InvalidExecutionProvider",
            ValidationErrorKind::MalformedBody => "MalformedBody",
        }
    }
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for onnx-forge.
#[derive(Debug, Error)]
pub enum ForgeError {
    // Client errors
    #[error("{message}")]
    Validation {
        kind: ValidationErrorKind,
        message: String,
    },

    #[error("The model hub rejected the access token for {model_id}")]
    Authentication { model_id: String },

    #[error("Model architecture is not supported by the builder: {model_id}")]
    UnsupportedModel { model_id: String },

    // Job lifecycle errors
    #[error("Conversion ran out of resources: {message}")]
    ResourceExhausted { message: String },

    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Conversion capacity exhausted ({capacity} jobs already admitted), retry later")]
    Busy { capacity: usize },

    #[error("Conversion was cancelled")]
    Cancelled,

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Job {job_id} is already streaming its archive and can no longer be cancelled")]
    AlreadyStreaming { job_id: String },

    // Internal errors
    #[error("Conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for onnx-forge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        ForgeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<zip::result::ZipError> for ForgeError {
    fn from(err: zip::result::ZipError) -> Self {
        ForgeError::Archive {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<walkdir::Error> for ForgeError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let message = err.to_string();
        ForgeError::Io {
            message,
            path,
            source: err.into_io_error(),
        }
    }
}

impl ForgeError {
    /// Create a validation error.
    pub fn validation(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        ForgeError::Validation {
            kind,
            message: message.into(),
        }
    }

    /// Create an IO error with context and path.
    pub fn io(context: &str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ForgeError::Io {
            message: format!("{context}: {err}"),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Stable, machine-readable code reported to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            ForgeError::Validation { kind, .. } => kind.as_str(),
            ForgeError::Authentication { .. } => "AuthenticationFailed",
            ForgeError::UnsupportedModel { .. } => "UnsupportedModel",
            ForgeError::ResourceExhausted { .. } => "ResourceExhausted",
            ForgeError::Timeout(_) => "Timeout",
            ForgeError::Busy { .. } => "Busy",
            ForgeError::Cancelled => "Cancelled",
            ForgeError::JobNotFound { .. } => "JobNotFound",
            ForgeError::AlreadyStreaming { .. } => "AlreadyStreaming",
            ForgeError::ConversionFailed { .. }
            | ForgeError::Io { .. }
            | ForgeError::Archive { .. }
            | ForgeError::Other(_) => "InternalError",
        }
    }

    /// Convert to an HTTP status code.
    ///
    /// - 400: validation failure
    /// - 401: hub rejected the token
    /// - 404: unknown job
    /// - 408: job exceeded its wall-clock limit
    /// - 409: job cancelled before it finished, or too late to cancel
    /// - 422: architecture the builder cannot trace
    /// - 503: admission queue full
    /// - 500: everything else
    pub fn http_status(&self) -> u16 {
        match self {
            ForgeError::Validation { .. } => 400,
            ForgeError::Authentication { .. } => 401,
            ForgeError::JobNotFound { .. } => 404,
            ForgeError::Timeout(_) => 408,
            ForgeError::Cancelled | ForgeError::AlreadyStreaming { .. } => 409,
            ForgeError::UnsupportedModel { .. } => 422,
            ForgeError::Busy { .. } => 503,
            _ => 500,
        }
    }

    /// Whether the message is safe to show to a client.
    ///
    /// Internal errors may carry paths or builder output and stay in the logs.
    pub fn is_client_visible(&self) -> bool {
        self.code() != "InternalError" && !matches!(self, ForgeError::ResourceExhausted { .. })
    }
}
