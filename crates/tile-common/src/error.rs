//! Error types for tilescript services.

use thiserror::Error;

/// Result type alias using ScriptTileError.
pub type ScriptTileResult<T> = Result<T, ScriptTileError>;

/// Primary error type for script-tile operations.
///
/// Per-pixel evaluation faults are deliberately absent: they are contained
/// by the evaluation engine and aggregated into a fault counter, never
/// propagated as request errors.
#[derive(Debug, Error)]
pub enum ScriptTileError {
    // === Source registry ===
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode source '{source_id}': {message}")]
    DecodeFailure { source_id: String, message: String },

    // === Bounds resolver ===
    #[error("Declared sources have no common extent")]
    EmptyIntersection,

    #[error("Incompatible CRS: {0}")]
    IncompatibleCrs(String),

    #[error("No inputs declared")]
    NoInputs,

    // === Script compiler ===
    #[error("Script syntax error: {0}")]
    Syntax(String),

    #[error("Script capability violation: {0}")]
    CapabilityViolation(String),

    #[error("Script references undeclared input '{0}'")]
    UndeclaredInputReference(String),

    // === Rendering ===
    #[error("Sampling failure in source '{source_id}': {message}")]
    SamplingFailure { source_id: String, message: String },

    #[error("Rendering failed: {0}")]
    RenderError(String),

    // === Protocol / infrastructure ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ScriptTileError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ScriptTileError::SourceNotFound(_) => 404,

            ScriptTileError::UnsupportedFormat(_)
            | ScriptTileError::EmptyIntersection
            | ScriptTileError::IncompatibleCrs(_)
            | ScriptTileError::NoInputs
            | ScriptTileError::Syntax(_)
            | ScriptTileError::CapabilityViolation(_)
            | ScriptTileError::UndeclaredInputReference(_)
            | ScriptTileError::InvalidParameter { .. } => 400,

            ScriptTileError::DecodeFailure { .. }
            | ScriptTileError::SamplingFailure { .. }
            | ScriptTileError::RenderError(_)
            | ScriptTileError::InternalError(_) => 500,
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for ScriptTileError {
    fn from(err: std::io::Error) -> Self {
        ScriptTileError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for ScriptTileError {
    fn from(err: serde_json::Error) -> Self {
        ScriptTileError::InvalidParameter {
            param: "body".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<crate::crs::CrsParseError> for ScriptTileError {
    fn from(err: crate::crs::CrsParseError) -> Self {
        ScriptTileError::IncompatibleCrs(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ScriptTileError::EmptyIntersection.http_status_code(), 400);
        assert_eq!(
            ScriptTileError::UndeclaredInputReference("rgb".into()).http_status_code(),
            400
        );
        assert_eq!(
            ScriptTileError::SourceNotFound("file:x".into()).http_status_code(),
            404
        );
        assert_eq!(
            ScriptTileError::SamplingFailure {
                source_id: "file:x".into(),
                message: "truncated".into()
            }
            .http_status_code(),
            500
        );
    }
}
