use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Source files that could not be opened or parsed
    #[error("File access error: {0}")]
    FileAccess(String),

    /// A column required by the current stage is absent
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No model artifact is currently loaded for serving
    #[error("Model not loaded on the server")]
    ModelNotLoaded,

    /// Feature transformation or inference failed for a request
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Model fitting or hyperparameter search failed
    #[error("Training error: {0}")]
    Training(String),

    /// Model registry lookups and writes
    #[error("Registry error: {0}")]
    Registry(String),

    /// Swapping in a new model failed
    #[error("Reload error: {0}")]
    Reload(String),

    /// The retraining job could not be scheduled
    #[error("Retrain error: {0}")]
    Retrain(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingColumn(_) => StatusCode::BAD_REQUEST,
            AppError::FileAccess(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ModelNotLoaded => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Training(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Reload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Retrain(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::FileAccess(_) => "FILE_ACCESS_ERROR",
            AppError::MissingColumn(_) => "MISSING_COLUMN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::ModelNotLoaded => "MODEL_NOT_LOADED",
            AppError::Prediction(_) => "PREDICTION_ERROR",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Registry(_) => "REGISTRY_ERROR",
            AppError::Reload(_) => "RELOAD_ERROR",
            AppError::Retrain(_) => "RETRAIN_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error belongs to the model lifecycle (reload, retrain,
    /// registry) rather than to a single request
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            AppError::Reload(_) | AppError::Retrain(_) | AppError::Registry(_)
        )
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code().to_string();
        let message = self.to_string();

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&["api", &error_code])
            .inc();

        tracing::error!(
            error_code = %error_code,
            status_code = status.as_u16(),
            lifecycle = self.is_lifecycle(),
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "detail": message,
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from csv::Error
impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::FileAccess(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ModelNotLoaded.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Prediction("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::ModelNotLoaded.error_code(), "MODEL_NOT_LOADED");
        assert_eq!(
            AppError::Reload("x".to_string()).error_code(),
            "RELOAD_ERROR"
        );
        assert_eq!(
            AppError::Prediction("x".to_string()).error_code(),
            "PREDICTION_ERROR"
        );
    }

    #[test]
    fn test_lifecycle_errors_are_distinct_from_request_errors() {
        assert!(AppError::Reload("x".to_string()).is_lifecycle());
        assert!(AppError::Retrain("x".to_string()).is_lifecycle());
        assert!(!AppError::Prediction("x".to_string()).is_lifecycle());
        assert!(!AppError::ModelNotLoaded.is_lifecycle());
    }

    #[test]
    fn test_model_not_loaded_message() {
        assert!(AppError::ModelNotLoaded
            .to_string()
            .contains("Model not loaded"));
    }
}
