//! Core error types and utilities

use schema::Response;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Process '{0}' already exists")]
    AlreadyExists(String),

    #[error("Process '{0}' not found")]
    NotFound(String),

    #[error("Process '{0}' is not running")]
    NotRunning(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Unrecognized restart policy '{0}'")]
    PolicyUnrecognized(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::ServiceError(_) => "CORE004",
            CoreError::Io(_) => "CORE005",
            CoreError::Serialization(_) => "CORE006",
            CoreError::AlreadyExists(_) => "CORE010",
            CoreError::NotFound(_) => "CORE011",
            CoreError::NotRunning(_) => "CORE012",
            CoreError::InvalidState(_) => "CORE013",
            CoreError::SpawnFailed(_) => "CORE014",
            CoreError::PolicyUnrecognized(_) => "CORE015",
            CoreError::ProcessWait(_) => "CORE016",
            CoreError::ProcessSignal(_) => "CORE017",
        }
    }
}

impl From<&CoreError> for Response {
    fn from(err: &CoreError) -> Self {
        Response::Error {
            message: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }
}

impl From<CoreError> for Response {
    fn from(err: CoreError) -> Self {
        Response::from(&err)
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::ConfigurationError("test".to_string()).code(), "CORE001");
        assert_eq!(CoreError::ValidationError("test".to_string()).code(), "CORE002");
        assert_eq!(CoreError::AlreadyExists("a".to_string()).code(), "CORE010");
        assert_eq!(CoreError::NotFound("a".to_string()).code(), "CORE011");
        assert_eq!(CoreError::NotRunning("a".to_string()).code(), "CORE012");
        assert_eq!(CoreError::InvalidState("a".to_string()).code(), "CORE013");
    }

    #[test]
    fn test_error_display() {
        let error = CoreError::AlreadyExists("pinger".to_string());
        assert_eq!(error.to_string(), "Process 'pinger' already exists");

        let error = CoreError::NotRunning("pinger".to_string());
        assert_eq!(error.to_string(), "Process 'pinger' is not running");
    }

    #[test]
    fn test_from_std_errors() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
        assert_eq!(core_err.code(), "CORE005");

        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let core_err: CoreError = serde_err.into();
        assert!(matches!(core_err, CoreError::Serialization(_)));
    }

    #[test]
    fn test_into_error_response() {
        let response = Response::from(CoreError::NotFound("ghost".to_string()));
        match response {
            Response::Error { message, code } => {
                assert_eq!(message, "Process 'ghost' not found");
                assert_eq!(code.as_deref(), Some("CORE011"));
            }
            other => panic!("expected error response, got {:?}", other),
        }
    }
}
