//! CLI error types

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The daemon rejected the request
    #[error("{message}")]
    Daemon {
        message: String,
        code: Option<String>,
    },

    #[error("Unexpected response from daemon: {0}")]
    UnexpectedResponse(String),

    #[error("IPC error: {0}")]
    IpcError(#[from] ipc::IpcError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &str {
        match self {
            CliError::CommandFailed(_) => "CLI001",
            CliError::InvalidArgument(_) => "CLI002",
            CliError::Daemon { code, .. } => code.as_deref().unwrap_or("CLI005"),
            CliError::UnexpectedResponse(_) => "CLI006",
            CliError::IpcError(e) => e.code(),
            CliError::IoError(_) => "CLI008",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
