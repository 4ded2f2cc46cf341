//! Daemon error types

use drover_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ipc(#[from] ipc::IpcError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DaemonError {
    pub fn code(&self) -> &str {
        match self {
            DaemonError::ServerError(_) => "DAEMON001",
            DaemonError::ConnectionError(_) => "DAEMON002",
            DaemonError::Core(e) => e.code(),
            DaemonError::Ipc(e) => e.code(),
            DaemonError::Io(_) => "DAEMON003",
            DaemonError::Serialization(_) => "DAEMON004",
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_codes() {
        let err = DaemonError::ServerError("bind failed".to_string());
        assert_eq!(err.to_string(), "Server error: bind failed");
        assert_eq!(err.code(), "DAEMON001");

        let err: DaemonError = CoreError::NotFound("web".to_string()).into();
        assert_eq!(err.to_string(), "Process 'web' not found");
        assert_eq!(err.code(), "CORE011");

        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: DaemonError = io.into();
        assert!(err.to_string().contains("in use"));
        assert_eq!(err.code(), "DAEMON003");

        let err: DaemonError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert_eq!(err.code(), "DAEMON004");
    }
}
