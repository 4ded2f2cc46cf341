//! Supervision engine for drover
//!
//! This crate holds the process registry, the per-process lifecycle
//! supervisors, the restart policy engine and the log distributor, tied
//! together by the [`ProcessManager`] facade used by the daemon.

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
#[cfg(unix)]
pub mod process;
pub mod registry;
pub mod supervisor;

// Re-export schema types for convenience
pub use schema::*;

pub use error::{CoreError, Result};
pub use logging::{LogDistributor, LogEntry, LogSubscription, MAX_LINE_BYTES};
pub use manager::{ManagerConfig, ProcessManager};
pub use registry::{ProcessRecord, ProcessRegistry};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level`.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_tracing_init_fails() {
        let _ = utils::init_tracing("warn");
        let err = utils::init_tracing("warn").unwrap_err();
        assert_eq!(err.code(), "CORE003");
    }
}
