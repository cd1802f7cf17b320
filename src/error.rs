//! Crate-wide error type for the sensor node
//!
//! Each subsystem owns its own error enum; this module folds them into a
//! single [`NodeError`] so the binary can report any start-up or run-time
//! failure with one human-readable message and a non-zero exit.

use crate::config::ConfigError;
use crate::scheduler::{PeriodError, SchedulerError};
use crate::sensor::registry::RegistryError;
use crate::sensor::SensorError;
use crate::transport::BrokerError;
use thiserror::Error;

/// Main error type for sensor node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sensor registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Invalid schedule: {0}")]
    Schedule(#[from] PeriodError),

    #[error("Run loop error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NodeError {
    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error happened while assembling the node, before the run
    /// loop started.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            NodeError::Config(_)
                | NodeError::Registry(_)
                | NodeError::Sensor(_)
                | NodeError::Schedule(_)
        )
    }
}

/// Result type for sensor node operations
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_converts() {
        let error: NodeError = RegistryError::UnknownSensorType("bogus".to_string()).into();
        assert!(matches!(error, NodeError::Registry(_)));
        assert!(error.to_string().contains("bogus"));
        assert!(error.is_startup_error());
    }

    #[test]
    fn test_scheduler_error_is_not_startup() {
        let error: NodeError = SchedulerError::BrokerRejected { code: 5 }.into();
        assert!(!error.is_startup_error());
        assert!(error.to_string().contains('5'));
    }

    #[test]
    fn test_config_error_converts() {
        let error: NodeError = ConfigError::BadBrokerAddress("a:b:c".to_string()).into();
        assert!(error.is_startup_error());
        assert!(error.to_string().contains("a:b:c"));
    }

    #[test]
    fn test_internal_constructor() {
        let error = NodeError::internal("unexpected state");
        assert!(matches!(error, NodeError::Internal { .. }));
        assert_eq!(error.to_string(), "Internal error: unexpected state");
    }
}
