//! Broker transport for the run loop
//!
//! This module provides the broker client abstraction the run loop drives,
//! and an MQTT implementation of it.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Connection notification observed while servicing broker I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerNotice {
    /// Connection handshake finished with the given result code (0 = accepted)
    ConnAck(u8),
    /// The connection dropped
    Disconnected,
}

/// Broker client contract consumed by the run loop
///
/// This trait abstracts the broker client so the run loop can be driven by a
/// real MQTT connection or a scripted test double.
#[async_trait]
pub trait Broker: Send {
    /// Service network I/O for at most `timeout`.
    ///
    /// Returns early with the first connection notice observed, or `None`
    /// once the timeout elapses or unrelated traffic was processed.
    async fn service(&mut self, timeout: Duration) -> Result<Option<BrokerNotice>, BrokerError>;

    /// Queue a message for publication without waiting for acknowledgement
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Start a new connection attempt; completion is reported through
    /// [`Broker::service`]
    async fn reconnect(&mut self) -> Result<(), BrokerError>;
}

/// Broker client errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
    #[error("Broker client closed: {0}")]
    Closed(String),
}

impl BrokerError {
    /// Whether retrying later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Io(_) | BrokerError::PublishFailed(_))
    }
}
