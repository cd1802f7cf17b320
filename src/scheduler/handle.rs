//! Thread-safe publishing into the run loop
//!
//! Sensors never touch the broker client. They hold a [`LoopHandle`], which
//! queues messages on a channel that the run loop drains between firings.
//! Background threads owned by sensor drivers publish the same way.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A message waiting to be handed to the broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Receiving end of a loop handle's queue
pub type OutboxReceiver = mpsc::UnboundedReceiver<Outgoing>;

/// Cloneable handle for publishing through a run loop
#[derive(Debug, Clone)]
pub struct LoopHandle {
    prefix: Arc<str>,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl LoopHandle {
    /// Create a handle and the receiver its messages arrive on
    pub fn channel(prefix: &str) -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                prefix: Arc::from(prefix),
                tx,
            },
            rx,
        )
    }

    pub(crate) fn from_sender(prefix: &str, tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            prefix: Arc::from(prefix),
            tx,
        }
    }

    /// Topic prefix this handle publishes under
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Publish under `{prefix}/{subtopic}`
    pub fn publish(&self, subtopic: &str, payload: impl Into<Vec<u8>>) {
        let topic = compose_topic(&self.prefix, subtopic);
        self.publish_raw(&topic, payload);
    }

    /// Publish on an absolute topic, outside the node's prefix
    pub fn publish_raw(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let message = Outgoing {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        if self.tx.send(message).is_err() {
            debug!("Run loop is gone; dropping message for {}", topic);
        }
    }
}

/// Build a topic from the node prefix and a sensor sub-topic
pub fn compose_topic(prefix: &str, subtopic: &str) -> String {
    format!("{prefix}/{subtopic}")
}
