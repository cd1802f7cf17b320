//! Impure I/O operations for the MQTT broker client
//!
//! This module wraps the rumqttc client behind the [`Broker`] trait the run
//! loop drives. The rumqttc event loop runs in its own task and is never
//! interrupted mid-poll: a handshake or a partly written packet always
//! completes. Connection notices reach the run loop over a channel.

use super::connection::{configure_mqtt_options, ReconnectConfig};
use super::message_handler::MessageHandler;
use crate::config::BrokerAddress;
use crate::transport::{Broker, BrokerError, BrokerNotice};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Capacity of the request channel between client and event loop
const REQUEST_CAPACITY: usize = 64;

/// MQTT broker client driven by the run loop
pub struct MqttBroker {
    client: AsyncClient,
    notices: mpsc::UnboundedReceiver<BrokerNotice>,
    resume: Arc<Notify>,
    event_loop_task: JoinHandle<()>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
}

impl MqttBroker {
    /// Create the client and start its event loop task, which dials the
    /// broker straight away. Must be called within a Tokio runtime.
    pub fn connect(address: &BrokerAddress, client_id: &str) -> Self {
        let mqtt_options = configure_mqtt_options(address, client_id);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        info!("Connecting to MQTT broker {} as {}", address, client_id);

        let (notice_tx, notices) = mpsc::unbounded_channel();
        let resume = Arc::new(Notify::new());
        let event_loop_task = tokio::spawn(run_event_loop(event_loop, notice_tx, resume.clone()));

        Self {
            client,
            notices,
            resume,
            event_loop_task,
            reconnect_config: ReconnectConfig::default(),
            reconnect_attempts: 0,
        }
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.event_loop_task.abort();
    }
}

/// Poll the event loop to completion each time, forwarding connection
/// notices. After a drop or a refused connection the loop holds off until
/// the run loop asks for a reconnect.
async fn run_event_loop(
    mut event_loop: EventLoop,
    notices: mpsc::UnboundedSender<BrokerNotice>,
    resume: Arc<Notify>,
) {
    loop {
        let polled = event_loop.poll().await;
        let Some(notice) = MessageHandler::route_poll_result(polled) else {
            continue;
        };

        let connected = notice == BrokerNotice::ConnAck(0);
        if notices.send(notice).is_err() {
            debug!(target: "mqtt_transport", "Broker client dropped; stopping event loop");
            return;
        }
        if !connected {
            resume.notified().await;
        }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn service(&mut self, timeout: Duration) -> Result<Option<BrokerNotice>, BrokerError> {
        let notice = match tokio::time::timeout(timeout, self.notices.recv()).await {
            Ok(Some(notice)) => notice,
            Ok(None) => return Err(BrokerError::Closed("MQTT event loop stopped".to_string())),
            Err(_) => return Ok(None),
        };

        if notice == BrokerNotice::ConnAck(0) {
            self.reconnect_attempts = 0;
        }
        Ok(Some(notice))
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.client
            .try_publish(topic, MessageHandler::reading_qos(), false, payload)
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))
    }

    /// Wait out the backoff delay, then let the event loop dial again.
    async fn reconnect(&mut self) -> Result<(), BrokerError> {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        let delay_ms = self
            .reconnect_config
            .calculate_backoff_delay(self.reconnect_attempts);
        debug!(
            attempt = self.reconnect_attempts,
            delay_ms, "Scheduling MQTT reconnect"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        self.resume.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_address() -> BrokerAddress {
        BrokerAddress {
            host: "127.0.0.1".to_string(),
            port: 1,
        }
    }

    #[tokio::test]
    async fn test_publish_is_queued_without_connection() {
        let mut broker = MqttBroker::connect(&local_address(), "test-node");
        let result = broker.publish("test-node/porch", b"ON".to_vec());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_disconnect() {
        let mut broker = MqttBroker::connect(&local_address(), "test-node");
        let notice = broker.service(Duration::from_secs(10)).await.unwrap();
        assert_eq!(notice, Some(BrokerNotice::Disconnected));
    }

    #[tokio::test]
    async fn test_short_service_timeouts_do_not_restart_dialing() {
        let mut broker = MqttBroker::connect(&local_address(), "test-node");

        // Expired waits leave the dial in flight
        let mut notice = None;
        for _ in 0..200 {
            notice = broker.service(Duration::from_millis(5)).await.unwrap();
            if notice.is_some() {
                break;
            }
        }
        assert_eq!(notice, Some(BrokerNotice::Disconnected));

        // Held off until a reconnect is requested
        let idle = broker.service(Duration::from_millis(100)).await.unwrap();
        assert_eq!(idle, None);
    }

    #[tokio::test]
    async fn test_reconnect_dials_again() {
        let mut broker = MqttBroker::connect(&local_address(), "test-node")
            .with_reconnect_config(ReconnectConfig {
                backoff_pattern: vec![1],
                sustained_delay: 1,
            });
        let first = broker.service(Duration::from_secs(10)).await.unwrap();
        assert_eq!(first, Some(BrokerNotice::Disconnected));

        broker.reconnect().await.unwrap();

        let second = broker.service(Duration::from_secs(10)).await.unwrap();
        assert_eq!(second, Some(BrokerNotice::Disconnected));
    }

    #[tokio::test]
    async fn test_reconnect_counts_attempts() {
        let mut broker = MqttBroker::connect(&local_address(), "test-node")
            .with_reconnect_config(ReconnectConfig {
                backoff_pattern: vec![1, 2],
                sustained_delay: 3,
            });

        broker.reconnect().await.unwrap();
        broker.reconnect().await.unwrap();
        assert_eq!(broker.reconnect_attempts, 2);
    }
}
