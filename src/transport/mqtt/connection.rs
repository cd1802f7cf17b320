//! Pure connection configuration for the MQTT broker client
//!
//! This module contains pure functions for client options and the
//! reconnection backoff schedule.

use crate::config::BrokerAddress;
use rumqttc::v5::MqttOptions;
use std::time::Duration;

/// Keep-alive interval negotiated with the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Reconnection backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds, indexed by attempt number
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2000], // 250ms, 500ms, 1s, 2s pattern
            sustained_delay: 5000,                       // Stay at 5s after pattern exhausted
        }
    }
}

impl ReconnectConfig {
    /// Calculate backoff delay for given attempt (1-based) using the pattern
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// Pure function to configure MQTT options for a broker address
pub fn configure_mqtt_options(address: &BrokerAddress, client_id: &str) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(client_id, address.host.clone(), address.port);
    mqtt_options.set_keep_alive(KEEP_ALIVE);
    mqtt_options
}
