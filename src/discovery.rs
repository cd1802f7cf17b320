//! Home Assistant discovery announcement
//!
//! A discoverable node advertises an `Online` binary sensor whose state topic
//! is `{prefix}/state`. The announcement goes out at start-up and is repeated
//! every `discovery_interval` seconds so a restarted Home Assistant picks the
//! node up again.

use crate::config::NodeConfig;
use crate::scheduler::{Event, EventTarget, LoopHandle, PeriodError, NOW};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
struct DiscoveryConfig<'a> {
    state_topic: String,
    name: &'a str,
}

/// Topic the discovery config is published on
pub fn discovery_topic(discovery_prefix: &str, node: &str) -> String {
    format!("{discovery_prefix}/binary_sensor/{node}Online/config")
}

/// Discovery config payload for a node
pub fn discovery_payload(prefix: &str, node: &str) -> String {
    let name = format!("{node} Online");
    let config = DiscoveryConfig {
        state_topic: format!("{prefix}/state"),
        name: &name,
    };
    // Serializing two strings cannot fail
    serde_json::to_string(&config).unwrap_or_default()
}

/// Publishes the discovery config each time its event fires
#[derive(Debug)]
pub struct DiscoveryAnnouncer {
    handle: LoopHandle,
    topic: String,
    payload: String,
}

impl DiscoveryAnnouncer {
    pub fn new(config: &NodeConfig, handle: LoopHandle) -> Self {
        Self {
            topic: discovery_topic(&config.discovery_prefix, &config.discovery_node),
            payload: discovery_payload(&config.prefix, &config.discovery_node),
            handle,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl EventTarget for DiscoveryAnnouncer {
    fn on_fire(&self) {
        info!(topic = %self.topic, "Announcing node to Home Assistant");
        self.handle.publish_raw(&self.topic, self.payload.as_str());
    }
}

/// Event announcing the node now and then every `discovery_interval`
/// seconds; an interval of zero announces once.
pub fn discovery_event(config: &NodeConfig, handle: LoopHandle) -> Result<Event, PeriodError> {
    let target: Arc<dyn EventTarget> = Arc::new(DiscoveryAnnouncer::new(config, handle));
    if config.discovery_interval == 0 {
        Ok(Event::once(NOW, Some(target)))
    } else {
        Event::repeating(NOW, config.discovery_interval as f64, Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval: u64) -> NodeConfig {
        NodeConfig {
            prefix: "sensor_pi".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            discovery_node: "garage".to_string(),
            discovery_interval: interval,
            discoverable: true,
            ..NodeConfig::default()
        }
    }

    #[test]
    fn test_discovery_topic() {
        assert_eq!(
            discovery_topic("homeassistant", "garage"),
            "homeassistant/binary_sensor/garageOnline/config"
        );
    }

    #[test]
    fn test_discovery_payload() {
        assert_eq!(
            discovery_payload("sensor_pi", "garage"),
            r#"{"state_topic":"sensor_pi/state","name":"garage Online"}"#
        );
    }

    #[test]
    fn test_announcer_publishes_raw_topic() {
        let (handle, mut rx) = LoopHandle::channel("sensor_pi");
        let announcer = DiscoveryAnnouncer::new(&config(60), handle);

        announcer.on_fire();

        let message = rx.try_recv().unwrap();
        assert_eq!(message.topic, "homeassistant/binary_sensor/garageOnline/config");
        assert_eq!(message.payload, announcer.payload().as_bytes().to_vec());
    }

    #[test]
    fn test_interval_sets_repeat() {
        let (handle, _rx) = LoopHandle::channel("sensor_pi");
        let event = discovery_event(&config(3600), handle).unwrap();
        assert!(event.repeats());
        assert_eq!(event.period(), 3600.0);
    }

    #[test]
    fn test_zero_interval_announces_once() {
        let (handle, _rx) = LoopHandle::channel("sensor_pi");
        let event = discovery_event(&config(0), handle).unwrap();
        assert!(!event.repeats());
    }
}
