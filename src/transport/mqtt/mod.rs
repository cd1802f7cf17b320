//! MQTT broker client for the run loop
//!
//! # Architecture
//!
//! The module is split into three focused sub-modules:
//!
//! - [`connection`] - Pure client options and reconnection backoff
//! - [`message_handler`] - Pure routing of event loop results into notices
//! - [`client`] - Impure I/O over the rumqttc client and event loop

pub mod client;
pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use client::MqttBroker;
pub use connection::{configure_mqtt_options, ReconnectConfig};
pub use message_handler::MessageHandler;
