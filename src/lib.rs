//! hasensor - multi-sensor node for Home Assistant
//!
//! A small daemon that reads local sensors on a schedule and publishes the
//! readings to an MQTT broker, optionally announcing itself through Home
//! Assistant discovery.
//!
//! # Overview
//!
//! - [`scheduler`] - the cooperative run loop: timed events, broker I/O and
//!   connection recovery
//! - [`sensor`] - the sensor contract, typed description arguments and the
//!   type registry
//! - [`sensors`] - built-in sensor types
//! - [`transport`] - the broker client abstraction and its MQTT implementation
//! - [`config`] - command-line and TOML configuration
//!
//! # Quick Start
//!
//! ```rust
//! use hasensor::scheduler::LoopHandle;
//! use hasensor::sensor::SensorRegistry;
//!
//! let registry = SensorRegistry::with_builtin_sensors().unwrap();
//! let sensor = registry
//!     .create_sensor("announcer:name=porch:period=60:value=ON")
//!     .unwrap();
//!
//! let (handle, _outbox) = LoopHandle::channel("sensor_pi");
//! sensor.set_loop(handle).unwrap();
//!
//! let event = sensor.event().unwrap();
//! assert!(event.repeats());
//! assert_eq!(event.period(), 60.0);
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod node;
pub mod observability;
pub mod scheduler;
pub mod sensor;
pub mod sensors;
pub mod testing;
pub mod transport;

pub use config::{BrokerAddress, CliArgs, ConfigError, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use scheduler::{Event, EventTarget, LoopHandle, Scheduler, NOW};
pub use sensor::{Sensor, SensorError, SensorHandle, SensorRegistry};
pub use transport::mqtt::MqttBroker;
pub use transport::Broker;
