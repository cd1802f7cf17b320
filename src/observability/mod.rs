//! Observability for the sensor node
//!
//! Structured logging configured from the environment.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
