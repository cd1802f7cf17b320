//! Cooperative run loop
//!
//! The run loop interleaves time-ordered event firing with bounded waits on
//! broker I/O, and owns the broker connection state machine.
//!
//! # Architecture
//!
//! - [`event`] - one-shot and repeating timer records
//! - [`clock`] - time source
//! - [`connection`] - pure connection state machine
//! - [`handle`] - thread-safe publishing into the loop
//! - [`run_loop`] - the scheduler itself

pub mod clock;
pub mod connection;
pub mod event;
pub mod handle;
pub mod run_loop;

use crate::transport::BrokerError;
use thiserror::Error;

pub use clock::{epoch_now, Clock, SystemClock};
pub use connection::{ConnectionEvent, ConnectionMonitor, ConnectionState};
pub use event::{check_period, Event, EventTarget, PeriodError, MIN_PERIOD, NOW};
pub use handle::{compose_topic, LoopHandle, OutboxReceiver, Outgoing};
pub use run_loop::Scheduler;

/// Fatal run loop errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Broker rejected the connection (result code {code}); check broker address, client id and credentials")]
    BrokerRejected { code: u8 },
    #[error("Unrecoverable broker client error: {0}")]
    Broker(#[from] BrokerError),
}
