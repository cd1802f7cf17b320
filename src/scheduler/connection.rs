//! Pure connection state management for the run loop
//!
//! The run loop owns a single [`ConnectionState`]. Transitions are computed
//! here by pure functions so the state machine can be tested in isolation
//! from any broker I/O.

use super::SchedulerError;
use tracing::{error, info, warn};

/// Connection state held by the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and no connection attempt in flight
    Disconnected,
    /// A connect or reconnect attempt is in flight, waiting for the ConnAck
    ReconnectPending,
    /// Broker acknowledged the connection; timers may fire
    Connected,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// ConnAck received with the given result code
    ConnAck(u8),
    /// Broker or network dropped the connection
    Lost,
    /// A reconnect attempt was issued
    ReconnectStarted,
    /// The reconnect attempt failed with a transient I/O error
    ReconnectFailed,
}

/// Pure state machine for the run loop's broker connection
pub struct ConnectionMonitor;

impl ConnectionMonitor {
    /// Determine next state after connection event (pure function)
    ///
    /// A ConnAck carrying a non-zero result code is a configuration or
    /// authentication problem, not a network blip, and is never retried.
    pub fn next_state(
        current: ConnectionState,
        event: ConnectionEvent,
    ) -> Result<ConnectionState, SchedulerError> {
        let next = match event {
            ConnectionEvent::ConnAck(0) => ConnectionState::Connected,
            ConnectionEvent::ConnAck(code) => {
                error!("Broker rejected connection with result code {}", code);
                return Err(SchedulerError::BrokerRejected { code });
            }
            ConnectionEvent::Lost => ConnectionState::Disconnected,
            ConnectionEvent::ReconnectStarted => ConnectionState::ReconnectPending,
            ConnectionEvent::ReconnectFailed => ConnectionState::Disconnected,
        };
        if next != current {
            Self::log_state_transition(current, next);
        }
        Ok(next)
    }

    /// Whether timers may fire in this state (pure function)
    pub fn can_fire(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Whether the loop should issue a new connection attempt (pure function)
    pub fn needs_reconnect(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Disconnected)
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
        match (from, to) {
            (ConnectionState::ReconnectPending, ConnectionState::Connected) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected) => {
                warn!("MQTT connection lost; timers suspended until reconnected");
            }
            (ConnectionState::ReconnectPending, ConnectionState::Disconnected) => {
                warn!("MQTT connection attempt failed");
            }
            _ => {
                info!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}
