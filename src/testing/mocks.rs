//! Mock implementations for testing
//!
//! Provides a scripted [`MockBroker`] and a [`ManualClock`] so the run loop
//! can be exercised deterministically without a broker or real sleeps. Every
//! idle wait on the mock advances the manual clock by the full timeout the
//! loop asked for.

use crate::scheduler::{epoch_now, Clock, EventTarget};
use crate::transport::{Broker, BrokerError, BrokerNotice};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Simulated time source, shared between clones
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Start at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(epoch_now())
    }

    pub fn advance(&self, secs: f64) {
        *lock(&self.now) += secs;
    }

    pub fn set(&self, t: f64) {
        *lock(&self.now) = t;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *lock(&self.now)
    }
}

/// One scripted response to [`Broker::service`]
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return a connection notice immediately
    Notice(BrokerNotice),
    /// Let the whole timeout elapse with no notice
    Idle,
    /// Let `secs` elapse (capped at the timeout) with no notice
    Elapse(f64),
    /// Fail with a transient I/O error
    IoError,
}

/// Message recorded by the mock broker
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub at: f64,
    pub connected: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).to_string()
    }
}

#[derive(Debug, Default)]
struct MockBrokerState {
    connected: bool,
    published: Vec<PublishedMessage>,
    service_timeouts: Vec<Duration>,
    reconnects: usize,
}

/// Shared view into a [`MockBroker`], usable after the broker moved into a
/// run loop
#[derive(Debug, Clone)]
pub struct MockBrokerProbe {
    state: Arc<Mutex<MockBrokerState>>,
}

impl MockBrokerProbe {
    /// Whether the last notice handed to the loop left it connected
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    pub fn service_calls(&self) -> usize {
        lock(&self.state).service_timeouts.len()
    }

    pub fn service_timeouts(&self) -> Vec<Duration> {
        lock(&self.state).service_timeouts.clone()
    }

    pub fn reconnects(&self) -> usize {
        lock(&self.state).reconnects
    }
}

/// Scripted broker client
///
/// When the script runs out, [`Broker::service`] fails with
/// [`BrokerError::Closed`], which ends the run loop.
#[derive(Debug)]
pub struct MockBroker {
    clock: ManualClock,
    script: VecDeque<ScriptStep>,
    failing_reconnects: usize,
    state: Arc<Mutex<MockBrokerState>>,
}

impl MockBroker {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            script: VecDeque::new(),
            failing_reconnects: 0,
            state: Arc::new(Mutex::new(MockBrokerState::default())),
        }
    }

    /// Broker that accepts the initial connection, then idles `idle_steps` times
    pub fn connected(clock: ManualClock, idle_steps: usize) -> Self {
        let mut broker = Self::new(clock).then(ScriptStep::Notice(BrokerNotice::ConnAck(0)));
        for _ in 0..idle_steps {
            broker = broker.then(ScriptStep::Idle);
        }
        broker
    }

    pub fn then(mut self, step: ScriptStep) -> Self {
        self.script.push_back(step);
        self
    }

    pub fn then_idle(mut self, steps: usize) -> Self {
        self.script.extend(std::iter::repeat(ScriptStep::Idle).take(steps));
        self
    }

    /// Make the next `count` reconnect attempts fail with a transient error
    pub fn with_failing_reconnects(mut self, count: usize) -> Self {
        self.failing_reconnects = count;
        self
    }

    pub fn probe(&self) -> MockBrokerProbe {
        MockBrokerProbe {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn service(&mut self, timeout: Duration) -> Result<Option<BrokerNotice>, BrokerError> {
        lock(&self.state).service_timeouts.push(timeout);

        match self.script.pop_front() {
            Some(ScriptStep::Notice(notice)) => {
                let mut state = lock(&self.state);
                match notice {
                    BrokerNotice::ConnAck(0) => state.connected = true,
                    _ => state.connected = false,
                }
                Ok(Some(notice))
            }
            Some(ScriptStep::Idle) => {
                self.clock.advance(timeout.as_secs_f64());
                Ok(None)
            }
            Some(ScriptStep::Elapse(secs)) => {
                self.clock.advance(secs.min(timeout.as_secs_f64()));
                Ok(None)
            }
            Some(ScriptStep::IoError) => {
                lock(&self.state).connected = false;
                Err(BrokerError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "scripted connection reset",
                )))
            }
            None => Err(BrokerError::Closed("mock script exhausted".to_string())),
        }
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let at = self.clock.now();
        let mut state = lock(&self.state);
        let connected = state.connected;
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            at,
            connected,
        });
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), BrokerError> {
        lock(&self.state).reconnects += 1;
        if self.failing_reconnects > 0 {
            self.failing_reconnects -= 1;
            return Err(BrokerError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted reconnect failure",
            )));
        }
        Ok(())
    }
}

/// Firing observed by a [`RecordingTarget`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Firing {
    pub at: f64,
    pub connected: bool,
}

/// Event target that records when it fired and whether the mock broker was
/// connected at that moment
#[derive(Debug)]
pub struct RecordingTarget {
    clock: ManualClock,
    probe: MockBrokerProbe,
    firings: Mutex<Vec<Firing>>,
}

impl RecordingTarget {
    pub fn new(clock: ManualClock, probe: MockBrokerProbe) -> Arc<Self> {
        Arc::new(Self {
            clock,
            probe,
            firings: Mutex::new(Vec::new()),
        })
    }

    pub fn firings(&self) -> Vec<Firing> {
        lock(&self.firings).clone()
    }
}

impl EventTarget for RecordingTarget {
    fn on_fire(&self) {
        let firing = Firing {
            at: self.clock.now(),
            connected: self.probe.is_connected(),
        };
        lock(&self.firings).push(firing);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
