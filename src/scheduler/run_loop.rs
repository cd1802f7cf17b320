//! The scheduler: a single-task loop that fires due events and otherwise
//! waits on broker I/O
//!
//! Firing is always gated on being connected. While the broker connection is
//! down, events are deferred rather than dropped, so they can become
//! arbitrarily overdue; once the connection returns, every overdue event
//! fires back to back, including repeated catch-up firings of a repeating
//! event whose period elapsed several times.

use super::clock::{Clock, SystemClock};
use super::connection::{ConnectionEvent, ConnectionMonitor, ConnectionState};
use super::event::Event;
use super::handle::{compose_topic, LoopHandle, Outgoing};
use super::SchedulerError;
use crate::transport::{Broker, BrokerError, BrokerNotice};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Longest single wait on broker I/O, so the client keeps servicing its
/// keep-alives even when the next event is far away
pub const MAX_WAIT: Duration = Duration::from_secs(15);

/// Wait used while a connection attempt is in flight
pub const RECONNECT_POLL: Duration = Duration::from_millis(500);

/// Why a bounded wait returned
enum Wake {
    Serviced(Result<Option<BrokerNotice>, BrokerError>),
    Outgoing(Outgoing),
}

/// Cooperative run loop owning the event queue and the broker client
pub struct Scheduler<B: Broker, C: Clock = SystemClock> {
    broker: B,
    clock: C,
    prefix: String,
    queue: BinaryHeap<Reverse<Event>>,
    state: ConnectionState,
    outbox_tx: mpsc::UnboundedSender<Outgoing>,
    outbox_rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl<B: Broker> Scheduler<B, SystemClock> {
    /// Create a run loop around a broker client whose first connection
    /// attempt is already in flight
    pub fn new(broker: B, prefix: &str) -> Self {
        Self::with_clock(broker, SystemClock, prefix)
    }
}

impl<B: Broker, C: Clock> Scheduler<B, C> {
    pub fn with_clock(broker: B, clock: C, prefix: &str) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            broker,
            clock,
            prefix: prefix.to_string(),
            queue: BinaryHeap::new(),
            state: ConnectionState::ReconnectPending,
            outbox_tx,
            outbox_rx,
        }
    }

    /// Handle for publishing through this loop from sensors or other threads
    pub fn handle(&self) -> LoopHandle {
        LoopHandle::from_sender(&self.prefix, self.outbox_tx.clone())
    }

    /// Topic prefix for sensor publishes
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Current broker connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Number of events waiting in the queue
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Add an event to the schedule. An event at [`NOW`](super::NOW) is
    /// pinned to the loop's current time.
    pub fn schedule(&mut self, mut event: Event) {
        event.resolve_now(self.clock.now());
        debug!(next_fire = event.next_fire(), repeats = event.repeats(), "Scheduling event");
        self.queue.push(Reverse(event));
    }

    /// Publish under `{prefix}/{subtopic}`
    pub fn publish(&mut self, subtopic: &str, payload: impl Into<Vec<u8>>) {
        let topic = compose_topic(&self.prefix, subtopic);
        self.send(Outgoing {
            topic,
            payload: payload.into(),
        });
    }

    /// Publish on an absolute topic
    pub fn publish_raw(&mut self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.send(Outgoing {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }

    /// Run until the queue drains or the broker client fails unrecoverably.
    ///
    /// Returns immediately when nothing is scheduled.
    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        let Some(Reverse(mut head)) = self.queue.pop() else {
            debug!("No events scheduled; run loop not started");
            return Ok(());
        };
        info!(events = self.queue.len() + 1, "Run loop started");

        loop {
            if !ConnectionMonitor::can_fire(self.state) {
                self.wait(RECONNECT_POLL).await?;
                if ConnectionMonitor::needs_reconnect(self.state) {
                    self.try_reconnect().await?;
                }
                continue;
            }

            let now = self.clock.now();
            while head.next_fire() <= now {
                self.process(head);
                match self.queue.pop() {
                    Some(Reverse(next)) => head = next,
                    None => {
                        info!("Event queue drained; run loop exiting");
                        return Ok(());
                    }
                }
            }

            let sleep_for = (head.next_fire() - now).min(MAX_WAIT.as_secs_f64());
            self.wait(Duration::from_secs_f64(sleep_for)).await?;
        }
    }

    /// Service the broker with nothing scheduled: one bounded wait, then a
    /// reconnect if the connection is down.
    ///
    /// Keeps publishes from background sensor work flowing after the queue
    /// has drained.
    pub async fn service_idle(&mut self) -> Result<(), SchedulerError> {
        let timeout = if ConnectionMonitor::can_fire(self.state) {
            MAX_WAIT
        } else {
            RECONNECT_POLL
        };
        self.wait(timeout).await?;
        if ConnectionMonitor::needs_reconnect(self.state) {
            self.try_reconnect().await?;
        }
        Ok(())
    }

    /// Fire one event, flush what it published, and re-queue it if it repeats.
    fn process(&mut self, mut event: Event) {
        debug!(due = event.next_fire(), "Firing event");
        event.fire();
        self.drain_outbox();
        if event.repeats() {
            self.schedule(event);
        }
    }

    /// Wait on broker I/O for at most `timeout`, waking early for queued
    /// publishes.
    async fn wait(&mut self, timeout: Duration) -> Result<(), SchedulerError> {
        let woke = tokio::select! {
            serviced = self.broker.service(timeout) => Wake::Serviced(serviced),
            Some(message) = self.outbox_rx.recv() => Wake::Outgoing(message),
        };

        match woke {
            Wake::Serviced(Ok(Some(notice))) => self.on_notice(notice).await,
            Wake::Serviced(Ok(None)) => Ok(()),
            Wake::Serviced(Err(e)) if e.is_transient() => {
                debug!("Transient broker error while servicing I/O: {}", e);
                self.on_notice(BrokerNotice::Disconnected).await
            }
            Wake::Serviced(Err(e)) => Err(e.into()),
            Wake::Outgoing(message) => {
                self.send(message);
                self.drain_outbox();
                Ok(())
            }
        }
    }

    async fn on_notice(&mut self, notice: BrokerNotice) -> Result<(), SchedulerError> {
        match notice {
            BrokerNotice::ConnAck(code) => {
                self.state =
                    ConnectionMonitor::next_state(self.state, ConnectionEvent::ConnAck(code))?;
                Ok(())
            }
            BrokerNotice::Disconnected => {
                self.state = ConnectionMonitor::next_state(self.state, ConnectionEvent::Lost)?;
                self.try_reconnect().await
            }
        }
    }

    /// Issue a reconnect. Transient failures leave the loop disconnected so
    /// it retries after the next bounded wait.
    async fn try_reconnect(&mut self) -> Result<(), SchedulerError> {
        self.state =
            ConnectionMonitor::next_state(self.state, ConnectionEvent::ReconnectStarted)?;
        match self.broker.reconnect().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!("Reconnect attempt failed: {}", e);
                self.state =
                    ConnectionMonitor::next_state(self.state, ConnectionEvent::ReconnectFailed)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn drain_outbox(&mut self) {
        while let Ok(message) = self.outbox_rx.try_recv() {
            self.send(message);
        }
    }

    fn send(&mut self, message: Outgoing) {
        if let Err(e) = self.broker.publish(&message.topic, message.payload) {
            warn!("Dropping message for {}: {}", message.topic, e);
        }
    }
}
