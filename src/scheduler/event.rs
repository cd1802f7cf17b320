//! Timed events fired by the run loop
//!
//! An [`Event`] is a one-shot or repeating timer record. What happens when it
//! fires is described by an [`EventTarget`]: an explicit object that owns the
//! context it needs, so no closure state is hidden inside the event.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Schedule time meaning "as soon as possible".
///
/// Resolved against the run loop's clock when the event is scheduled.
pub const NOW: f64 = 0.0;

/// Shortest period a repeating event accepts, in seconds
pub const MIN_PERIOD: f64 = 0.001;

/// A repeating period that would not move the event forward
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "period {period} does not advance a repeating event starting at {start}; use at least {min} seconds",
    min = MIN_PERIOD
)]
pub struct PeriodError {
    pub start: f64,
    pub period: f64,
}

/// Check that adding `period` to `start` yields a later time.
pub fn check_period(start: f64, period: f64) -> Result<(), PeriodError> {
    if period.is_finite() && period >= MIN_PERIOD && start + period > start {
        Ok(())
    } else {
        Err(PeriodError { start, period })
    }
}

/// Action performed when an event fires
pub trait EventTarget: Send + Sync {
    /// Perform the event's side effect
    fn on_fire(&self);
}

/// A timer record ordered by its next firing time
///
/// Events compare by `next_fire` only. Two events due at the same instant are
/// equal for queue purposes and fire in no particular order relative to each
/// other.
#[derive(Clone)]
pub struct Event {
    next_fire: f64,
    repeats: bool,
    period: f64,
    target: Option<Arc<dyn EventTarget>>,
}

impl Event {
    /// Create an event that fires once at time `t` (seconds since the epoch,
    /// or [`NOW`]).
    pub fn once(t: f64, target: Option<Arc<dyn EventTarget>>) -> Self {
        Self {
            next_fire: t,
            repeats: false,
            period: 0.0,
            target,
        }
    }

    /// Create an event that first fires at `t`, then every `period` seconds.
    ///
    /// Fails when the period is too small to advance the fire time.
    pub fn repeating(
        t: f64,
        period: f64,
        target: Option<Arc<dyn EventTarget>>,
    ) -> Result<Self, PeriodError> {
        check_period(t, period)?;
        Ok(Self {
            next_fire: t,
            repeats: true,
            period,
            target,
        })
    }

    /// Absolute time (seconds since the epoch) at which the event is due, or
    /// [`NOW`] until it is scheduled
    pub fn next_fire(&self) -> f64 {
        self.next_fire
    }

    /// Whether the run loop re-queues this event after it fires
    pub fn repeats(&self) -> bool {
        self.repeats
    }

    /// Re-arm period in seconds; zero for one-shot events
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Whether both events drive the same target object
    pub fn same_target(&self, other: &Event) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Run the target, then advance a repeating event by one period.
    ///
    /// The new fire time is relative to the scheduled time, not to when the
    /// event actually ran, so lateness never accumulates across periods.
    pub fn fire(&mut self) {
        if let Some(target) = &self.target {
            target.on_fire();
        }
        if self.repeats {
            self.next_fire += self.period;
        }
    }
}

impl Event {
    /// Pin an event scheduled at [`NOW`] to `now`. Literal times are kept.
    pub(crate) fn resolve_now(&mut self, now: f64) {
        if self.next_fire == NOW {
            self.next_fire = now;
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("next_fire", &self.next_fire)
            .field("repeats", &self.repeats)
            .field("period", &self.period)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_fire.total_cmp(&other.next_fire)
    }
}
