//! Sensor capability contract
//!
//! Every sensor carries a [`SensorBase`] (name, first fire time, period and
//! the loop it publishes through) and implements [`Sensor::fire`]. A sensor
//! is wrapped in a [`SensorHandle`] once constructed; the handle binds it to
//! a run loop and hands out the single [`Event`] that drives it.

pub mod args;
pub mod registry;

use crate::scheduler::{check_period, Event, EventTarget, LoopHandle, NOW};
use args::{ArgSchema, ArgSpec, ArgType, TypedArgs};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use registry::{RegistryError, SensorConstructor, SensorDescriptor, SensorRegistry};

/// Sensor errors
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Sensor is not bound to a run loop")]
    NoLoopBound,
    #[error("Sensor is already bound to a run loop")]
    AlreadyBound,
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("Failed to read sensor: {0}")]
    Read(String),
    #[error("Failed to start sensor driver: {0}")]
    Spawn(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by every sensor
#[derive(Debug, Clone)]
pub struct SensorBase {
    /// Sub-topic the sensor publishes under
    pub name: String,
    /// First fire time, or [`NOW`]
    pub start: f64,
    /// Seconds between readings; zero reads once
    pub period: f64,
    loop_handle: Option<LoopHandle>,
}

impl SensorBase {
    pub const DEFAULT_NAME: &'static str = "Sensor";

    /// Arguments every sensor type accepts
    pub const ARGS: ArgSchema = &[
        ArgSpec::new("name", ArgType::Str),
        ArgSpec::new("start", ArgType::Time),
        ArgSpec::new("period", ArgType::Float),
    ];

    pub fn new(name: &str, start: f64, period: f64) -> Result<Self, SensorError> {
        if !period.is_finite() || period < 0.0 {
            return Err(SensorError::InvalidSchedule(format!(
                "period must be a non-negative number of seconds, got {period}"
            )));
        }
        if !start.is_finite() || start < 0.0 {
            return Err(SensorError::InvalidSchedule(format!(
                "start must be NOW or a time in seconds, got {start}"
            )));
        }
        if period != 0.0 {
            check_period(start, period)
                .map_err(|e| SensorError::InvalidSchedule(e.to_string()))?;
        }
        Ok(Self {
            name: name.to_string(),
            start,
            period,
            loop_handle: None,
        })
    }

    /// Build the base from typed arguments, defaulting missing ones
    pub fn from_args(args: &TypedArgs) -> Result<Self, SensorError> {
        Self::new(
            args.str("name").unwrap_or(Self::DEFAULT_NAME),
            args.float("start").unwrap_or(NOW),
            args.float("period").unwrap_or(0.0),
        )
    }

    pub fn is_bound(&self) -> bool {
        self.loop_handle.is_some()
    }

    /// The loop this sensor publishes through
    pub fn loop_handle(&self) -> Result<&LoopHandle, SensorError> {
        self.loop_handle.as_ref().ok_or(SensorError::NoLoopBound)
    }

    fn bind(&mut self, handle: LoopHandle) -> Result<(), SensorError> {
        if self.loop_handle.is_some() {
            return Err(SensorError::AlreadyBound);
        }
        self.loop_handle = Some(handle);
        Ok(())
    }

    /// Publish a reading under `{prefix}/{name}`
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> Result<(), SensorError> {
        self.loop_handle()?.publish(&self.name, payload);
        Ok(())
    }
}

/// A source of readings
pub trait Sensor: Send {
    fn base(&self) -> &SensorBase;

    fn base_mut(&mut self) -> &mut SensorBase;

    /// Called once, right after the sensor is bound to a run loop
    fn on_bind(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Take one reading and publish it
    fn fire(&mut self) -> Result<(), SensorError>;

    /// Whether background work started by the sensor is still publishing
    /// through the loop, independent of its timer event
    fn keeps_alive(&self) -> bool {
        false
    }
}

/// The plain `sensor` type: fires on schedule without publishing
#[derive(Debug)]
pub struct BaseSensor {
    base: SensorBase,
}

impl BaseSensor {
    pub fn construct(args: &TypedArgs) -> Result<Box<dyn Sensor>, SensorError> {
        Ok(Box::new(Self {
            base: SensorBase::from_args(args)?,
        }))
    }

    pub fn descriptor() -> SensorDescriptor {
        SensorDescriptor::base(Self::construct)
    }
}

impl Sensor for BaseSensor {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn fire(&mut self) -> Result<(), SensorError> {
        info!(sensor = %self.base.name, "Base sensor fired");
        Ok(())
    }
}

/// Event target wrapping a sensor; fire errors are logged, never raised
struct SensorCell(Mutex<Box<dyn Sensor>>);

impl SensorCell {
    fn lock(&self) -> MutexGuard<'_, Box<dyn Sensor>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventTarget for SensorCell {
    fn on_fire(&self) {
        let mut sensor = self.lock();
        if let Err(e) = sensor.fire() {
            warn!(sensor = %sensor.base().name, error = %e, "Sensor reading failed");
        }
    }
}

/// Shared handle to a constructed sensor
///
/// Clones share the sensor and its event.
#[derive(Clone)]
pub struct SensorHandle {
    cell: Arc<SensorCell>,
    event: Arc<OnceCell<Event>>,
}

impl SensorHandle {
    pub fn new(sensor: Box<dyn Sensor>) -> Self {
        Self {
            cell: Arc::new(SensorCell(Mutex::new(sensor))),
            event: Arc::new(OnceCell::new()),
        }
    }

    pub fn name(&self) -> String {
        self.cell.lock().base().name.clone()
    }

    pub fn start(&self) -> f64 {
        self.cell.lock().base().start
    }

    pub fn period(&self) -> f64 {
        self.cell.lock().base().period
    }

    pub fn is_bound(&self) -> bool {
        self.cell.lock().base().is_bound()
    }

    /// Bind the sensor to the run loop it will publish through. A sensor can
    /// only be bound once.
    pub fn set_loop(&self, handle: LoopHandle) -> Result<(), SensorError> {
        let mut sensor = self.cell.lock();
        sensor.base_mut().bind(handle)?;
        debug!(sensor = %sensor.base().name, "Sensor bound to run loop");
        sensor.on_bind()
    }

    /// Whether the sensor still has background work running
    pub fn keeps_alive(&self) -> bool {
        self.cell.lock().keeps_alive()
    }

    /// The event that drives this sensor.
    ///
    /// Built on first call: a one-shot event when the period is zero,
    /// otherwise a repeating one. Every call returns a copy of that first
    /// event, so its `next_fire` is always the sensor's start time. The copy
    /// handed to the run loop advances on its own; all copies share one
    /// target (see [`Event::same_target`]).
    pub fn event(&self) -> Result<Event, SensorError> {
        self.event
            .get_or_try_init(|| {
                let (start, period) = {
                    let sensor = self.cell.lock();
                    let base = sensor.base();
                    if !base.is_bound() {
                        return Err(SensorError::NoLoopBound);
                    }
                    (base.start, base.period)
                };
                let target: Arc<dyn EventTarget> = self.cell.clone();
                if period == 0.0 {
                    Ok(Event::once(start, Some(target)))
                } else {
                    Event::repeating(start, period, Some(target))
                        .map_err(|e| SensorError::InvalidSchedule(e.to_string()))
                }
            })
            .cloned()
    }

    /// Take a reading outside the run loop
    pub fn fire(&self) -> Result<(), SensorError> {
        self.cell.lock().fire()
    }
}

impl std::fmt::Debug for SensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sensor = self.cell.lock();
        f.debug_struct("SensorHandle")
            .field("base", sensor.base())
            .field("has_event", &self.event.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use args::ArgValue;

    fn base_sensor(args: &TypedArgs) -> SensorHandle {
        SensorHandle::new(BaseSensor::construct(args).unwrap())
    }

    #[test]
    fn test_base_defaults() {
        let base = SensorBase::from_args(&TypedArgs::new()).unwrap();
        assert_eq!(base.name, "Sensor");
        assert_eq!(base.start, NOW);
        assert_eq!(base.period, 0.0);
        assert!(!base.is_bound());
    }

    #[test]
    fn test_negative_period_rejected() {
        assert!(matches!(
            SensorBase::new("x", NOW, -1.0),
            Err(SensorError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_period_too_small_to_advance_rejected() {
        assert!(matches!(
            SensorBase::new("x", 1000.0, 1e-14),
            Err(SensorError::InvalidSchedule(_))
        ));
        assert!(matches!(
            SensorBase::new("x", NOW, 1e-9),
            Err(SensorError::InvalidSchedule(_))
        ));
        assert!(SensorBase::new("x", 1000.0, 0.5).is_ok());
    }

    #[test]
    fn test_event_requires_loop() {
        let sensor = base_sensor(&TypedArgs::new());
        assert!(matches!(sensor.event(), Err(SensorError::NoLoopBound)));
    }

    #[test]
    fn test_publish_requires_loop() {
        let base = SensorBase::new("porch", NOW, 0.0).unwrap();
        assert!(matches!(base.publish("ON"), Err(SensorError::NoLoopBound)));
    }

    #[test]
    fn test_event_is_memoized() {
        let sensor = base_sensor(&TypedArgs::new());
        let (handle, _rx) = LoopHandle::channel("node");
        sensor.set_loop(handle).unwrap();

        let first = sensor.event().unwrap();
        let second = sensor.clone().event().unwrap();
        assert!(first.same_target(&second));
        assert_eq!(first.next_fire(), second.next_fire());
    }

    #[test]
    fn test_event_copies_advance_independently() {
        let mut args = TypedArgs::new();
        args.insert("start", ArgValue::Float(500.0));
        args.insert("period", ArgValue::Float(30.0));
        let sensor = base_sensor(&args);
        let (handle, _rx) = LoopHandle::channel("node");
        sensor.set_loop(handle).unwrap();

        let mut queued = sensor.event().unwrap();
        queued.fire();

        let memoized = sensor.event().unwrap();
        assert_eq!(queued.next_fire(), 530.0);
        assert_eq!(memoized.next_fire(), 500.0);
        assert!(queued.same_target(&memoized));
    }

    #[test]
    fn test_zero_period_gives_one_shot() {
        let sensor = base_sensor(&TypedArgs::new());
        let (handle, _rx) = LoopHandle::channel("node");
        sensor.set_loop(handle).unwrap();

        let event = sensor.event().unwrap();
        assert!(!event.repeats());
        assert_eq!(event.next_fire(), NOW);
    }

    #[test]
    fn test_period_gives_repeating_event() {
        let mut args = TypedArgs::new();
        args.insert("start", ArgValue::Float(500.0));
        args.insert("period", ArgValue::Float(30.0));
        let sensor = base_sensor(&args);
        let (handle, _rx) = LoopHandle::channel("node");
        sensor.set_loop(handle).unwrap();

        let event = sensor.event().unwrap();
        assert!(event.repeats());
        assert_eq!(event.period(), 30.0);
        assert_eq!(event.next_fire(), 500.0);
    }

    #[test]
    fn test_second_bind_rejected() {
        let sensor = base_sensor(&TypedArgs::new());
        let (handle, _rx) = LoopHandle::channel("node");
        sensor.set_loop(handle.clone()).unwrap();
        assert!(matches!(
            sensor.set_loop(handle),
            Err(SensorError::AlreadyBound)
        ));
    }

    #[test]
    fn test_base_publish_uses_name_subtopic() {
        let mut base = SensorBase::new("porch", NOW, 0.0).unwrap();
        let (handle, mut rx) = LoopHandle::channel("node");
        base.bind(handle).unwrap();
        base.publish("ON").unwrap();
        assert_eq!(rx.try_recv().unwrap().topic, "node/porch");
    }
}
