//! Sensor registry and description string tests
//!
//! Exercises the built-in registry the way the binary does: description
//! strings in, bound sensors and their events out.

use hasensor::scheduler::{LoopHandle, NOW};
use hasensor::sensor::args::{ArgSpec, ArgType, TypedArgs};
use hasensor::sensor::{
    RegistryError, Sensor, SensorBase, SensorDescriptor, SensorError, SensorRegistry,
};

fn builtin() -> SensorRegistry {
    SensorRegistry::with_builtin_sensors().unwrap()
}

/// Sensor with a boolean flag, publishing the flag on each firing
struct Switch {
    base: SensorBase,
    inverted: bool,
}

const SWITCH_ARGS: &[ArgSpec] = &[
    ArgSpec::new("inverted", ArgType::Bool),
    ArgSpec::new("pin", ArgType::Int),
];

impl Switch {
    fn construct(args: &TypedArgs) -> Result<Box<dyn Sensor>, SensorError> {
        Ok(Box::new(Switch {
            base: SensorBase::from_args(args)?,
            inverted: args.bool("inverted").unwrap_or(false),
        }))
    }
}

impl Sensor for Switch {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn fire(&mut self) -> Result<(), SensorError> {
        self.base.publish(self.inverted.to_string())
    }
}

fn switch_registry() -> SensorRegistry {
    let mut registry = SensorRegistry::new();
    registry
        .register_type(
            "switch",
            SensorDescriptor::derived(SWITCH_ARGS, Switch::construct),
        )
        .unwrap();
    registry
}

#[test]
fn test_announcer_with_defaults() {
    let sensor = builtin().create_sensor("announcer:value=ON").unwrap();

    assert_eq!(sensor.name(), "Sensor");
    assert_eq!(sensor.start(), NOW);
    assert_eq!(sensor.period(), 0.0);

    let (handle, mut rx) = LoopHandle::channel("node");
    sensor.set_loop(handle).unwrap();
    sensor.fire().unwrap();
    assert_eq!(rx.try_recv().unwrap().payload, b"ON".to_vec());
}

#[test]
fn test_unknown_argument_rejected() {
    let err = builtin().create_sensor("announcer:bogus=1").unwrap_err();
    match err {
        RegistryError::UnexpectedArgument { keys } => assert_eq!(keys, vec!["bogus"]),
        other => panic!("expected UnexpectedArgument, got {other:?}"),
    }
}

#[test]
fn test_unknown_type_rejected() {
    assert!(matches!(
        builtin().create_sensor("thermostat:period=5"),
        Err(RegistryError::UnknownSensorType(_))
    ));
}

#[test]
fn test_valueless_bool_argument() {
    let sensor = switch_registry().create_sensor("switch:inverted").unwrap();
    let (handle, mut rx) = LoopHandle::channel("node");
    sensor.set_loop(handle).unwrap();
    sensor.fire().unwrap();
    assert_eq!(rx.try_recv().unwrap().payload, b"true".to_vec());
}

#[test]
fn test_valueless_non_bool_argument() {
    assert!(matches!(
        switch_registry().create_sensor("switch:pin"),
        Err(RegistryError::MissingRequiredArgument { ref key }) if key == "pin"
    ));
    assert!(matches!(
        switch_registry().create_sensor("switch:period"),
        Err(RegistryError::MissingRequiredArgument { ref key }) if key == "period"
    ));
}

#[test]
fn test_duplicate_registration_rejected() {
    let mut registry = switch_registry();
    let err = registry
        .register_type("switch", SensorDescriptor::base(Switch::construct))
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateRegistration(_)));

    // Still the original, which accepts `inverted`
    assert!(registry.create_sensor("switch:inverted=no").is_ok());
}

#[test]
fn test_same_descriptor_under_two_names() {
    let mut registry = SensorRegistry::new();
    let descriptor = SensorDescriptor::derived(SWITCH_ARGS, Switch::construct);
    registry.register_type("switch", descriptor.clone()).unwrap();
    registry.register_type("relay", descriptor).unwrap();

    assert!(registry.create_sensor("relay:pin=4").is_ok());
    assert!(registry.create_sensor("switch:pin=4").is_ok());
}

#[test]
fn test_invalid_values_rejected() {
    let registry = builtin();
    for description in [
        "announcer:period=often",
        "announcer:start=later",
        "rtlamr:symbol_length=1.5",
        "system:diskthresh=full",
    ] {
        assert!(
            matches!(
                registry.create_sensor(description),
                Err(RegistryError::InvalidArgumentValue { .. })
            ),
            "{description} should be rejected"
        );
    }
}

#[test]
fn test_negative_period_fails_construction() {
    assert!(matches!(
        builtin().create_sensor("sensor:period=-5"),
        Err(RegistryError::Construction {
            source: SensorError::InvalidSchedule(_),
            ..
        })
    ));
}

#[test]
fn test_period_too_small_to_advance_fails_construction() {
    for description in ["sensor:start=1000:period=1e-14", "announcer:period=0.0000001"] {
        assert!(
            matches!(
                builtin().create_sensor(description),
                Err(RegistryError::Construction {
                    source: SensorError::InvalidSchedule(_),
                    ..
                })
            ),
            "{description} should be rejected"
        );
    }
    assert!(builtin().create_sensor("sensor:start=1000:period=0.5").is_ok());
}

#[test]
fn test_event_needs_bound_loop() {
    let sensor = builtin().create_sensor("sensor:period=5").unwrap();
    assert!(matches!(sensor.event(), Err(SensorError::NoLoopBound)));

    let (handle, _rx) = LoopHandle::channel("node");
    sensor.set_loop(handle).unwrap();
    let event = sensor.event().unwrap();
    assert!(event.repeats());
    assert_eq!(event.period(), 5.0);
}

#[test]
fn test_event_is_same_on_every_call() {
    let sensor = builtin()
        .create_sensor("announcer:start=2000:period=30")
        .unwrap();
    let (handle, _rx) = LoopHandle::channel("node");
    sensor.set_loop(handle).unwrap();

    let first = sensor.event().unwrap();
    let second = sensor.event().unwrap();
    assert!(first.same_target(&second));
    assert_eq!(first.next_fire(), 2000.0);
    assert_eq!(second.next_fire(), 2000.0);
}
