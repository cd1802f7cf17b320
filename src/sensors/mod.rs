//! Built-in sensor types

pub mod announcer;
pub mod rtlamr;
pub mod system;

use crate::sensor::{BaseSensor, RegistryError, SensorRegistry};

pub use announcer::Announcer;
pub use rtlamr::RtlAmrSensor;
pub use system::SystemSensor;

/// Register every built-in sensor type under its description name
pub fn register_builtin(registry: &mut SensorRegistry) -> Result<(), RegistryError> {
    registry.register_type("sensor", BaseSensor::descriptor())?;
    registry.register_type("announcer", Announcer::descriptor())?;
    registry.register_type("system", SystemSensor::descriptor())?;
    registry.register_type("rtlamr", RtlAmrSensor::descriptor())?;
    Ok(())
}

impl SensorRegistry {
    /// A registry holding every built-in sensor type
    pub fn with_builtin_sensors() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        register_builtin(&mut registry)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_registered() {
        let registry = SensorRegistry::with_builtin_sensors().unwrap();
        assert_eq!(
            registry.type_names(),
            vec!["announcer", "rtlamr", "sensor", "system"]
        );
    }

    #[test]
    fn test_builtin_registration_is_not_repeatable() {
        let mut registry = SensorRegistry::with_builtin_sensors().unwrap();
        assert!(matches!(
            register_builtin(&mut registry),
            Err(RegistryError::DuplicateRegistration(ref name)) if name == "sensor"
        ));
    }

    #[test]
    fn test_system_sensor_arguments() {
        let registry = SensorRegistry::with_builtin_sensors().unwrap();
        let sensor = registry
            .create_sensor("system:name=host:period=60:partitions=/,/var:diskthresh=90")
            .unwrap();
        assert_eq!(sensor.name(), "host");
        assert_eq!(sensor.period(), 60.0);
    }

    #[test]
    fn test_rtlamr_rejects_non_integer_meter() {
        let registry = SensorRegistry::with_builtin_sensors().unwrap();
        assert!(matches!(
            registry.create_sensor("rtlamr:meter_id=abc"),
            Err(RegistryError::InvalidArgumentValue { .. })
        ));
    }
}
