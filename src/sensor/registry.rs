//! Sensor type registry
//!
//! Maps sensor type names to constructor descriptors and builds sensors from
//! description strings. The registry is filled once at start-up and only read
//! afterwards; there is no unregistration.

use super::args::{type_args, ArgSchema, Description, TypedArgs};
use super::{Sensor, SensorBase, SensorError, SensorHandle};
use std::collections::HashMap;
use thiserror::Error;

/// Builds a sensor from fully typed arguments
pub type SensorConstructor = fn(&TypedArgs) -> Result<Box<dyn Sensor>, SensorError>;

/// How to build one sensor type: its argument chain and constructor
#[derive(Clone)]
pub struct SensorDescriptor {
    chain: Vec<ArgSchema>,
    construct: SensorConstructor,
}

impl SensorDescriptor {
    /// Descriptor with an explicit argument chain, most-derived level first
    pub fn new(chain: Vec<ArgSchema>, construct: SensorConstructor) -> Self {
        Self { chain, construct }
    }

    /// Descriptor for a sensor adding its own arguments on top of the base
    /// sensor arguments
    pub fn derived(own: ArgSchema, construct: SensorConstructor) -> Self {
        Self::new(vec![own, SensorBase::ARGS], construct)
    }

    /// Descriptor for a sensor that only takes the base arguments
    pub fn base(construct: SensorConstructor) -> Self {
        Self::new(vec![SensorBase::ARGS], construct)
    }

    pub fn arg_chain(&self) -> &[ArgSchema] {
        &self.chain
    }
}

/// Registry and construction errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate sensor type registration: {0}")]
    DuplicateRegistration(String),
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),
    #[error("Missing value for argument {key}")]
    MissingRequiredArgument { key: String },
    #[error("Unexpected arguments: {}", keys.join(", "))]
    UnexpectedArgument { keys: Vec<String> },
    #[error("Invalid value {value:?} for argument {key}: {reason}")]
    InvalidArgumentValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("Failed to construct sensor {sensor}: {source}")]
    Construction {
        sensor: String,
        #[source]
        source: SensorError,
    },
}

/// Name to sensor type table
#[derive(Default)]
pub struct SensorRegistry {
    types: HashMap<String, SensorDescriptor>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor type under `name`.
    ///
    /// The same descriptor may be registered under several names. A name can
    /// only be registered once; the first registration stays active.
    pub fn register_type(
        &mut self,
        name: &str,
        descriptor: SensorDescriptor,
    ) -> Result<(), RegistryError> {
        if self.types.contains_key(name) {
            return Err(RegistryError::DuplicateRegistration(name.to_string()));
        }
        self.types.insert(name.to_string(), descriptor);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptor(&self, name: &str) -> Option<&SensorDescriptor> {
        self.types.get(name)
    }

    /// Build a sensor from a description string such as
    /// `announcer:name=porch:period=60:value=ON`
    pub fn create_sensor(&self, description: &str) -> Result<SensorHandle, RegistryError> {
        let Description { name, args } = Description::parse(description);
        let descriptor = self
            .types
            .get(&name)
            .ok_or_else(|| RegistryError::UnknownSensorType(name.clone()))?;

        let typed = type_args(descriptor.arg_chain(), args)?;
        let sensor = (descriptor.construct)(&typed).map_err(|source| {
            RegistryError::Construction {
                sensor: name.clone(),
                source,
            }
        })?;
        Ok(SensorHandle::new(sensor))
    }
}
