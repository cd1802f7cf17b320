//! Fixed-value announcer
//!
//! Publishes the same payload on every firing. Handy as a liveness beacon
//! (`announcer:name=online:period=60`) or for testing a broker setup.

use crate::sensor::args::{ArgSchema, ArgSpec, ArgType, TypedArgs};
use crate::sensor::{Sensor, SensorBase, SensorDescriptor, SensorError};

pub const DEFAULT_VALUE: &str = "ON";

const ARGS: ArgSchema = &[ArgSpec::new("value", ArgType::Str)];

#[derive(Debug)]
pub struct Announcer {
    base: SensorBase,
    value: String,
}

impl Announcer {
    pub fn new(base: SensorBase, value: &str) -> Self {
        Self {
            base,
            value: value.to_string(),
        }
    }

    pub fn construct(args: &TypedArgs) -> Result<Box<dyn Sensor>, SensorError> {
        let base = SensorBase::from_args(args)?;
        let value = args.str("value").unwrap_or(DEFAULT_VALUE);
        Ok(Box::new(Self::new(base, value)))
    }

    pub fn descriptor() -> SensorDescriptor {
        SensorDescriptor::derived(ARGS, Self::construct)
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Sensor for Announcer {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn fire(&mut self) -> Result<(), SensorError> {
        self.base.publish(self.value.as_str())
    }
}
