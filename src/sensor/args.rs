//! Description strings and typed argument resolution
//!
//! A description string names a sensor type followed by colon-separated
//! arguments: `name(:key[=value])*`. Each sensor type declares an argument
//! chain: one schema per level, most-derived first, ending with the base
//! sensor schema. Resolution walks the chain and lets the first level that
//! declares a key claim it, so a derived level can shadow a base argument.

use super::registry::RegistryError;
use crate::scheduler::NOW;
use std::collections::HashMap;

/// Type tag of a declared argument, doubling as its string parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Float,
    Int,
    /// Integer written in hexadecimal with a `0x` prefix
    HexInt,
    /// Valueless keys of this type resolve to `true`
    Bool,
    /// `NOW` or fractional seconds since the epoch
    Time,
}

impl ArgType {
    /// Convert a raw string value for argument `key`
    pub fn parse(self, key: &str, raw: &str) -> Result<ArgValue, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidArgumentValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        match self {
            ArgType::Str => Ok(ArgValue::Str(raw.to_string())),
            ArgType::Float => raw
                .parse::<f64>()
                .map(ArgValue::Float)
                .map_err(|_| invalid("expected a number")),
            ArgType::Int => raw
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| invalid("expected an integer")),
            ArgType::HexInt => {
                let digits = raw
                    .strip_prefix("0x")
                    .ok_or_else(|| invalid("expected a hexadecimal integer starting with 0x"))?;
                i64::from_str_radix(digits, 16)
                    .map(ArgValue::Int)
                    .map_err(|_| invalid("expected a hexadecimal integer starting with 0x"))
            }
            ArgType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(ArgValue::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(ArgValue::Bool(false)),
                _ => Err(invalid("expected a boolean")),
            },
            ArgType::Time => {
                if raw == "NOW" {
                    Ok(ArgValue::Float(NOW))
                } else {
                    raw.parse::<f64>()
                        .map(ArgValue::Float)
                        .map_err(|_| invalid("expected NOW or a time in seconds"))
                }
            }
        }
    }
}

/// A typed argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

/// One declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
}

impl ArgSpec {
    pub const fn new(name: &'static str, ty: ArgType) -> Self {
        Self { name, ty }
    }
}

/// Arguments declared by one level of a sensor type
pub type ArgSchema = &'static [ArgSpec];

/// A description string split into its sensor type and raw arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub name: String,
    /// Arguments in order of first appearance; `None` marks a valueless key
    pub args: Vec<(String, Option<String>)>,
}

impl Description {
    /// Split `name(:key[=value])*`. Values split on the first `=` only, and
    /// a repeated key keeps its first position with the last value.
    pub fn parse(description: &str) -> Self {
        let mut segments = description.split(':');
        let name = segments.next().unwrap_or_default().to_string();

        let mut args: Vec<(String, Option<String>)> = Vec::new();
        for segment in segments {
            let (key, value) = match segment.split_once('=') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (segment, None),
            };
            match args.iter_mut().find(|(existing, _)| existing == key) {
                Some(entry) => entry.1 = value,
                None => args.push((key.to_string(), value)),
            }
        }

        Self { name, args }
    }
}

/// Fully typed arguments for a sensor constructor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedArgs {
    values: HashMap<String, ArgValue>,
}

impl TypedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: ArgValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ArgValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Float value; integers widen
    pub fn float(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ArgValue::Float(value)) => Some(*value),
            Some(ArgValue::Int(value)) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ArgValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ArgValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }
}

/// Resolve raw arguments against an argument chain, most-derived level first.
///
/// Keys left unclaimed after the whole chain fail with
/// [`RegistryError::UnexpectedArgument`], listed in description order.
pub fn type_args(
    chain: &[ArgSchema],
    raw: Vec<(String, Option<String>)>,
) -> Result<TypedArgs, RegistryError> {
    let mut pending = raw;
    let mut typed = TypedArgs::new();

    for level in chain {
        let mut unclaimed = Vec::with_capacity(pending.len());
        for (key, value) in pending {
            let Some(spec) = level.iter().find(|spec| spec.name == key) else {
                unclaimed.push((key, value));
                continue;
            };
            let resolved = match (value, spec.ty) {
                (Some(raw), ty) => ty.parse(&key, &raw)?,
                (None, ArgType::Bool) => ArgValue::Bool(true),
                (None, _) => return Err(RegistryError::MissingRequiredArgument { key }),
            };
            typed.insert(&key, resolved);
        }
        pending = unclaimed;
    }

    if !pending.is_empty() {
        return Err(RegistryError::UnexpectedArgument {
            keys: pending.into_iter().map(|(key, _)| key).collect(),
        });
    }

    Ok(typed)
}
