//! Configuration for a sensor node
//!
//! A node is configured from the command line, optionally layered over a
//! TOML file. The configuration covers everything needed to connect to the
//! MQTT broker, the topic prefix the node publishes under, Home Assistant
//! discovery, and the description strings of its sensors.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default MQTT port when the broker address has none
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default Home Assistant discovery prefix
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Default discovery re-broadcast interval in seconds
pub const DEFAULT_DISCOVERY_INTERVAL: u64 = 60 * 60;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Bad broker address {0:?}; use host[:port]")]
    BadBrokerAddress(String),
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// MQTT broker host and port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerAddress {
    type Err = ConfigError;

    /// Parse `host` or `host:port`; the port must be in 1..=65535.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::BadBrokerAddress(s.to_string());
        let mut parts = s.split(':');
        let host = parts.next().unwrap_or_default();
        if host.is_empty() {
            return Err(bad());
        }

        let port = match (parts.next(), parts.next()) {
            (None, _) => DEFAULT_MQTT_PORT,
            (Some(port), None) => match port.parse::<u16>() {
                Ok(port) if port >= 1 => port,
                _ => return Err(bad()),
            },
            (Some(_), Some(_)) => return Err(bad()),
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl TryFrom<String> for BrokerAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BrokerAddress> for String {
    fn from(address: BrokerAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for BrokerAddress {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_MQTT_PORT,
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// The MQTT broker to connect to
    pub broker: BrokerAddress,
    /// Client ID used when connecting to the broker
    pub client_id: String,
    /// Topic prefix for this node's sensor readings
    pub prefix: String,
    /// Whether to announce this node to Home Assistant
    pub discoverable: bool,
    /// Topic prefix used for Home Assistant discovery
    pub discovery_prefix: String,
    /// Node ID used in discovery topics
    pub discovery_node: String,
    /// Seconds between discovery re-broadcasts; 0 announces once at start-up
    pub discovery_interval: u64,
    /// Sensor description strings, e.g. `announcer:name=porch:period=60`
    pub sensors: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let host = local_hostname();
        let client_id = default_client_id(&host);
        Self {
            broker: BrokerAddress::default(),
            prefix: client_id.clone(),
            client_id,
            discoverable: false,
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            discovery_node: host,
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            sensors: Vec::new(),
        }
    }
}

/// Default client ID (and topic prefix) for a host
pub fn default_client_id(hostname: &str) -> String {
    format!("sensor_{hostname}")
}

/// Name of the machine this node runs on
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl NodeConfig {
    /// Load configuration from a TOML file; missing fields take defaults
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from command-line arguments, layered over
    /// the config file when one is given
    pub fn from_cli(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Override fields with the values given on the command line.
    ///
    /// Sensors from the command line are appended to those from the file.
    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(broker) = &cli.broker {
            self.broker = broker.clone();
        }
        if let Some(client_id) = &cli.client_id {
            self.client_id = client_id.clone();
        }
        if let Some(prefix) = &cli.prefix {
            self.prefix = prefix.clone();
        }
        if cli.discoverable {
            self.discoverable = true;
        }
        if let Some(discovery_prefix) = &cli.discovery_prefix {
            self.discovery_prefix = discovery_prefix.clone();
        }
        if let Some(discovery_node) = &cli.discovery_node {
            self.discovery_node = discovery_node.clone();
        }
        if let Some(discovery_interval) = cli.discovery_interval {
            self.discovery_interval = discovery_interval;
        }
        self.sensors.extend(cli.sensors.iter().cloned());
    }

    /// Check fields that cannot be empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("client_id", &self.client_id),
            ("prefix", &self.prefix),
            ("discovery_prefix", &self.discovery_prefix),
            ("discovery_node", &self.discovery_node),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{field} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Multi-sensor sensor node
#[derive(Parser, Debug, Default)]
#[command(name = "hasensor")]
#[command(about = "Multi-sensor node publishing readings to an MQTT broker")]
#[command(version)]
pub struct CliArgs {
    /// Configuration file path (TOML); command-line values override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// MQTT broker (host[:port])
    #[arg(short, long, value_parser = parse_broker)]
    pub broker: Option<BrokerAddress>,

    /// MQTT client ID [default: sensor_<hostname>]
    #[arg(short, long)]
    pub client_id: Option<String>,

    /// MQTT topic prefix [default: sensor_<hostname>]
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Advertise this node to Home Assistant
    #[arg(short, long)]
    pub discoverable: bool,

    /// MQTT prefix to use for discovery [default: homeassistant]
    #[arg(long)]
    pub discovery_prefix: Option<String>,

    /// Interval for discovery re-broadcast in seconds; 0 announces once [default: 3600]
    #[arg(long)]
    pub discovery_interval: Option<u64>,

    /// Node ID for discovery [default: hostname]
    #[arg(long)]
    pub discovery_node: Option<String>,

    /// Add a sensor description string (repeatable)
    #[arg(short, long = "sensor", value_name = "DESCRIPTION")]
    pub sensors: Vec<String>,
}

fn parse_broker(s: &str) -> Result<BrokerAddress, ConfigError> {
    s.parse()
}
