//! YAML configuration.
//!
//! The file is parsed into [`FileConfig`] and then validated into a
//! [`ControllerConfig`] before a controller is built.

use crate::arbitration::BusAddresses;
use crate::controller::ControllerConfig;
use crate::entities::{Entity, EntitySettings};
use crate::protocol::{self as proto, Address};
use crate::scheduler::Timing;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid {field}: {source}")]
    Address {
        field: &'static str,
        source: proto::Error,
    },

    #[error("Unsupported UART {parameter} {value}, the bus runs at 500 baud 8E1")]
    Uart {
        parameter: &'static str,
        value: String,
    },

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("{field} must be greater than zero")]
    Timing { field: &'static str },
}

/// Serial link parameters. Only the values the bus uses are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UartConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_baud_rate() -> u32 {
    500
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    String::from("EVEN")
}

fn default_stop_bits() -> u8 {
    1
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

impl UartConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let unsupported =
            |parameter: &'static str, value: String| ConfigError::Uart { parameter, value };
        if self.baud_rate != default_baud_rate() {
            return Err(unsupported("baud rate", self.baud_rate.to_string()));
        }
        if self.data_bits != default_data_bits() {
            return Err(unsupported("data bits", self.data_bits.to_string()));
        }
        if !self.parity.eq_ignore_ascii_case(&default_parity()) {
            return Err(unsupported("parity", self.parity.clone()));
        }
        if self.stop_bits != default_stop_bits() {
            return Err(unsupported("stop bits", self.stop_bits.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    #[serde(default = "default_ack_timeout", with = "humantime_serde")]
    pub ack_timeout: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lock_deadline", with = "humantime_serde")]
    pub lock_deadline: Duration,
    #[serde(default = "default_bus_silence_timeout", with = "humantime_serde")]
    pub bus_silence_timeout: Duration,
}

fn default_ack_timeout() -> Duration {
    Timing::DEFAULT_ACK_TIMEOUT
}

fn default_max_attempts() -> u32 {
    Timing::DEFAULT_MAX_ATTEMPTS
}

fn default_lock_deadline() -> Duration {
    Timing::DEFAULT_LOCK_DEADLINE
}

fn default_bus_silence_timeout() -> Duration {
    Timing::DEFAULT_BUS_SILENCE_TIMEOUT
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ack_timeout: default_ack_timeout(),
            max_attempts: default_max_attempts(),
            lock_deadline: default_lock_deadline(),
            bus_silence_timeout: default_bus_silence_timeout(),
        }
    }
}

impl TryFrom<&TimingConfig> for Timing {
    type Error = ConfigError;

    fn try_from(config: &TimingConfig) -> Result<Self, ConfigError> {
        let positive = |field: &'static str, duration: Duration| {
            if duration.is_zero() {
                Err(ConfigError::Timing { field })
            } else {
                Ok(duration)
            }
        };
        if config.max_attempts == 0 {
            return Err(ConfigError::Timing {
                field: "max_attempts",
            });
        }
        Ok(Timing {
            ack_timeout: positive("ack_timeout", config.ack_timeout)?,
            max_attempts: config.max_attempts,
            lock_deadline: positive("lock_deadline", config.lock_deadline)?,
            bus_silence_timeout: positive("bus_silence_timeout", config.bus_silence_timeout)?,
        })
    }
}

/// The configuration file as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub controller_address: u8,
    #[serde(default)]
    pub temperature_controller_address: u8,
    #[serde(default)]
    pub ignore_lock: bool,
    /// Name of the host sensor feeding the room temperature.
    pub temperature_sensor: Option<String>,
    pub humidity_sensor: Option<String>,
    #[serde(default)]
    pub uart: UartConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Serial device used by the commandline tool.
    pub port: Option<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, EntitySettings>,
}

impl FileConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading config file from {path:?}");
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Checks every setting and builds the controller configuration.
    pub fn validate(&self) -> Result<ControllerConfig, ConfigError> {
        let address = |field: &'static str, value: u8| {
            Address::try_from(value).map_err(|source| ConfigError::Address { field, source })
        };
        let controller = address("controller_address", self.controller_address)?;
        let temperature_controller = address(
            "temperature_controller_address",
            self.temperature_controller_address,
        )?;
        self.uart.validate()?;

        let entities = self
            .entities
            .iter()
            .map(|(key, settings)| {
                Entity::from_key(key)
                    .map(|entity| (entity, settings.clone()))
                    .ok_or_else(|| ConfigError::UnknownEntity(key.clone()))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(ControllerConfig {
            addresses: BusAddresses {
                controller,
                temperature_controller,
            },
            ignore_lock: self.ignore_lock,
            timing: Timing::try_from(&self.timing)?,
            has_temperature_sensor: self.temperature_sensor.is_some(),
            has_humidity_sensor: self.humidity_sensor.is_some(),
            entities,
        })
    }
}
