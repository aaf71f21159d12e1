use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use halcyon_lib::protocol::{self as proto, FanSpeed, Mode, ZoneGroup};
use halcyon_lib::scheduler::Command;
use std::path::PathBuf;
use std::time::Duration;

pub fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_zone(s: &str) -> Result<proto::Zone, String> {
    let zone_num =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid zone number format: {e}"))?;
    proto::Zone::try_from(zone_num).map_err(|e| e.to_string())
}

fn parse_function_unit(s: &str) -> Result<u8, String> {
    let unit = clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid unit format: {e}"))?;
    proto::Function::new(0, 0, unit)
        .map(|function| function.unit)
        .map_err(|e| e.to_string())
}

fn parse_setpoint(s: &str) -> Result<u8, String> {
    let setpoint = s
        .parse::<u8>()
        .map_err(|e| format!("Invalid setpoint format: {e}"))?;
    if (proto::MIN_SETPOINT..=proto::MAX_SETPOINT).contains(&setpoint) {
        Ok(setpoint)
    } else {
        Err(proto::Error::SetpointOutOfRange(setpoint).to_string())
    }
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("Expected 'on' or 'off', got '{s}'")),
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Auto,
    Heat,
    Fan,
    Dry,
    Cool,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Auto => Mode::Auto,
            CliMode::Heat => Mode::Heat,
            CliMode::Fan => Mode::Fan,
            CliMode::Dry => Mode::Dry,
            CliMode::Cool => Mode::Cool,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliFanSpeed {
    Auto,
    Quiet,
    Low,
    Medium,
    High,
}

impl From<CliFanSpeed> for FanSpeed {
    fn from(fan_speed: CliFanSpeed) -> Self {
        match fan_speed {
            CliFanSpeed::Auto => FanSpeed::Auto,
            CliFanSpeed::Quiet => FanSpeed::Quiet,
            CliFanSpeed::Low => FanSpeed::Low,
            CliFanSpeed::Medium => FanSpeed::Medium,
            CliFanSpeed::High => FanSpeed::High,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliZoneGroup {
    Day,
    Night,
}

impl From<CliZoneGroup> for ZoneGroup {
    fn from(group: CliZoneGroup) -> Self {
        match group {
            CliZoneGroup::Day => ZoneGroup::Day,
            CliZoneGroup::Night => ZoneGroup::Night,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SetAction {
    /// Switch the indoor unit on or off.
    Power {
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    /// Select the operating mode.
    Mode {
        #[arg(value_enum)]
        mode: CliMode,
    },
    /// Select the fan speed.
    FanSpeed {
        #[arg(value_enum)]
        fan_speed: CliFanSpeed,
    },
    /// Set the target temperature in °C (16 to 30).
    Setpoint {
        #[arg(value_parser = parse_setpoint)]
        celsius: u8,
    },
    Economy {
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    TestRun {
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    SwingVertical {
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    SwingHorizontal {
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    /// Step the vertical louver to its next position.
    AdvanceVerticalLouver,
    /// Step the horizontal louver to its next position.
    AdvanceHorizontalLouver,
    /// Reset the filter timer after cleaning the filter.
    ResetFilter,
    Maintenance,
    /// Open or close a zone.
    Zone {
        /// Zone number (1 to 8).
        #[arg(value_parser = parse_zone)]
        zone: proto::Zone,
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    /// Activate or deactivate a zone group.
    ZoneGroup {
        #[arg(value_enum)]
        group: CliZoneGroup,
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    /// Read an installer function register.
    ReadFunction {
        #[arg(value_parser = clap_num::maybe_hex::<u8>)]
        function: u8,
        /// Indoor unit the register belongs to (0 to 15).
        #[arg(value_parser = parse_function_unit, default_value = "0")]
        unit: u8,
    },
    /// Write an installer function register.
    /// **Warning:** Wrong values can make the indoor unit misbehave.
    #[clap(verbatim_doc_comment)]
    WriteFunction {
        #[arg(value_parser = clap_num::maybe_hex::<u8>)]
        function: u8,
        #[arg(value_parser = clap_num::maybe_hex::<u8>)]
        value: u8,
        /// Indoor unit the register belongs to (0 to 15).
        #[arg(value_parser = parse_function_unit, default_value = "0")]
        unit: u8,
    },
}

impl From<&SetAction> for Command {
    fn from(action: &SetAction) -> Self {
        match *action {
            SetAction::Power { state } => Command::SetEnabled(state),
            SetAction::Mode { mode } => Command::SetMode(mode.into()),
            SetAction::FanSpeed { fan_speed } => Command::SetFanSpeed(fan_speed.into()),
            SetAction::Setpoint { celsius } => Command::SetSetpoint(celsius),
            SetAction::Economy { state } => Command::SetEconomy(state),
            SetAction::TestRun { state } => Command::SetTestRun(state),
            SetAction::SwingVertical { state } => Command::SetSwingVertical(state),
            SetAction::SwingHorizontal { state } => Command::SetSwingHorizontal(state),
            SetAction::AdvanceVerticalLouver => Command::AdvanceVerticalLouver,
            SetAction::AdvanceHorizontalLouver => Command::AdvanceHorizontalLouver,
            SetAction::ResetFilter => Command::ResetFilterTimer,
            SetAction::Maintenance => Command::Maintenance,
            SetAction::Zone { zone, state } => Command::SetZone(zone, state),
            SetAction::ZoneGroup { group, state } => Command::SetZoneGroup(group.into(), state),
            SetAction::ReadFunction { function, unit } => Command::ReadFunction { function, unit },
            SetAction::WriteFunction {
                function,
                value,
                unit,
            } => Command::WriteFunction {
                function,
                value,
                unit,
            },
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Join the bus as a controller and print every entity change.
    Run {
        /// Interval between polls of the serial line.
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "10ms")]
        tick: Duration,

        /// Room temperature in °C reported to the indoor unit.
        #[arg(long, allow_negative_numbers = true)]
        temperature: Option<f32>,
    },

    /// Print the decoded bus traffic without ever transmitting.
    Monitor {
        /// Interval between polls of the serial line.
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "10ms")]
        tick: Duration,
    },

    /// Decode a frame given as 8 bytes.
    /// Bytes can be given in decimal or hexadecimal (e.g. "0x20").
    #[clap(verbatim_doc_comment)]
    Decode {
        /// The bytes are inverted, as read from the wire.
        #[arg(long)]
        wire: bool,

        #[arg(value_parser = clap_num::maybe_hex::<u8>, num_args = 8, required = true)]
        bytes: Vec<u8>,
    },

    /// Validate the configuration file and print the result.
    CheckConfig,

    /// Join the bus, apply one change and wait for the indoor unit to confirm it.
    Set {
        /// How long to wait for initialization and acknowledgement.
        #[arg(value_parser = humantime::parse_duration, long, default_value = "60s")]
        timeout: Duration,

        #[command(subcommand)]
        action: SetAction,
    },
}

const fn about_text() -> &'static str {
    "Fujitsu Halcyon controller CLI - Take part in the wired remote controller bus of Fujitsu indoor units."
}

#[derive(Parser, Debug)]
#[command(name="halcyonctl", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// YAML configuration file.
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    /// Serial port device name, overrides `port` from the configuration.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub device: Option<String>,

    /// Controller address (0 to 15), overrides `controller_address`.
    #[arg(global = true, short, long, value_parser = parse_address)]
    pub address: Option<proto::Address>,

    #[command(subcommand)]
    pub command: CliCommands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }

    #[test]
    fn set_zone_arguments() {
        let args = CliArgs::try_parse_from(["halcyonctl", "set", "zone", "3", "on"]).unwrap();
        let CliCommands::Set { action, .. } = args.command else {
            panic!("expected set");
        };
        assert_eq!(Command::from(&action), Command::SetZone(proto::Zone::Zone3, true));
        assert!(CliArgs::try_parse_from(["halcyonctl", "set", "zone", "9", "on"]).is_err());
    }

    #[test]
    fn setpoint_range() {
        assert_eq!(parse_setpoint("16"), Ok(16));
        assert!(parse_setpoint("31").is_err());
        assert!(parse_function_unit("0x10").is_err());
        assert_eq!(parse_function_unit("0xF"), Ok(15));
    }

    #[test]
    fn decode_needs_eight_bytes() {
        assert!(CliArgs::try_parse_from(["halcyonctl", "decode", "1", "2"]).is_err());
        let args = CliArgs::try_parse_from([
            "halcyonctl", "decode", "0x20", "0", "0", "0", "0", "0", "0", "0",
        ])
        .unwrap();
        assert_matches!(
            args.command,
            CliCommands::Decode { wire: false, ref bytes } if bytes[0] == 0x20
        );
    }
}
