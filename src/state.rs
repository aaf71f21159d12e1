//! The controller's view of the indoor unit.

use crate::arbitration::BusAddresses;
use crate::protocol::{format_hex, FanSpeed, Frame, Lock, Mode, Payload, ZoneGroups, MAX_ZONES};
use crate::scheduler::FailureReason;
use std::fmt;

/// Where the controller is in its exchange with the indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    /// A status poll was sent.
    Polling,
    /// A command was sent and the indoor unit has not reported it yet.
    AwaitingAck,
    /// A command ran out of attempts; cleared by the next received frame.
    ErrorReported,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot of everything known about the indoor unit.
///
/// Fields reported by the bus only change through [`ControllerState::apply`];
/// `current_temperature`, `current_humidity` and `use_sensor` are local input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerState {
    pub enabled: bool,
    pub mode: Mode,
    pub fan_speed: FanSpeed,
    pub setpoint: u8,
    pub economy: bool,
    pub test_run: bool,
    pub swing_vertical: bool,
    pub swing_horizontal: bool,
    /// Room temperature in °C, from the local sensor or else the
    /// temperature controller.
    pub current_temperature: Option<f32>,
    pub current_humidity: Option<f32>,
    /// Temperature reported by the configured temperature controller, in °C.
    pub remote_temperature: Option<f32>,
    pub standby: bool,
    pub error: bool,
    /// Source address and code of the last error report, empty when clear.
    pub error_code: String,
    pub filter_timer_expired: bool,
    pub lock: Lock,
    pub zones: [bool; MAX_ZONES],
    pub zone_groups: ZoneGroups,
    pub function: u8,
    pub function_value: u8,
    pub function_unit: u8,
    pub use_sensor: bool,
    pub link: LinkState,
    pub last_failure: Option<FailureReason>,
}

impl ControllerState {
    /// Returns the state after `frame` has been received.
    ///
    /// Every field a frame carries is replaced as a whole, so applying the
    /// same frame twice has the same result as applying it once.
    pub fn apply(&self, frame: &Frame, addresses: &BusAddresses) -> ControllerState {
        let mut next = self.clone();

        if !frame.source.is_indoor_unit() {
            if let Payload::Config(config) = &frame.payload {
                if frame.source.address == addresses.temperature_controller
                    && config.controller.temperature != 0
                {
                    next.remote_temperature = Some(f32::from(config.controller.temperature));
                }
            }
            return next;
        }

        match &frame.payload {
            Payload::Config(config) => {
                next.enabled = config.enabled;
                if let Some(mode) = config.mode {
                    next.mode = mode;
                }
                if let Some(fan_speed) = config.fan_speed {
                    next.fan_speed = fan_speed;
                }
                next.setpoint = config.setpoint;
                next.economy = config.economy;
                next.test_run = config.test_run;
                next.swing_vertical = config.swing_vertical;
                next.swing_horizontal = config.swing_horizontal;
                next.standby = config.indoor_unit.standby;
                next.error = config.indoor_unit.error;
                next.filter_timer_expired = config.indoor_unit.filter_timer_expired;
                next.lock = config.indoor_unit.lock;
            }
            Payload::Error(report) => {
                next.error = report.code != 0;
                next.error_code = if report.code == 0 {
                    String::new()
                } else {
                    format_hex(&[*frame.source.address, report.code])
                };
            }
            Payload::ZoneConfig(zones) => {
                next.zones = zones.active_zones.to_array();
                next.zone_groups = zones.active_groups;
            }
            Payload::Function(function) => {
                next.function = function.function;
                next.function_value = function.value;
                next.function_unit = function.unit;
            }
            Payload::Features(_) | Payload::Status | Payload::ZoneFunction(_) => {}
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        Address, Config, ControllerRequest, Endpoint, ErrorReport, IndoorUnitStatus, Zone,
        ZoneConfig,
    };

    fn addresses() -> BusAddresses {
        BusAddresses::new(0, 1).unwrap()
    }

    fn from_indoor_unit(payload: Payload) -> Frame {
        Frame::new(
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Endpoint::controller(Address::PRIMARY),
            payload,
        )
    }

    #[test]
    fn config_is_applied() {
        let frame = from_indoor_unit(Payload::Config(Config {
            indoor_unit: IndoorUnitStatus {
                standby: true,
                error: true,
                ..Default::default()
            },
            mode: Some(Mode::Cool),
            fan_speed: Some(FanSpeed::High),
            setpoint: 21,
            enabled: true,
            ..Default::default()
        }));
        let state = ControllerState::default().apply(&frame, &addresses());
        assert!(state.enabled);
        assert!(state.standby);
        assert!(state.error);
        assert_eq!(state.mode, Mode::Cool);
        assert_eq!(state.fan_speed, FanSpeed::High);
        assert_eq!(state.setpoint, 21);

        let unknown = from_indoor_unit(Payload::Config(Config {
            mode: None,
            fan_speed: None,
            setpoint: 23,
            ..Default::default()
        }));
        let state = state.apply(&unknown, &addresses());
        assert_eq!(state.mode, Mode::Cool);
        assert_eq!(state.fan_speed, FanSpeed::High);
        assert_eq!(state.setpoint, 23);
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let frames = [
            from_indoor_unit(Payload::Config(Config {
                setpoint: 25,
                enabled: true,
                ..Default::default()
            })),
            from_indoor_unit(Payload::ZoneConfig(ZoneConfig {
                active_zones: [Zone::Zone3].into_iter().collect(),
                ..Default::default()
            })),
            from_indoor_unit(Payload::Error(ErrorReport { code: 0x0A })),
        ];
        let start = ControllerState::default();
        for frame in frames {
            let once = start.apply(&frame, &addresses());
            let twice = once.apply(&frame, &addresses());
            assert_eq!(once, twice, "{frame}");
        }
    }

    #[test]
    fn error_code_text() {
        let state = ControllerState::default().apply(
            &from_indoor_unit(Payload::Error(ErrorReport { code: 0x0A })),
            &addresses(),
        );
        assert_eq!(state.error_code, "01 0A");
        assert!(state.error);

        let state = state.apply(
            &from_indoor_unit(Payload::Error(ErrorReport { code: 0 })),
            &addresses(),
        );
        assert_eq!(state.error_code, "");
        assert!(!state.error);
    }

    #[test]
    fn zones_are_applied() {
        let state = ControllerState::default().apply(
            &from_indoor_unit(Payload::ZoneConfig(ZoneConfig {
                active_zones: [Zone::Zone3, Zone::Zone8].into_iter().collect(),
                active_groups: ZoneGroups {
                    day: true,
                    night: false,
                },
                ..Default::default()
            })),
            &addresses(),
        );
        assert!(state.zones[2]);
        assert!(state.zones[7]);
        assert!(!state.zones[0]);
        assert!(state.zone_groups.day);
    }

    #[test]
    fn remote_temperature_from_configured_controller() {
        let config = |temperature| {
            Payload::Config(Config {
                controller: ControllerRequest {
                    temperature,
                    ..Default::default()
                },
                ..Default::default()
            })
        };
        let from = |address: u8, payload| {
            Frame::new(
                Endpoint::controller(Address::try_from(address).unwrap()),
                Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
                payload,
            )
        };

        let state = ControllerState::default().apply(&from(1, config(23)), &addresses());
        assert_eq!(state.remote_temperature, Some(23.0));

        // Other controllers and unknown temperatures are ignored
        let state = state.apply(&from(2, config(30)), &addresses());
        let state = state.apply(&from(1, config(0)), &addresses());
        assert_eq!(state.remote_temperature, Some(23.0));

        // Controller frames never touch indoor unit fields
        assert!(!state.enabled);
    }
}
