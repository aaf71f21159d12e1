//! A wired remote controller on the indoor unit bus.
//!
//! [`Controller`] consumes decoded frames, tracks the indoor unit state and
//! answers with one frame whenever it is handed the token. User requests are
//! validated synchronously and then queued in the [`Scheduler`] until the
//! indoor unit acknowledges them.
//!
//! Before taking part in normal operation the controller initializes: it
//! requests the unit's feature set, the wired zones (when supported), probes
//! for a controller at the next address and reads the active zones.

use crate::arbitration::{self, BusAddresses, ControlPoint};
use crate::entities::{
    BinarySensor, Button, Entity, EntityEvent, EntitySettings, EntityTable, EntityValue, Number,
    Sensor, Switch, TextSensor,
};
use crate::protocol::{
    self as proto, AddressType, Config, ControllerRequest, ErrorReport, FanSpeed, Features,
    Frame, Function, IndoorUnitStatus, Mode, Payload, Zone, ZoneAvailability, ZoneConfig,
    ZoneGroup, ZoneGroups, ZoneSet, MAX_SETPOINT, MAX_TEMPERATURE, MIN_SETPOINT, MIN_TEMPERATURE,
};
use crate::scheduler::{Command, Failure, Scheduler, Timing};
use crate::state::{ControllerState, LinkState};
use log::{debug, info, trace};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Errors returned synchronously when a request cannot be queued.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("The indoor unit does not support {0}")]
    Unsupported(&'static str),

    #[error("{0} is not enabled on the indoor unit")]
    ZoneNotEnabled(Zone),

    #[error("{0} is the last open zone")]
    LastOpenZone(Zone),

    #[error(transparent)]
    Protocol(#[from] proto::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationStage {
    FeatureRequest,
    ZoneRequestEnabled,
    FindNextControllerTx,
    FindNextControllerRx,
    ZoneRequestActive,
    Complete,
}

impl fmt::Display for InitializationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// Validated controller settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerConfig {
    pub addresses: BusAddresses,
    /// Transmit commands even while the indoor unit reports a lock.
    pub ignore_lock: bool,
    pub timing: Timing,
    /// A local temperature sensor feeds [`Controller::set_current_temperature`].
    pub has_temperature_sensor: bool,
    pub has_humidity_sensor: bool,
    pub entities: HashMap<Entity, EntitySettings>,
}

pub struct Controller {
    config: ControllerConfig,
    stage: InitializationStage,
    next_token_kind: AddressType,
    features: Features,
    zones: ZoneAvailability,
    indoor_unit_config: Config,
    zone_config: ZoneConfig,
    last_error_flag: bool,
    release_momentary: bool,
    temperature: u8,
    function_register: Function,
    state: ControllerState,
    scheduler: Scheduler,
    entities: EntityTable,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let scheduler = Scheduler::new(config.timing);
        let entities = EntityTable::new(&config.entities);
        Self {
            config,
            stage: InitializationStage::FeatureRequest,
            next_token_kind: AddressType::IndoorUnit,
            features: Features::default(),
            zones: ZoneAvailability::default(),
            indoor_unit_config: Config::default(),
            zone_config: ZoneConfig::default(),
            last_error_flag: false,
            release_momentary: false,
            temperature: 0,
            function_register: Function::default(),
            state: ControllerState::default(),
            scheduler,
            entities,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn zones(&self) -> &ZoneAvailability {
        &self.zones
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&EntityEvent) + 'static) {
        self.entities.subscribe(observer);
    }

    pub fn stage(&self) -> InitializationStage {
        self.stage
    }

    pub fn is_initialized(&self) -> bool {
        self.stage == InitializationStage::Complete
    }

    /// Restarts initialization with a feature request.
    pub fn reinitialize(&mut self) {
        info!("Reinitializing");
        self.set_stage(InitializationStage::FeatureRequest);
    }

    fn set_stage(&mut self, stage: InitializationStage) {
        if self.stage != stage {
            debug!("Initialization stage {} -> {stage}", self.stage);
            self.stage = stage;
        }
    }

    /// The stage that follows the feature request.
    fn after_features(&self) -> InitializationStage {
        if self.features.zones {
            InitializationStage::ZoneRequestEnabled
        } else {
            InitializationStage::FindNextControllerTx
        }
    }

    /// The stage that follows the probe for the next controller.
    fn after_controller_probe(&self) -> InitializationStage {
        if self.features.zones {
            InitializationStage::ZoneRequestActive
        } else {
            InitializationStage::Complete
        }
    }

    /// Handles one received frame and returns the frame to transmit, if this
    /// controller holds the token and the frame was the last on the wire.
    pub fn process_frame(&mut self, frame: &Frame, last_on_wire: bool, now: Instant) -> Option<Frame> {
        let addresses = self.config.addresses;
        if addresses.is_own_echo(frame) {
            trace!("Ignoring own frame {frame}");
            return None;
        }
        trace!("RX {frame}");

        if matches!(self.state.link, LinkState::Polling | LinkState::ErrorReported) {
            self.state.link = LinkState::Idle;
        }

        if self.stage == InitializationStage::FindNextControllerRx {
            if frame.source.kind != AddressType::Controller {
                debug!("No controller after address {}", addresses.controller);
                self.next_token_kind = AddressType::IndoorUnit;
            }
            self.set_stage(self.after_controller_probe());
        }

        let mut error_flag_changed = false;
        if frame.source.is_indoor_unit() {
            match &frame.payload {
                Payload::Config(config) => {
                    error_flag_changed = self.last_error_flag != config.indoor_unit.error;
                    self.last_error_flag = config.indoor_unit.error;
                    self.indoor_unit_config = Config {
                        mode: config.mode.or(Some(self.state.mode)),
                        fan_speed: config.fan_speed.or(Some(self.state.fan_speed)),
                        ..*config
                    };
                }
                Payload::Features(features) => {
                    if self.stage == InitializationStage::FeatureRequest {
                        info!("Indoor unit features: {features:?}");
                        self.features = *features;
                        self.set_stage(self.after_features());
                    }
                }
                Payload::ZoneConfig(zones) => {
                    self.zone_config = *zones;
                    if self.stage == InitializationStage::ZoneRequestActive {
                        self.set_stage(InitializationStage::Complete);
                    }
                }
                Payload::ZoneFunction(zone_function) => {
                    if self.stage == InitializationStage::ZoneRequestEnabled {
                        info!("Indoor unit zones: {:?}", zone_function.indoor_unit);
                        self.zones = zone_function.indoor_unit;
                        self.set_stage(InitializationStage::FindNextControllerTx);
                    }
                }
                Payload::Function(function) => {
                    self.function_register = Function {
                        write: false,
                        ..*function
                    };
                }
                Payload::Error(_) | Payload::Status => {}
            }
        }

        let mut next = self.state.apply(frame, &addresses);
        if !self.config.has_temperature_sensor && next.remote_temperature.is_some() {
            next.current_temperature = next.remote_temperature;
        }
        if next != self.state {
            debug!("State updated from {frame}");
            self.state = next;
        }

        if let Some(command) = self.scheduler.acknowledge(frame) {
            debug!("{command} acknowledged");
            self.state.last_failure = None;
            self.state.link = LinkState::Idle;
        }

        if last_on_wire && addresses.holds_token(frame) {
            Some(self.answer_token(frame, error_flag_changed, now))
        } else {
            None
        }
    }

    fn answer_token(&mut self, received: &Frame, error_flag_changed: bool, now: Instant) -> Frame {
        let addresses = self.config.addresses;

        if self.stage == InitializationStage::FindNextControllerTx {
            if addresses.next_controller().is_some() {
                self.next_token_kind = AddressType::Controller;
                self.set_stage(InitializationStage::FindNextControllerRx);
            } else {
                self.next_token_kind = AddressType::IndoorUnit;
                self.set_stage(self.after_controller_probe());
            }
        }

        let requests_error = (error_flag_changed && addresses.is_primary())
            || (matches!(received.payload, Payload::Error(_)) && !addresses.is_primary());

        let payload = match self.stage {
            InitializationStage::FeatureRequest => Payload::Features(Features::default()),
            InitializationStage::ZoneRequestEnabled => Payload::ZoneFunction(Default::default()),
            InitializationStage::ZoneRequestActive => Payload::ZoneConfig(ZoneConfig::default()),
            _ if requests_error => Payload::Error(ErrorReport::default()),
            _ if self.release_momentary => {
                self.release_momentary = false;
                self.config_write(|_| {})
            }
            _ => self.next_request(now),
        };

        Frame::new(
            addresses.own_endpoint(),
            addresses.token_destination(self.next_token_kind),
            payload,
        )
    }

    fn next_request(&mut self, now: Instant) -> Payload {
        let command = if self.is_initialized() {
            let lock = self.indoor_unit_config.indoor_unit.lock;
            let ignore_lock = self.config.ignore_lock;
            self.scheduler
                .transmit(now, |point| !ignore_lock && arbitration::is_locked(&lock, point))
        } else {
            None
        };

        match command {
            Some(command) => {
                self.state.link = LinkState::AwaitingAck;
                self.release_momentary = matches!(command, Command::ResetFilterTimer | Command::Maintenance);
                self.command_payload(command)
            }
            None => {
                if !self.scheduler.is_awaiting_ack() {
                    self.state.link = LinkState::Polling;
                }
                Payload::Config(self.status_config())
            }
        }
    }

    /// The indoor unit configuration echoed back with this controller's fields.
    fn status_config(&self) -> Config {
        Config {
            indoor_unit: IndoorUnitStatus::default(),
            controller: ControllerRequest {
                temperature: self.temperature,
                use_controller_sensor: self.state.use_sensor,
                ..Default::default()
            },
            ..self.indoor_unit_config
        }
    }

    fn config_write(&self, change: impl FnOnce(&mut Config)) -> Payload {
        let mut config = self.status_config();
        config.controller.write = true;
        change(&mut config);
        Payload::Config(config)
    }

    fn zone_write(&self, change: impl FnOnce(&mut ZoneConfig)) -> Payload {
        let mut zones = ZoneConfig {
            write: true,
            ..self.zone_config
        };
        change(&mut zones);
        Payload::ZoneConfig(zones)
    }

    fn command_payload(&self, command: Command) -> Payload {
        match command {
            Command::SetEnabled(v) => self.config_write(|c| c.enabled = v),
            Command::SetEconomy(v) => self.config_write(|c| c.economy = v),
            Command::SetTestRun(v) => self.config_write(|c| c.test_run = v),
            Command::SetSetpoint(v) => self.config_write(|c| c.setpoint = v),
            Command::SetMode(v) => self.config_write(|c| c.mode = Some(v)),
            Command::SetFanSpeed(v) => self.config_write(|c| c.fan_speed = Some(v)),
            Command::SetSwingVertical(v) => self.config_write(|c| c.swing_vertical = v),
            Command::SetSwingHorizontal(v) => self.config_write(|c| c.swing_horizontal = v),
            Command::AdvanceVerticalLouver => {
                self.config_write(|c| c.controller.advance_vertical_louver = true)
            }
            Command::AdvanceHorizontalLouver => {
                self.config_write(|c| c.controller.advance_horizontal_louver = true)
            }
            Command::ResetFilterTimer => self.config_write(|c| c.controller.reset_filter_timer = true),
            Command::Maintenance => self.config_write(|c| c.controller.maintenance = true),
            Command::SetZone(zone, active) => self.zone_write(|z| {
                z.active_zones.set(zone, active);
                // Changing a zone invalidates the active zone groups
                z.active_groups = ZoneGroups::default();
            }),
            Command::SetZoneGroup(group, active) => {
                self.zone_write(|z| z.active_groups.set(group, active))
            }
            Command::ReadFunction { function, unit } => Payload::Function(Function {
                write: false,
                function,
                value: 0,
                unit,
            }),
            Command::WriteFunction {
                function,
                value,
                unit,
            } => Payload::Function(Function {
                write: true,
                function,
                value,
                unit,
            }),
        }
    }

    /// Expires timeouts of the pending command.
    pub fn tick(&mut self, now: Instant) -> Option<Failure> {
        let failure = self.scheduler.tick(now)?;
        self.state.link = LinkState::ErrorReported;
        self.state.last_failure = Some(failure.reason);
        Some(failure)
    }

    /// Validates `command` and queues it for transmission.
    pub fn issue(&mut self, command: Command, now: Instant) -> Result<(), CommandError> {
        self.validate(&command)?;
        self.scheduler.issue(command, now);
        Ok(())
    }

    fn validate(&self, command: &Command) -> Result<(), CommandError> {
        let features = &self.features;
        match *command {
            Command::SetSetpoint(setpoint) if !(MIN_SETPOINT..=MAX_SETPOINT).contains(&setpoint) => {
                Err(proto::Error::SetpointOutOfRange(setpoint).into())
            }
            Command::SetMode(mode) if !features.modes.supports(mode) => {
                Err(CommandError::Unsupported("this mode"))
            }
            Command::SetFanSpeed(fan_speed) if !features.fan_speeds.supports(fan_speed) => {
                Err(CommandError::Unsupported("this fan speed"))
            }
            Command::SetSwingVertical(_) | Command::AdvanceVerticalLouver
                if !features.vertical_louvers =>
            {
                Err(CommandError::Unsupported("vertical louvers"))
            }
            Command::SetSwingHorizontal(_) | Command::AdvanceHorizontalLouver
                if !features.horizontal_louvers =>
            {
                Err(CommandError::Unsupported("horizontal louvers"))
            }
            Command::ResetFilterTimer if !features.filter_timer => {
                Err(CommandError::Unsupported("a filter timer"))
            }
            Command::Maintenance if !features.maintenance => {
                Err(CommandError::Unsupported("maintenance"))
            }
            Command::SetZoneGroup(..) if !features.zones => Err(CommandError::Unsupported("zones")),
            Command::SetZone(zone, active) => {
                if !features.zones || !self.zones.enabled_zones.contains(zone) {
                    return Err(CommandError::ZoneNotEnabled(zone));
                }
                let requested = self.requested_zones();
                if !active
                    && !self.zones.zone_common
                    && requested.count() == 1
                    && requested.contains(zone)
                {
                    return Err(CommandError::LastOpenZone(zone));
                }
                Ok(())
            }
            Command::ReadFunction { unit, .. } | Command::WriteFunction { unit, .. } => {
                Function::new(0, 0, unit)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Active zones as they will be once every queued zone change is applied.
    fn requested_zones(&self) -> ZoneSet {
        let mut zones = self.zone_config.active_zones;
        for pending in self.scheduler.pending() {
            if let Command::SetZone(zone, active) = pending.command {
                zones.set(zone, active);
            }
        }
        zones
    }

    pub fn set_enabled(&mut self, enabled: bool, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetEnabled(enabled), now)
    }

    pub fn set_economy(&mut self, economy: bool, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetEconomy(economy), now)
    }

    pub fn set_test_run(&mut self, test_run: bool, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetTestRun(test_run), now)
    }

    pub fn set_setpoint(&mut self, setpoint: u8, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetSetpoint(setpoint), now)
    }

    pub fn set_mode(&mut self, mode: Mode, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetMode(mode), now)
    }

    pub fn set_fan_speed(&mut self, fan_speed: FanSpeed, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetFanSpeed(fan_speed), now)
    }

    pub fn set_vertical_swing(&mut self, swing: bool, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetSwingVertical(swing), now)
    }

    pub fn set_horizontal_swing(&mut self, swing: bool, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetSwingHorizontal(swing), now)
    }

    pub fn advance_vertical_louver(&mut self, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::AdvanceVerticalLouver, now)
    }

    pub fn advance_horizontal_louver(&mut self, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::AdvanceHorizontalLouver, now)
    }

    pub fn reset_filter(&mut self, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::ResetFilterTimer, now)
    }

    pub fn maintenance(&mut self, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::Maintenance, now)
    }

    pub fn set_zone(&mut self, zone: Zone, active: bool, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::SetZone(zone, active), now)
    }

    pub fn set_zone_group(
        &mut self,
        group: ZoneGroup,
        active: bool,
        now: Instant,
    ) -> Result<(), CommandError> {
        self.issue(Command::SetZoneGroup(group, active), now)
    }

    /// Requests the value of an installer function register.
    pub fn read_function(&mut self, function: u8, unit: u8, now: Instant) -> Result<(), CommandError> {
        self.issue(Command::ReadFunction { function, unit }, now)
    }

    /// Writes an installer function register.
    pub fn write_function(
        &mut self,
        function: u8,
        value: u8,
        unit: u8,
        now: Instant,
    ) -> Result<(), CommandError> {
        self.issue(
            Command::WriteFunction {
                function,
                value,
                unit,
            },
            now,
        )
    }

    /// Selects whether the indoor unit uses the controller's temperature.
    ///
    /// Carried in every status poll, so no command is queued.
    pub fn use_sensor(&mut self, use_sensor: bool) -> Result<(), CommandError> {
        if !self.features.sensor_switching {
            return Err(CommandError::Unsupported("sensor switching"));
        }
        self.state.use_sensor = use_sensor;
        Ok(())
    }

    /// Feeds the temperature reported to the indoor unit.
    ///
    /// Values outside 0-60 °C are clamped, non-finite values are ignored.
    pub fn set_current_temperature(&mut self, value: f32, unit: TemperatureUnit) {
        let celsius = match unit {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        };
        if !celsius.is_finite() {
            debug!("Ignoring temperature reading {value}");
            return;
        }
        let celsius = celsius.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
        self.temperature = celsius.round() as u8;
        self.state.current_temperature = Some(celsius);
    }

    pub fn set_humidity(&mut self, humidity: f32) {
        self.state.current_humidity = humidity.is_finite().then_some(humidity);
    }

    /// Triggers a button entity.
    pub fn press(&mut self, button: Button, now: Instant) -> Result<(), CommandError> {
        match button {
            Button::ReadFunction => {
                let Function { function, unit, .. } = self.function_register;
                self.read_function(function, unit, now)
            }
            Button::WriteFunction => {
                let Function {
                    function,
                    value,
                    unit,
                    ..
                } = self.function_register;
                self.write_function(function, value, unit, now)
            }
            Button::AdvanceVerticalLouver => self.advance_vertical_louver(now),
            Button::AdvanceHorizontalLouver => self.advance_horizontal_louver(now),
            Button::ResetFilterTimer => self.reset_filter(now),
            Button::Reinitialize => {
                self.reinitialize();
                Ok(())
            }
        }
    }

    /// Changes a switch entity.
    pub fn set_switch(&mut self, switch: Switch, on: bool, now: Instant) -> Result<(), CommandError> {
        match switch {
            Switch::UseSensor => self.use_sensor(on),
            Switch::Zone(zone) => self.set_zone(zone, on, now),
            Switch::ZoneGroup(group) => self.set_zone_group(group, on, now),
        }
    }

    /// Stages a function register value for the read and write buttons.
    pub fn set_number(&mut self, number: Number, value: u8) -> Result<(), CommandError> {
        match number {
            Number::Function => self.function_register.function = value,
            Number::FunctionValue => self.function_register.value = value,
            Number::FunctionUnit => {
                self.function_register = Function::new(
                    self.function_register.function,
                    self.function_register.value,
                    value,
                )?;
            }
        }
        Ok(())
    }

    /// Publishes the current state to the entity table.
    pub fn publish(&mut self) {
        self.reveal_supported();

        let state = &self.state;
        let updates = [
            (Entity::BinarySensor(BinarySensor::Standby), EntityValue::Bool(state.standby)),
            (Entity::BinarySensor(BinarySensor::Error), EntityValue::Bool(state.error)),
            (
                Entity::BinarySensor(BinarySensor::FilterTimerExpired),
                EntityValue::Bool(state.filter_timer_expired),
            ),
            (
                Entity::BinarySensor(BinarySensor::CommandFailed),
                EntityValue::Bool(state.last_failure.is_some()),
            ),
            (
                Entity::TextSensor(TextSensor::ErrorCode),
                EntityValue::Text(state.error_code.clone()),
            ),
            (
                Entity::Number(Number::Function),
                EntityValue::Number(self.function_register.function),
            ),
            (
                Entity::Number(Number::FunctionValue),
                EntityValue::Number(self.function_register.value),
            ),
            (
                Entity::Number(Number::FunctionUnit),
                EntityValue::Number(self.function_register.unit),
            ),
            (Entity::Switch(Switch::UseSensor), EntityValue::Bool(state.use_sensor)),
            (
                Entity::Switch(Switch::ZoneGroup(ZoneGroup::Day)),
                EntityValue::Bool(state.zone_groups.day),
            ),
            (
                Entity::Switch(Switch::ZoneGroup(ZoneGroup::Night)),
                EntityValue::Bool(state.zone_groups.night),
            ),
        ];
        let zones = Zone::ALL.map(|zone| {
            (
                Entity::Switch(Switch::Zone(zone)),
                EntityValue::Bool(state.zones[zone.index()]),
            )
        });
        let remote = state.remote_temperature;

        for (entity, value) in updates.into_iter().chain(zones) {
            self.entities.publish(entity, value);
        }
        if let Some(temperature) = remote {
            self.entities
                .publish(Entity::Sensor(Sensor::RemoteTemperature), EntityValue::Float(temperature));
        }
    }

    fn reveal_supported(&mut self) {
        if self.state.remote_temperature.is_some() {
            self.entities.reveal(Entity::Sensor(Sensor::RemoteTemperature));
        }
        if !self.is_initialized() {
            return;
        }

        let features = self.features;
        let mut supported = vec![Entity::Button(Button::Reinitialize)];
        if features.sensor_switching && self.config.has_temperature_sensor {
            supported.push(Entity::Switch(Switch::UseSensor));
        }
        if features.vertical_louvers {
            supported.push(Entity::Button(Button::AdvanceVerticalLouver));
        }
        if features.horizontal_louvers {
            supported.push(Entity::Button(Button::AdvanceHorizontalLouver));
        }
        if features.filter_timer {
            supported.push(Entity::BinarySensor(BinarySensor::FilterTimerExpired));
            supported.push(Entity::Button(Button::ResetFilterTimer));
        }
        if features.zones {
            supported.extend(
                self.zones
                    .enabled_zones
                    .iter()
                    .map(|zone| Entity::Switch(Switch::Zone(zone))),
            );
            supported.extend(ZoneGroup::ALL.map(|group| Entity::Switch(Switch::ZoneGroup(group))));
        }
        for entity in supported {
            self.entities.reveal(entity);
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("addresses", &self.config.addresses)
            .field("stage", &self.stage)
            .field("state", &self.state)
            .field("pending", &self.scheduler.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::protocol::{Address, ControllerRequest, Endpoint, FrameType, Lock};
    use crate::scheduler::FailureReason;
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn controller_config(address: u8) -> ControllerConfig {
        ControllerConfig {
            addresses: BusAddresses::new(address, 0).unwrap(),
            ..Default::default()
        }
    }

    fn config_poll(controller: &mut Controller, config: Config, now: Instant) -> Frame {
        controller
            .process_frame(&from_indoor_unit(primary(), Payload::Config(config)), true, now)
            .expect("token answered")
    }

    fn zone_report(controller: &mut Controller, active: ZoneSet, now: Instant) -> Frame {
        let zones = ZoneConfig {
            active_zones: active,
            ..Default::default()
        };
        controller
            .process_frame(&from_indoor_unit(primary(), Payload::ZoneConfig(zones)), true, now)
            .expect("token answered")
    }

    #[test]
    fn initialization_sequence() {
        let controller = initialized(controller_config(0), Instant::now());
        assert_eq!(controller.features(), &full_features());
        assert_eq!(controller.zones(), &zone_availability());
        assert!(controller.state().zones[0]);
    }

    #[test]
    fn initialization_without_zones_or_next_controller() {
        let now = Instant::now();
        let mut controller = Controller::new(controller_config(15));
        let own = controller.config().addresses.own_endpoint();

        let reply = controller
            .process_frame(&from_indoor_unit(own, Payload::Status), true, now)
            .unwrap();
        assert_eq!(reply.frame_type(), FrameType::Features);

        let features = Features {
            zones: false,
            ..full_features()
        };
        let reply = controller
            .process_frame(&from_indoor_unit(own, Payload::Features(features)), true, now)
            .unwrap();
        // Address 15 has no successor, initialization completes at once
        assert!(controller.is_initialized());
        assert_eq!(reply.token, indoor_unit());
        assert_eq!(reply.frame_type(), FrameType::Config);
    }

    #[test]
    fn answers_only_final_frame_addressed_to_us() {
        let now = Instant::now();
        let mut controller = Controller::new(controller_config(0));
        let frame = from_indoor_unit(primary(), Payload::Status);
        assert_eq!(controller.process_frame(&frame, false, now), None);

        let secondary = Endpoint::controller(Address::try_from(1).unwrap());
        let other = from_indoor_unit(secondary, Payload::Status);
        assert_eq!(controller.process_frame(&other, true, now), None);

        assert!(controller.process_frame(&frame, true, now).is_some());
    }

    #[test]
    fn own_echo_is_ignored() {
        let now = Instant::now();
        let mut controller = Controller::new(controller_config(0));
        let echo = Frame::new(
            primary(),
            primary(),
            Payload::Config(Config {
                enabled: true,
                ..Default::default()
            }),
        );
        assert_eq!(controller.process_frame(&echo, true, now), None);
        assert!(!controller.state().enabled);
    }

    #[test]
    fn status_poll_echoes_configuration() {
        let now = Instant::now();
        let mut controller = initialized(controller_config(0), now);
        controller.set_current_temperature(21.6, TemperatureUnit::Celsius);
        controller.use_sensor(true).unwrap();

        let reply = config_poll(&mut controller, indoor_unit_config(), now);
        assert_matches!(reply.payload, Payload::Config(config) => {
            assert!(!config.controller.write);
            assert_eq!(config.controller.temperature, 22);
            assert!(config.controller.use_controller_sensor);
            assert_eq!(config.setpoint, 22);
            assert_eq!(config.mode, Some(Mode::Cool));
        });
        assert_eq!(controller.state().link, LinkState::Polling);
    }

    #[test]
    fn temperature_is_clamped() {
        let mut controller = Controller::new(controller_config(0));
        controller.set_current_temperature(75.0, TemperatureUnit::Celsius);
        assert_eq!(controller.state().current_temperature, Some(60.0));
        controller.set_current_temperature(-4.0, TemperatureUnit::Celsius);
        assert_eq!(controller.state().current_temperature, Some(0.0));
        controller.set_current_temperature(f32::NAN, TemperatureUnit::Celsius);
        assert_eq!(controller.state().current_temperature, Some(0.0));
        controller.set_current_temperature(21.0, TemperatureUnit::Celsius);
        controller.set_current_temperature(f32::INFINITY, TemperatureUnit::Celsius);
        assert_eq!(controller.state().current_temperature, Some(21.0));
        controller.set_current_temperature(212.0, TemperatureUnit::Fahrenheit);
        assert_eq!(controller.state().current_temperature, Some(60.0));
        controller.set_current_temperature(68.0, TemperatureUnit::Fahrenheit);
        assert_eq!(controller.state().current_temperature, Some(20.0));
    }

    fn remote_report(temperature: u8) -> Frame {
        Frame::new(
            Endpoint::controller(Address::try_from(1).unwrap()),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Payload::Config(Config {
                controller: ControllerRequest {
                    temperature,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
    }

    #[test]
    fn remote_temperature_without_local_sensor() {
        let now = Instant::now();
        let config = ControllerConfig {
            addresses: BusAddresses::new(0, 1).unwrap(),
            has_temperature_sensor: false,
            ..Default::default()
        };
        let mut controller = Controller::new(config);
        controller.process_frame(&remote_report(23), false, now);
        assert_eq!(controller.state().remote_temperature, Some(23.0));
        assert_eq!(controller.state().current_temperature, Some(23.0));
    }

    #[test]
    fn local_sensor_wins_over_remote_temperature() {
        let now = Instant::now();
        let config = ControllerConfig {
            addresses: BusAddresses::new(0, 1).unwrap(),
            has_temperature_sensor: true,
            ..Default::default()
        };
        let mut controller = Controller::new(config);
        controller.set_current_temperature(19.0, TemperatureUnit::Celsius);
        controller.process_frame(&remote_report(23), false, now);
        assert_eq!(controller.state().remote_temperature, Some(23.0));
        assert_eq!(controller.state().current_temperature, Some(19.0));
    }

    #[test]
    fn zone_three_on_is_acknowledged() {
        let start = Instant::now();
        let mut controller = initialized(controller_config(0), start);
        controller.set_zone(Zone::Zone3, true, start).unwrap();

        // Local state waits for the indoor unit
        assert!(!controller.state().zones[2]);

        let request = config_poll(&mut controller, indoor_unit_config(), start);
        assert_matches!(request.payload, Payload::ZoneConfig(zones) => {
            assert!(zones.write);
            assert!(zones.active_zones.contains(Zone::Zone3));
            assert!(zones.active_zones.contains(Zone::Zone1));
        });
        assert_eq!(controller.state().link, LinkState::AwaitingAck);

        let later = start + Duration::from_secs(1);
        zone_report(&mut controller, ZoneSet::from_bits(0b0000_0101), later);
        assert!(controller.state().zones[2]);
        assert!(controller.scheduler().is_empty());
        assert_eq!(controller.state().last_failure, None);
        assert_ne!(controller.state().link, LinkState::ErrorReported);
        assert_eq!(controller.tick(later + Duration::from_secs(10)), None);
    }

    #[test]
    fn later_zone_command_wins() {
        let start = Instant::now();
        let mut controller = initialized(controller_config(0), start);
        controller.set_zone(Zone::Zone2, true, start).unwrap();
        controller.set_zone(Zone::Zone2, false, start).unwrap();
        assert_eq!(controller.scheduler().len(), 1);

        let request = config_poll(&mut controller, indoor_unit_config(), start);
        assert_matches!(request.payload, Payload::ZoneConfig(zones) => {
            assert!(!zones.active_zones.contains(Zone::Zone2));
        });

        zone_report(&mut controller, ZoneSet::from_bits(0b0000_0001), start);
        assert!(!controller.state().zones[1]);
        assert!(controller.scheduler().is_empty());
    }

    #[test]
    fn retries_exhausted_reports_error() {
        let start = Instant::now();
        let mut controller = initialized(controller_config(0), start);
        let timing = controller.config().timing;
        controller.set_setpoint(27, start).unwrap();

        let mut now = start;
        let mut transmissions = 0;
        for _ in 0..10 {
            let reply = config_poll(&mut controller, indoor_unit_config(), now);
            if matches!(reply.payload, Payload::Config(c) if c.controller.write && c.setpoint == 27) {
                transmissions += 1;
            }
            now += timing.ack_timeout;
            if let Some(failure) = controller.tick(now) {
                assert_eq!(failure.reason, FailureReason::AckTimeout { attempts: 3 });
                break;
            }
        }
        assert_eq!(transmissions, timing.max_attempts);
        assert_eq!(controller.state().link, LinkState::ErrorReported);
        assert!(controller.state().last_failure.is_some());

        // Polling resumes without further retries
        let reply = config_poll(&mut controller, indoor_unit_config(), now);
        assert_matches!(reply.payload, Payload::Config(c) if !c.controller.write);
        assert_eq!(controller.state().link, LinkState::Polling);
    }

    #[test]
    fn second_command_waits_for_first_acknowledgement() {
        let now = Instant::now();
        let mut controller = initialized(controller_config(0), now);
        controller.set_setpoint(24, now).unwrap();
        controller.set_enabled(false, now).unwrap();

        let reply = config_poll(&mut controller, indoor_unit_config(), now);
        assert_matches!(reply.payload, Payload::Config(c) => {
            assert!(c.controller.write);
            assert_eq!(c.setpoint, 24);
            assert!(c.enabled);
        });

        // Still unacknowledged, nothing new goes out
        let reply = config_poll(&mut controller, indoor_unit_config(), now);
        assert_matches!(reply.payload, Payload::Config(c) if !c.controller.write);
        assert_eq!(controller.scheduler().len(), 2);

        let new_setpoint = Config {
            setpoint: 24,
            ..indoor_unit_config()
        };
        let reply = config_poll(&mut controller, new_setpoint, now);
        assert_matches!(reply.payload, Payload::Config(c) => {
            assert!(c.controller.write);
            assert!(!c.enabled);
            assert_eq!(c.setpoint, 24);
        });
        assert_eq!(controller.state().setpoint, 24);
        assert!(controller.state().enabled);

        let switched_off = Config {
            enabled: false,
            ..new_setpoint
        };
        let reply = config_poll(&mut controller, switched_off, now);
        assert_matches!(reply.payload, Payload::Config(c) if !c.controller.write);
        assert!(controller.scheduler().is_empty());
        assert!(!controller.state().enabled);
    }

    #[test]
    fn locked_mode_is_deferred() {
        let start = Instant::now();
        let mut controller = initialized(controller_config(0), start);
        controller.set_mode(Mode::Heat, start).unwrap();

        let locked = Config {
            indoor_unit: IndoorUnitStatus {
                lock: Lock {
                    mode: true,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..indoor_unit_config()
        };
        let reply = config_poll(&mut controller, locked, start);
        assert_matches!(reply.payload, Payload::Config(c) if !c.controller.write);

        let deadline = start + controller.config().timing.lock_deadline;
        assert_matches!(
            controller.tick(deadline),
            Some(Failure {
                reason: FailureReason::BusLocked(_),
                ..
            })
        );
    }

    #[test]
    fn ignore_lock_transmits_anyway() {
        let start = Instant::now();
        let config = ControllerConfig {
            ignore_lock: true,
            ..controller_config(0)
        };
        let mut controller = initialized(config, start);
        controller.set_enabled(false, start).unwrap();
        let locked = Config {
            indoor_unit: IndoorUnitStatus {
                lock: Lock {
                    all: true,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..indoor_unit_config()
        };
        let reply = config_poll(&mut controller, locked, start);
        assert_matches!(reply.payload, Payload::Config(c) if c.controller.write && !c.enabled);
    }

    #[test]
    fn reset_filter_is_released_in_next_frame() {
        let start = Instant::now();
        let mut controller = initialized(controller_config(0), start);
        controller.reset_filter(start).unwrap();

        let reply = config_poll(&mut controller, indoor_unit_config(), start);
        assert_matches!(reply.payload, Payload::Config(c) if c.controller.write && c.controller.reset_filter_timer);

        let reply = config_poll(&mut controller, indoor_unit_config(), start);
        assert_matches!(reply.payload, Payload::Config(c) if c.controller.write && !c.controller.reset_filter_timer);
        assert!(controller.scheduler().is_empty());
    }

    #[test]
    fn primary_requests_error_when_flag_changes() {
        let start = Instant::now();
        let mut controller = initialized(controller_config(0), start);
        let faulty = Config {
            indoor_unit: IndoorUnitStatus {
                error: true,
                ..Default::default()
            },
            ..indoor_unit_config()
        };
        let reply = config_poll(&mut controller, faulty, start);
        assert_eq!(reply.frame_type(), FrameType::Error);

        let reply = config_poll(&mut controller, faulty, start);
        assert_eq!(reply.frame_type(), FrameType::Config);

        let reply = controller
            .process_frame(
                &from_indoor_unit(primary(), Payload::Error(ErrorReport { code: 0x23 })),
                true,
                start,
            )
            .unwrap();
        assert_eq!(reply.frame_type(), FrameType::Config);
        assert!(controller.state().error);
        assert_eq!(controller.state().error_code, "01 23");
    }

    #[test]
    fn command_validation() {
        let now = Instant::now();
        let mut controller = Controller::new(controller_config(0));
        assert_matches!(
            controller.set_mode(Mode::Heat, now),
            Err(CommandError::Unsupported(_))
        );
        assert_matches!(controller.use_sensor(true), Err(CommandError::Unsupported(_)));

        let mut controller = initialized(controller_config(0), now);
        assert_matches!(
            controller.set_setpoint(31, now),
            Err(CommandError::Protocol(proto::Error::SetpointOutOfRange(31)))
        );
        assert_matches!(
            controller.set_setpoint(15, now),
            Err(CommandError::Protocol(_))
        );
        assert!(controller.set_setpoint(16, now).is_ok());
        assert_matches!(
            controller.set_zone(Zone::Zone6, true, now),
            Err(CommandError::ZoneNotEnabled(Zone::Zone6))
        );
        // Zone 1 is the only open zone and there is no common zone
        assert_matches!(
            controller.set_zone(Zone::Zone1, false, now),
            Err(CommandError::LastOpenZone(Zone::Zone1))
        );
        controller.set_zone(Zone::Zone2, true, now).unwrap();
        assert!(controller.set_zone(Zone::Zone1, false, now).is_ok());
        assert_matches!(
            controller.set_number(Number::FunctionUnit, 16),
            Err(CommandError::Protocol(proto::Error::FunctionUnitOutOfRange(16)))
        );
    }

    #[test]
    fn function_buttons_use_staged_register() {
        let now = Instant::now();
        let mut controller = initialized(controller_config(0), now);
        controller.set_number(Number::Function, 42).unwrap();
        controller.set_number(Number::FunctionUnit, 3).unwrap();
        controller.press(Button::ReadFunction, now).unwrap();

        let request = config_poll(&mut controller, indoor_unit_config(), now);
        assert_matches!(request.payload, Payload::Function(f) => {
            assert!(!f.write);
            assert_eq!((f.function, f.unit), (42, 3));
        });

        let reply = Function {
            write: false,
            function: 42,
            value: 7,
            unit: 3,
        };
        controller.process_frame(
            &from_indoor_unit(primary(), Payload::Function(reply)),
            true,
            now,
        );
        assert!(controller.scheduler().is_empty());
        assert_eq!(controller.state().function_value, 7);
    }

    #[test]
    fn entities_follow_state() {
        let now = Instant::now();
        let config = ControllerConfig {
            has_temperature_sensor: true,
            ..controller_config(0)
        };
        let mut controller = initialized(config, now);
        let events = Rc::new(RefCell::new(Vec::new()));
        {
            let events = events.clone();
            controller.subscribe(move |event| events.borrow_mut().push(event.clone()));
        }

        controller.publish();
        assert!(controller.entities().is_visible(Entity::Switch(Switch::Zone(Zone::Zone4))));
        assert!(!controller.entities().is_visible(Entity::Switch(Switch::Zone(Zone::Zone5))));
        assert!(controller.entities().is_visible(Entity::Switch(Switch::UseSensor)));
        assert!(!controller.entities().is_visible(Entity::Sensor(Sensor::RemoteTemperature)));

        events.borrow_mut().clear();
        controller.publish();
        assert!(events.borrow().is_empty());

        let faulty = Config {
            indoor_unit: IndoorUnitStatus {
                standby: true,
                ..Default::default()
            },
            ..indoor_unit_config()
        };
        config_poll(&mut controller, faulty, now);
        controller.publish();
        assert_eq!(
            *events.borrow(),
            vec![EntityEvent::State {
                entity: Entity::BinarySensor(BinarySensor::Standby),
                value: EntityValue::Bool(true)
            }]
        );
    }
}
