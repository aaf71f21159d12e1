//! Outgoing commands awaiting acknowledgement by the indoor unit.
//!
//! Commands are queued in issuance order and only the head of the queue is
//! ever on the wire. A command is acknowledged once the indoor unit reports
//! the requested value; a command that is not acknowledged in time is
//! retransmitted until its attempts run out.

use crate::arbitration::ControlPoint;
use crate::protocol::{FanSpeed, Frame, Mode, Payload, Zone, ZoneGroup};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Retry and deadline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long to wait for the indoor unit to report a transmitted change.
    pub ack_timeout: Duration,
    /// Transmissions of a command before it is dropped.
    pub max_attempts: u32,
    /// How long a command may wait for a lock to clear.
    pub lock_deadline: Duration,
    /// Silence after which the bus is considered lost.
    pub bus_silence_timeout: Duration,
}

impl Timing {
    pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_LOCK_DEADLINE: Duration = Duration::from_secs(10);
    pub const DEFAULT_BUS_SILENCE_TIMEOUT: Duration = Duration::from_secs(30);
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ack_timeout: Self::DEFAULT_ACK_TIMEOUT,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            lock_deadline: Self::DEFAULT_LOCK_DEADLINE,
            bus_silence_timeout: Self::DEFAULT_BUS_SILENCE_TIMEOUT,
        }
    }
}

/// A change requested from the indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetEnabled(bool),
    SetEconomy(bool),
    SetTestRun(bool),
    SetSetpoint(u8),
    SetMode(Mode),
    SetFanSpeed(FanSpeed),
    SetSwingVertical(bool),
    SetSwingHorizontal(bool),
    AdvanceVerticalLouver,
    AdvanceHorizontalLouver,
    ResetFilterTimer,
    Maintenance,
    SetZone(Zone, bool),
    SetZoneGroup(ZoneGroup, bool),
    ReadFunction { function: u8, unit: u8 },
    WriteFunction { function: u8, value: u8, unit: u8 },
}

impl Command {
    pub fn control_point(&self) -> ControlPoint {
        match *self {
            Command::SetEnabled(_) => ControlPoint::Power,
            Command::SetEconomy(_) => ControlPoint::Economy,
            Command::SetTestRun(_) => ControlPoint::TestRun,
            Command::SetSetpoint(_) => ControlPoint::Setpoint,
            Command::SetMode(_) => ControlPoint::Mode,
            Command::SetFanSpeed(_) => ControlPoint::FanSpeed,
            Command::SetSwingVertical(_) => ControlPoint::SwingVertical,
            Command::SetSwingHorizontal(_) => ControlPoint::SwingHorizontal,
            Command::AdvanceVerticalLouver => ControlPoint::VerticalLouver,
            Command::AdvanceHorizontalLouver => ControlPoint::HorizontalLouver,
            Command::ResetFilterTimer => ControlPoint::FilterTimer,
            Command::Maintenance => ControlPoint::Maintenance,
            Command::SetZone(zone, _) => ControlPoint::Zone(zone),
            Command::SetZoneGroup(group, _) => ControlPoint::ZoneGroup(group),
            Command::ReadFunction { function, unit }
            | Command::WriteFunction { function, unit, .. } => {
                ControlPoint::Function { function, unit }
            }
        }
    }

    /// Momentary commands trigger an action instead of setting a value.
    pub fn is_momentary(&self) -> bool {
        matches!(
            self,
            Command::AdvanceVerticalLouver
                | Command::AdvanceHorizontalLouver
                | Command::ResetFilterTimer
                | Command::Maintenance
        )
    }

    /// Whether `frame` shows the indoor unit has carried out this command.
    pub fn is_acknowledged_by(&self, frame: &Frame) -> bool {
        if !frame.source.is_indoor_unit() {
            return false;
        }
        match (&frame.payload, *self) {
            (Payload::Config(_), command) if command.is_momentary() => true,
            (Payload::Config(config), Command::SetEnabled(v)) => config.enabled == v,
            (Payload::Config(config), Command::SetEconomy(v)) => config.economy == v,
            (Payload::Config(config), Command::SetTestRun(v)) => config.test_run == v,
            (Payload::Config(config), Command::SetSetpoint(v)) => config.setpoint == v,
            (Payload::Config(config), Command::SetMode(v)) => config.mode == Some(v),
            (Payload::Config(config), Command::SetFanSpeed(v)) => config.fan_speed == Some(v),
            (Payload::Config(config), Command::SetSwingVertical(v)) => config.swing_vertical == v,
            (Payload::Config(config), Command::SetSwingHorizontal(v)) => {
                config.swing_horizontal == v
            }
            (Payload::ZoneConfig(zones), Command::SetZone(zone, active)) => {
                zones.active_zones.contains(zone) == active
            }
            (Payload::ZoneConfig(zones), Command::SetZoneGroup(group, active)) => {
                zones.active_groups.get(group) == active
            }
            (Payload::Function(reply), Command::ReadFunction { function, unit }) => {
                reply.function == function && reply.unit == unit
            }
            (
                Payload::Function(reply),
                Command::WriteFunction {
                    function,
                    value,
                    unit,
                },
            ) => reply.function == function && reply.unit == unit && reply.value == value,
            _ => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetEnabled(v) => write!(f, "set power {}", if *v { "on" } else { "off" }),
            Command::SetEconomy(v) => write!(f, "set economy {v}"),
            Command::SetTestRun(v) => write!(f, "set test run {v}"),
            Command::SetSetpoint(v) => write!(f, "set setpoint {v} °C"),
            Command::SetMode(v) => write!(f, "set mode {v}"),
            Command::SetFanSpeed(v) => write!(f, "set fan speed {v}"),
            Command::SetSwingVertical(v) => write!(f, "set vertical swing {v}"),
            Command::SetSwingHorizontal(v) => write!(f, "set horizontal swing {v}"),
            Command::AdvanceVerticalLouver => write!(f, "advance vertical louver"),
            Command::AdvanceHorizontalLouver => write!(f, "advance horizontal louver"),
            Command::ResetFilterTimer => write!(f, "reset filter timer"),
            Command::Maintenance => write!(f, "maintenance"),
            Command::SetZone(zone, active) => write!(f, "set {zone} {active}"),
            Command::SetZoneGroup(group, active) => write!(f, "set {group} {active}"),
            Command::ReadFunction { function, unit } => {
                write!(f, "read function {function} unit {unit}")
            }
            Command::WriteFunction {
                function,
                value,
                unit,
            } => write!(f, "write function {function} unit {unit} value {value}"),
        }
    }
}

/// Why a command was dropped.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    #[error("Not acknowledged after {attempts} attempts")]
    AckTimeout { attempts: u32 },

    #[error("Setting locked by the indoor unit for {0:?}")]
    BusLocked(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    pub command: Command,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: Command,
    pub issued_at: Instant,
    /// Last transmission, cleared when a retransmission is due.
    pub sent_at: Option<Instant>,
    pub attempts: u32,
    /// Set while the command is held back by an indoor unit lock.
    pub deferred_since: Option<Instant>,
}

impl PendingCommand {
    fn new(command: Command, issued_at: Instant) -> Self {
        Self {
            command,
            issued_at,
            sent_at: None,
            attempts: 0,
            deferred_since: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.attempts > 0
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<PendingCommand>,
    timing: Timing,
}

impl Scheduler {
    pub fn new(timing: Timing) -> Self {
        Self {
            queue: VecDeque::new(),
            timing,
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn head(&self) -> Option<&PendingCommand> {
        self.queue.front()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingCommand> {
        self.queue.iter()
    }

    /// Whether the head command has been transmitted and awaits its ack.
    pub fn is_awaiting_ack(&self) -> bool {
        self.head().is_some_and(PendingCommand::is_in_flight)
    }

    /// Queues `command`, replacing a queued or in-flight command for the
    /// same control point. Returns the replaced command.
    pub fn issue(&mut self, command: Command, now: Instant) -> Option<Command> {
        let point = command.control_point();
        let superseded = self
            .queue
            .iter()
            .position(|pending| pending.command.control_point() == point)
            .and_then(|index| self.queue.remove(index))
            .map(|pending| pending.command);
        if let Some(old) = superseded {
            debug!("{command} supersedes {old}");
        }
        self.queue.push_back(PendingCommand::new(command, now));
        superseded
    }

    /// Returns the head command when it is due for transmission and records
    /// the attempt. `locked` tells whether a control point is currently locked.
    pub fn transmit(
        &mut self,
        now: Instant,
        locked: impl Fn(ControlPoint) -> bool,
    ) -> Option<Command> {
        let head = self.queue.front_mut()?;
        if locked(head.command.control_point()) {
            if head.deferred_since.is_none() {
                debug!("{} deferred, setting is locked", head.command);
                head.deferred_since = Some(now);
            }
            return None;
        }
        head.deferred_since = None;
        if head.sent_at.is_some() {
            return None;
        }
        head.attempts += 1;
        head.sent_at = Some(now);
        debug!("Transmitting {} (attempt {})", head.command, head.attempts);
        Some(head.command)
    }

    /// Resolves the head command if `frame` acknowledges it.
    pub fn acknowledge(&mut self, frame: &Frame) -> Option<Command> {
        let head = self.queue.front()?;
        if head.is_in_flight() && head.command.is_acknowledged_by(frame) {
            self.queue.pop_front().map(|pending| pending.command)
        } else {
            None
        }
    }

    /// Expires the head command's ack timeout or lock deadline.
    pub fn tick(&mut self, now: Instant) -> Option<Failure> {
        let timing = self.timing;
        let head = self.queue.front_mut()?;

        if let Some(since) = head.deferred_since {
            let waited = now.saturating_duration_since(since);
            if waited >= timing.lock_deadline {
                return self.drop_head(FailureReason::BusLocked(waited));
            }
            return None;
        }

        let sent_at = head.sent_at?;
        if now.saturating_duration_since(sent_at) < timing.ack_timeout {
            return None;
        }
        if head.attempts >= timing.max_attempts {
            let attempts = head.attempts;
            return self.drop_head(FailureReason::AckTimeout { attempts });
        }
        debug!("{} not acknowledged, retrying", head.command);
        head.sent_at = None;
        None
    }

    fn drop_head(&mut self, reason: FailureReason) -> Option<Failure> {
        let pending = self.queue.pop_front()?;
        warn!("Dropping {}: {reason}", pending.command);
        Some(Failure {
            command: pending.command,
            reason,
        })
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Address, Config, Endpoint, Function, ZoneConfig, ZoneSet};
    use assert_matches::assert_matches;

    fn unlocked(_: ControlPoint) -> bool {
        false
    }

    fn indoor_unit(payload: Payload) -> Frame {
        Frame::new(
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Endpoint::controller(Address::PRIMARY),
            payload,
        )
    }

    fn zones(active: &[Zone]) -> Frame {
        indoor_unit(Payload::ZoneConfig(ZoneConfig {
            active_zones: active.iter().copied().collect::<ZoneSet>(),
            ..Default::default()
        }))
    }

    #[test]
    fn transmits_head_once_per_attempt() {
        let now = Instant::now();
        let mut scheduler = Scheduler::default();
        scheduler.issue(Command::SetSetpoint(22), now);
        scheduler.issue(Command::SetEnabled(true), now);

        assert_eq!(scheduler.transmit(now, unlocked), Some(Command::SetSetpoint(22)));
        assert_eq!(scheduler.transmit(now, unlocked), None);
        assert!(scheduler.is_awaiting_ack());
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn newer_command_supersedes_older_for_same_zone() {
        let now = Instant::now();
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.issue(Command::SetZone(Zone::Zone3, true), now), None);
        scheduler.transmit(now, unlocked);
        assert_eq!(
            scheduler.issue(Command::SetZone(Zone::Zone3, false), now),
            Some(Command::SetZone(Zone::Zone3, true))
        );
        assert_eq!(scheduler.len(), 1);

        assert_eq!(
            scheduler.transmit(now, unlocked),
            Some(Command::SetZone(Zone::Zone3, false))
        );
        // A report matching the superseded command does not resolve the new one
        assert_eq!(scheduler.acknowledge(&zones(&[Zone::Zone3])), None);
        assert_eq!(
            scheduler.acknowledge(&zones(&[Zone::Zone1])),
            Some(Command::SetZone(Zone::Zone3, false))
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn superseding_keeps_issuance_order() {
        let now = Instant::now();
        let mut scheduler = Scheduler::default();
        scheduler.issue(Command::SetMode(Mode::Cool), now);
        scheduler.issue(Command::SetSetpoint(20), now);
        scheduler.issue(Command::SetMode(Mode::Heat), now);
        let order: Vec<_> = scheduler.pending().map(|p| p.command).collect();
        assert_eq!(
            order,
            vec![Command::SetSetpoint(20), Command::SetMode(Mode::Heat)]
        );
    }

    #[test]
    fn retries_until_attempts_exhausted() {
        let start = Instant::now();
        let timing = Timing::default();
        let mut scheduler = Scheduler::new(timing);
        scheduler.issue(Command::SetEnabled(true), start);

        let mut now = start;
        for attempt in 1..=timing.max_attempts {
            assert_eq!(
                scheduler.transmit(now, unlocked),
                Some(Command::SetEnabled(true)),
                "attempt {attempt}"
            );
            now += timing.ack_timeout;
            if attempt < timing.max_attempts {
                assert_eq!(scheduler.tick(now), None);
            }
        }
        assert_matches!(
            scheduler.tick(now),
            Some(Failure {
                command: Command::SetEnabled(true),
                reason: FailureReason::AckTimeout { attempts: 3 }
            })
        );
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.transmit(now, unlocked), None);
    }

    #[test]
    fn locked_command_is_deferred_then_dropped() {
        let start = Instant::now();
        let mut scheduler = Scheduler::default();
        scheduler.issue(Command::SetMode(Mode::Heat), start);

        let mode_locked = |point: ControlPoint| point == ControlPoint::Mode;
        assert_eq!(scheduler.transmit(start, mode_locked), None);
        assert_eq!(scheduler.head().unwrap().attempts, 0);
        assert_eq!(scheduler.tick(start + Duration::from_secs(5)), None);

        let deadline = start + Timing::DEFAULT_LOCK_DEADLINE;
        assert_matches!(
            scheduler.tick(deadline),
            Some(Failure {
                reason: FailureReason::BusLocked(_),
                ..
            })
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn lock_clearing_resumes_transmission() {
        let start = Instant::now();
        let mut scheduler = Scheduler::default();
        scheduler.issue(Command::SetEnabled(false), start);
        assert_eq!(scheduler.transmit(start, |_| true), None);
        assert_eq!(
            scheduler.transmit(start + Duration::from_secs(1), unlocked),
            Some(Command::SetEnabled(false))
        );
        assert_eq!(scheduler.head().unwrap().deferred_since, None);
    }

    #[test]
    fn acknowledgement_matching() {
        let config = Config {
            enabled: true,
            setpoint: 24,
            ..Default::default()
        };
        let frame = indoor_unit(Payload::Config(config));
        assert!(Command::SetEnabled(true).is_acknowledged_by(&frame));
        assert!(!Command::SetEnabled(false).is_acknowledged_by(&frame));
        assert!(Command::SetSetpoint(24).is_acknowledged_by(&frame));
        assert!(Command::ResetFilterTimer.is_acknowledged_by(&frame));
        assert!(!Command::SetZone(Zone::Zone1, false).is_acknowledged_by(&frame));

        let function = indoor_unit(Payload::Function(Function {
            function: 11,
            value: 2,
            unit: 1,
            ..Default::default()
        }));
        assert!(Command::ReadFunction {
            function: 11,
            unit: 1
        }
        .is_acknowledged_by(&function));
        assert!(!Command::WriteFunction {
            function: 11,
            value: 3,
            unit: 1
        }
        .is_acknowledged_by(&function));

        // Reports from other controllers never acknowledge
        let echo = Frame::new(
            Endpoint::controller(Address::PRIMARY),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Payload::Config(config),
        );
        assert!(!Command::SetEnabled(true).is_acknowledged_by(&echo));
    }

    #[test]
    fn untransmitted_command_is_not_acknowledged() {
        let now = Instant::now();
        let mut scheduler = Scheduler::default();
        scheduler.issue(Command::SetZone(Zone::Zone2, true), now);
        assert_eq!(scheduler.acknowledge(&zones(&[Zone::Zone2])), None);
        assert_eq!(scheduler.len(), 1);
    }
}
