//! Addressing and bus access rules.
//!
//! The indoor unit hands a token around: every frame names the participant
//! that may transmit next. A controller that holds the token answers with
//! exactly one frame and passes the token either to the next controller
//! address or, when no such controller exists, back to indoor unit 1.

use crate::protocol::{self as proto, Address, AddressType, Endpoint, Frame, Lock, Zone, ZoneGroup};

/// The pair of addresses this controller is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusAddresses {
    /// The address this controller transmits from.
    pub controller: Address,
    /// The controller whose reported temperature feeds the remote sensor.
    pub temperature_controller: Address,
}

impl BusAddresses {
    pub fn new(controller: u8, temperature_controller: u8) -> Result<Self, proto::Error> {
        Ok(Self {
            controller: Address::try_from(controller)?,
            temperature_controller: Address::try_from(temperature_controller)?,
        })
    }

    pub fn is_primary(&self) -> bool {
        self.controller.is_primary()
    }

    pub fn own_endpoint(&self) -> Endpoint {
        Endpoint::controller(self.controller)
    }

    /// Whether `frame` was sent by this controller and read back from the line.
    pub fn is_own_echo(&self, frame: &Frame) -> bool {
        frame.source == self.own_endpoint()
    }

    /// Whether `frame` hands the token to this controller.
    pub fn holds_token(&self, frame: &Frame) -> bool {
        frame.token == self.own_endpoint()
    }

    /// The controller that would follow this one, if the address space allows.
    pub fn next_controller(&self) -> Option<Endpoint> {
        self.controller.next().map(Endpoint::controller)
    }

    /// Where to pass the token, given the kind of participant found after us.
    pub fn token_destination(&self, next: AddressType) -> Endpoint {
        match (next, self.next_controller()) {
            (AddressType::Controller, Some(controller)) => controller,
            _ => Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
        }
    }
}

/// A setting that a command changes; used for lock checks and to let a new
/// command replace an older one for the same setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPoint {
    Power,
    Mode,
    FanSpeed,
    Setpoint,
    Economy,
    TestRun,
    SwingVertical,
    SwingHorizontal,
    VerticalLouver,
    HorizontalLouver,
    FilterTimer,
    Maintenance,
    Zone(Zone),
    ZoneGroup(ZoneGroup),
    Function { function: u8, unit: u8 },
}

/// Whether the indoor unit lock flags forbid changing `point`.
pub fn is_locked(lock: &Lock, point: ControlPoint) -> bool {
    lock.all
        || match point {
            ControlPoint::Power => lock.enabled,
            ControlPoint::Mode => lock.mode,
            ControlPoint::FilterTimer => lock.reset_filter_timer,
            _ => false,
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;
    use assert_matches::assert_matches;

    #[test]
    fn address_validation() {
        assert_matches!(BusAddresses::new(15, 0), Ok(a) if *a.controller == 15);
        assert_matches!(
            BusAddresses::new(16, 0),
            Err(proto::Error::AddressOutOfRange(16))
        );
        assert_matches!(
            BusAddresses::new(0, 16),
            Err(proto::Error::AddressOutOfRange(16))
        );
        assert!(BusAddresses::new(0, 0).unwrap().is_primary());
        assert!(!BusAddresses::new(1, 0).unwrap().is_primary());
    }

    #[test]
    fn token_passing() {
        let addresses = BusAddresses::new(2, 0).unwrap();
        assert_eq!(
            addresses.token_destination(AddressType::Controller),
            Endpoint::controller(Address::try_from(3).unwrap())
        );
        assert_eq!(
            addresses.token_destination(AddressType::IndoorUnit),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT)
        );

        let last = BusAddresses::new(15, 0).unwrap();
        assert_eq!(last.next_controller(), None);
        assert_eq!(
            last.token_destination(AddressType::Controller),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT)
        );
    }

    #[test]
    fn echo_detection() {
        let addresses = BusAddresses::new(1, 0).unwrap();
        let own = Frame::new(
            addresses.own_endpoint(),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Payload::Status,
        );
        let other = Frame::new(
            Endpoint::controller(Address::PRIMARY),
            addresses.own_endpoint(),
            Payload::Status,
        );
        assert!(addresses.is_own_echo(&own));
        assert!(!addresses.is_own_echo(&other));
        assert!(addresses.holds_token(&other));
    }

    #[test]
    fn lock_flags() {
        let unlocked = Lock::default();
        assert!(!is_locked(&unlocked, ControlPoint::Power));

        let mode = Lock {
            mode: true,
            ..Default::default()
        };
        assert!(is_locked(&mode, ControlPoint::Mode));
        assert!(!is_locked(&mode, ControlPoint::Setpoint));

        let all = Lock {
            all: true,
            ..Default::default()
        };
        assert!(is_locked(&all, ControlPoint::Zone(Zone::Zone3)));

        let filter = Lock {
            reset_filter_timer: true,
            ..Default::default()
        };
        assert!(is_locked(&filter, ControlPoint::FilterTimer));
        assert!(!is_locked(&filter, ControlPoint::Power));
    }
}
