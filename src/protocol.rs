//! Wire format of the Fujitsu Halcyon wired remote controller bus.
//!
//! Every frame on the bus is exactly [`FRAME_SIZE`] bytes long and is sent
//! bitwise inverted. Each byte travels as one 8E1 UART symbol, so the only
//! integrity check the bus offers is the even parity bit of each symbol; the
//! codec works on [`Symbol`]s to keep that check visible.
//!
//! The layout of every field is described by a byte index and a bit mask
//! (see the private `field` module). The constants were obtained by
//! capturing traffic between indoor units and Fujitsu wired controllers.

use std::fmt;
use std::ops::Deref;

/// Number of bytes in every frame.
pub const FRAME_SIZE: usize = 8;

/// Number of switchable zones, excluding the common (constant) zone.
pub const MAX_ZONES: usize = 8;

/// Lowest setpoint accepted by the indoor unit in °C.
pub const MIN_SETPOINT: u8 = 16;
/// Highest setpoint accepted by the indoor unit in °C.
pub const MAX_SETPOINT: u8 = 30;

/// Lowest temperature a controller can report to the indoor unit in °C.
pub const MIN_TEMPERATURE: f32 = 0.0;
/// Highest temperature a controller can report to the indoor unit in °C.
pub const MAX_TEMPERATURE: f32 = 60.0;

/// Highest value of the function unit register.
pub const MAX_FUNCTION_UNIT: u8 = 15;

/// Errors produced while encoding, decoding or validating protocol values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Frame length {actual} does not match the fixed frame size {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Parity mismatch in frame byte {index}")]
    Checksum { index: usize },

    #[error("Unknown frame type code {0}")]
    UnknownCommand(u8),

    #[error("Invalid {field} code {value}")]
    InvalidField { field: &'static str, value: u8 },

    #[error("Address {0} out of range ({min}-{max})", min = Address::MIN, max = Address::MAX)]
    AddressOutOfRange(u8),

    #[error("Zone {0} out of range (1-{max})", max = MAX_ZONES)]
    ZoneOutOfRange(u8),

    #[error("Setpoint {0} °C out of range ({min}-{max})", min = MIN_SETPOINT, max = MAX_SETPOINT)]
    SetpointOutOfRange(u8),

    #[error("Function unit {0} out of range (0-{max})", max = MAX_FUNCTION_UNIT)]
    FunctionUnitOutOfRange(u8),
}

/// Formats bytes as upper-case hex pairs separated by spaces.
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A bus address of an indoor unit or controller (0 to 15).
///
/// Controller address 0 is the primary controller, every other address is a
/// secondary controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(u8);

impl Address {
    /// The minimum valid address.
    pub const MIN: u8 = 0;
    /// The maximum valid address.
    pub const MAX: u8 = 15;
    /// The address of the primary controller.
    pub const PRIMARY: Address = Address(0);
    /// The address the first indoor unit answers on.
    pub const FIRST_INDOOR_UNIT: Address = Address(1);

    pub fn is_primary(self) -> bool {
        self == Self::PRIMARY
    }

    /// The address following this one, if any.
    pub fn next(self) -> Option<Address> {
        if self.0 < Self::MAX {
            Some(Address(self.0 + 1))
        } else {
            None
        }
    }
}

impl Deref for Address {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressType {
    #[default]
    IndoorUnit,
    Controller,
}

impl AddressType {
    fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            AddressType::IndoorUnit
        } else {
            AddressType::Controller
        }
    }

    fn bit(self) -> u8 {
        match self {
            AddressType::IndoorUnit => 0,
            AddressType::Controller => 1,
        }
    }
}

/// A participant on the bus: an address type together with its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub kind: AddressType,
    pub address: Address,
}

impl Endpoint {
    pub const fn indoor_unit(address: Address) -> Self {
        Self {
            kind: AddressType::IndoorUnit,
            address,
        }
    }

    pub const fn controller(address: Address) -> Self {
        Self {
            kind: AddressType::Controller,
            address,
        }
    }

    pub fn is_indoor_unit(&self) -> bool {
        self.kind == AddressType::IndoorUnit
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AddressType::IndoorUnit => write!(f, "IU{}", self.address),
            AddressType::Controller => write!(f, "RC{}", self.address),
        }
    }
}

/// The frame type code, carried in bits 4-6 of byte 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Config = 0,
    Error = 1,
    Features = 2,
    Function = 3,
    Status = 4,
    ZoneConfig = 5,
    ZoneFunction = 6,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(FrameType::Config),
            1 => Ok(FrameType::Error),
            2 => Ok(FrameType::Features),
            3 => Ok(FrameType::Function),
            4 => Ok(FrameType::Status),
            5 => Ok(FrameType::ZoneConfig),
            6 => Ok(FrameType::ZoneFunction),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum FanSpeed {
    #[default]
    Auto = 0,
    Quiet = 1,
    Low = 2,
    Medium = 3,
    High = 4,
}

impl TryFrom<u8> for FanSpeed {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(FanSpeed::Auto),
            1 => Ok(FanSpeed::Quiet),
            2 => Ok(FanSpeed::Low),
            3 => Ok(FanSpeed::Medium),
            4 => Ok(FanSpeed::High),
            _ => Err(Error::InvalidField {
                field: "fan speed",
                value,
            }),
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Mode {
    #[default]
    Fan = 1,
    Dry = 2,
    Cool = 3,
    Heat = 4,
    Auto = 5,
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            1 => Ok(Mode::Fan),
            2 => Ok(Mode::Dry),
            3 => Ok(Mode::Cool),
            4 => Ok(Mode::Heat),
            5 => Ok(Mode::Auto),
            _ => Err(Error::InvalidField {
                field: "mode",
                value,
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One of the eight switchable zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Zone {
    Zone1 = 0,
    Zone2 = 1,
    Zone3 = 2,
    Zone4 = 3,
    Zone5 = 4,
    Zone6 = 5,
    Zone7 = 6,
    Zone8 = 7,
}

impl Zone {
    pub const ALL: [Zone; MAX_ZONES] = [
        Zone::Zone1,
        Zone::Zone2,
        Zone::Zone3,
        Zone::Zone4,
        Zone::Zone5,
        Zone::Zone6,
        Zone::Zone7,
        Zone::Zone8,
    ];

    /// Zero based index, also the bit position in a [`ZoneSet`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The one based zone number printed on the unit.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }
}

impl TryFrom<u8> for Zone {
    type Error = Error;

    /// Converts a one based zone number.
    fn try_from(number: u8) -> Result<Self, Error> {
        match number {
            1..=8 => Ok(Zone::ALL[number as usize - 1]),
            _ => Err(Error::ZoneOutOfRange(number)),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone {}", self.number())
    }
}

/// The two zone groups an installer can associate zones with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneGroup {
    Day,
    Night,
}

impl ZoneGroup {
    pub const ALL: [ZoneGroup; 2] = [ZoneGroup::Day, ZoneGroup::Night];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ZoneGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneGroup::Day => write!(f, "day group"),
            ZoneGroup::Night => write!(f, "night group"),
        }
    }
}

/// A set of zones stored as the bus bitmap (bit 0 = zone 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ZoneSet(u8);

impl ZoneSet {
    pub const EMPTY: ZoneSet = ZoneSet(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, zone: Zone) -> bool {
        self.0 & (1 << zone.index()) != 0
    }

    pub fn set(&mut self, zone: Zone, active: bool) {
        if active {
            self.0 |= 1 << zone.index();
        } else {
            self.0 &= !(1 << zone.index());
        }
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn iter(self) -> impl Iterator<Item = Zone> {
        Zone::ALL.into_iter().filter(move |zone| self.contains(*zone))
    }

    pub fn to_array(self) -> [bool; MAX_ZONES] {
        Zone::ALL.map(|zone| self.contains(zone))
    }
}

impl FromIterator<Zone> for ZoneSet {
    fn from_iter<I: IntoIterator<Item = Zone>>(iter: I) -> Self {
        let mut set = ZoneSet::EMPTY;
        for zone in iter {
            set.set(zone, true);
        }
        set
    }
}

/// Lock flags reported by the indoor unit, set by an installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lock {
    pub reset_filter_timer: bool,
    pub enabled: bool,
    pub mode: bool,
    pub timer: bool,
    pub all: bool,
}

impl Lock {
    pub fn any(&self) -> bool {
        self.reset_filter_timer || self.enabled || self.mode || self.timer || self.all
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeenControllers {
    pub primary: bool,
    pub secondary: bool,
}

/// Config fields only present in frames sent by an indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndoorUnitStatus {
    pub lock: Lock,
    pub seen_controller: SeenControllers,
    pub standby: bool,
    pub error: bool,
    pub filter_timer_expired: bool,
}

/// Config fields only present in frames sent by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerRequest {
    /// Temperature measured by the controller in whole °C, 0 when unknown.
    pub temperature: u8,
    pub write: bool,
    pub use_controller_sensor: bool,
    pub advance_horizontal_louver: bool,
    pub advance_vertical_louver: bool,
    pub reset_filter_timer: bool,
    pub maintenance: bool,
}

/// Operating configuration of the indoor unit.
///
/// Only the part matching the frame's source type (`indoor_unit` or
/// `controller`) is carried on the wire; the other part decodes as default.
/// A fan speed or mode value outside the known range decodes as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub indoor_unit: IndoorUnitStatus,
    pub controller: ControllerRequest,
    pub fan_speed: Option<FanSpeed>,
    pub mode: Option<Mode>,
    pub setpoint: u8,
    pub enabled: bool,
    pub economy: bool,
    pub test_run: bool,
    pub swing_horizontal: bool,
    pub swing_vertical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorReport {
    pub code: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSupport {
    pub auto: bool,
    pub heat: bool,
    pub fan: bool,
    pub dry: bool,
    pub cool: bool,
}

impl ModeSupport {
    pub fn supports(&self, mode: Mode) -> bool {
        match mode {
            Mode::Fan => self.fan,
            Mode::Dry => self.dry,
            Mode::Cool => self.cool,
            Mode::Heat => self.heat,
            Mode::Auto => self.auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanSpeedSupport {
    pub quiet: bool,
    pub low: bool,
    pub medium: bool,
    pub high: bool,
    pub auto: bool,
}

impl FanSpeedSupport {
    pub fn supports(&self, fan_speed: FanSpeed) -> bool {
        match fan_speed {
            FanSpeed::Auto => self.auto,
            FanSpeed::Quiet => self.quiet,
            FanSpeed::Low => self.low,
            FanSpeed::Medium => self.medium,
            FanSpeed::High => self.high,
        }
    }
}

/// Capabilities advertised by the indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    pub modes: ModeSupport,
    pub fan_speeds: FanSpeedSupport,
    pub filter_timer: bool,
    pub sensor_switching: bool,
    pub maintenance: bool,
    pub economy_mode: bool,
    pub horizontal_louvers: bool,
    pub vertical_louvers: bool,
    pub zones: bool,
}

/// An installer function register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Function {
    /// Write flag, only carried by controller frames.
    pub write: bool,
    pub function: u8,
    pub value: u8,
    /// Function unit, 0 to [`MAX_FUNCTION_UNIT`].
    pub unit: u8,
}

impl Function {
    pub fn new(function: u8, value: u8, unit: u8) -> Result<Self, Error> {
        if unit > MAX_FUNCTION_UNIT {
            return Err(Error::FunctionUnitOutOfRange(unit));
        }
        Ok(Self {
            write: false,
            function,
            value,
            unit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneGroups {
    pub day: bool,
    pub night: bool,
}

impl ZoneGroups {
    pub fn get(&self, group: ZoneGroup) -> bool {
        match group {
            ZoneGroup::Day => self.day,
            ZoneGroup::Night => self.night,
        }
    }

    pub fn set(&mut self, group: ZoneGroup, active: bool) {
        match group {
            ZoneGroup::Day => self.day = active,
            ZoneGroup::Night => self.night = active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneGroupAssociations {
    pub day: ZoneSet,
    pub night: ZoneSet,
}

/// Active zones and zone groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneConfig {
    /// Write flag, only carried by controller frames.
    pub write: bool,
    pub active_zones: ZoneSet,
    pub active_groups: ZoneGroups,
    pub associations: ZoneGroupAssociations,
}

/// Zones wired to the indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneAvailability {
    /// Whether the unit has a common zone that is always open.
    pub zone_common: bool,
    pub enabled_zones: ZoneSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneFunction {
    /// Only carried by indoor unit frames.
    pub indoor_unit: ZoneAvailability,
    /// Only carried by controller frames.
    pub write: bool,
    pub function: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Config(Config),
    Error(ErrorReport),
    Features(Features),
    Function(Function),
    Status,
    ZoneConfig(ZoneConfig),
    ZoneFunction(ZoneFunction),
}

impl Payload {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Payload::Config(_) => FrameType::Config,
            Payload::Error(_) => FrameType::Error,
            Payload::Features(_) => FrameType::Features,
            Payload::Function(_) => FrameType::Function,
            Payload::Status => FrameType::Status,
            Payload::ZoneConfig(_) => FrameType::ZoneConfig,
            Payload::ZoneFunction(_) => FrameType::ZoneFunction,
        }
    }
}

/// A UART symbol as seen on the line: one data byte plus its even parity bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Symbol(u16);

impl Symbol {
    const PARITY_BIT: u16 = 1 << 8;

    /// Builds the symbol a transmitter sends for `byte`.
    pub fn from_byte(byte: u8) -> Self {
        Self::from_parts(byte, byte.count_ones() % 2 == 1)
    }

    pub fn from_parts(byte: u8, parity: bool) -> Self {
        Self(u16::from(byte) | if parity { Self::PARITY_BIT } else { 0 })
    }

    /// Builds a symbol from its raw 9 bit representation (bit 8 is parity).
    pub fn from_bits(bits: u16) -> Self {
        Self(bits & 0x01FF)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn parity(self) -> bool {
        self.0 & Self::PARITY_BIT != 0
    }

    /// Whether the data bits and parity bit contain an even number of ones.
    pub fn is_valid(self) -> bool {
        self.0.count_ones() % 2 == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Field {
    byte: usize,
    mask: u8,
}

impl Field {
    const fn new(byte: usize, mask: u8) -> Self {
        Self { byte, mask }
    }

    fn shift(self) -> u32 {
        self.mask.trailing_zeros()
    }

    fn get(self, buffer: &[u8; FRAME_SIZE]) -> u8 {
        (buffer[self.byte] & self.mask) >> self.shift()
    }

    fn flag(self, buffer: &[u8; FRAME_SIZE]) -> bool {
        self.get(buffer) != 0
    }

    fn set(self, buffer: &mut [u8; FRAME_SIZE], value: u8) {
        buffer[self.byte] |= (value << self.shift()) & self.mask;
    }

    fn set_flag(self, buffer: &mut [u8; FRAME_SIZE], value: bool) {
        self.set(buffer, u8::from(value));
    }
}

mod field {
    use super::Field;

    pub const SOURCE_TYPE: Field = Field::new(0, 0b0010_0000);
    pub const SOURCE_ADDRESS: Field = Field::new(0, 0b0000_1111);
    pub const TOKEN_TYPE: Field = Field::new(1, 0b0010_0000);
    pub const TOKEN_ADDRESS: Field = Field::new(1, 0b0000_1111);
    pub const TYPE: Field = Field::new(2, 0b0111_0000);

    pub mod config {
        use super::Field;

        pub const LOCK_RESET_FILTER_TIMER: Field = Field::new(6, 0b1000_0000);
        pub const LOCK_ENABLED: Field = Field::new(6, 0b0100_0000);
        pub const LOCK_MODE: Field = Field::new(6, 0b0010_0000);
        pub const LOCK_TIMER: Field = Field::new(6, 0b0000_1000);
        pub const LOCK_ALL: Field = Field::new(6, 0b0000_0100);
        pub const SEEN_SECONDARY: Field = Field::new(6, 0b0000_0010);
        pub const SEEN_PRIMARY: Field = Field::new(6, 0b0000_0001);
        pub const STANDBY: Field = Field::new(2, 0b0000_1000);
        pub const ERROR: Field = Field::new(3, 0b1000_0000);
        pub const FILTER_TIMER_EXPIRED: Field = Field::new(7, 0b0100_0000);

        pub const WRITE: Field = Field::new(2, 0b0000_1000);
        pub const USE_CONTROLLER_SENSOR: Field = Field::new(5, 0b1000_0000);
        pub const ADVANCE_HORIZONTAL_LOUVER: Field = Field::new(5, 0b0000_1000);
        pub const ADVANCE_VERTICAL_LOUVER: Field = Field::new(5, 0b0000_0010);
        pub const TEMPERATURE: Field = Field::new(6, 0b0111_1110);
        pub const RESET_FILTER_TIMER: Field = Field::new(7, 0b0100_0000);
        pub const MAINTENANCE: Field = Field::new(7, 0b0010_0000);

        pub const FAN_SPEED: Field = Field::new(3, 0b0111_0000);
        pub const MODE: Field = Field::new(3, 0b0000_1110);
        pub const ENABLED: Field = Field::new(3, 0b0000_0001);
        pub const ECONOMY: Field = Field::new(4, 0b1000_0000);
        pub const TEST_RUN: Field = Field::new(4, 0b0100_0000);
        pub const SETPOINT: Field = Field::new(4, 0b0001_1111);
        pub const SWING_HORIZONTAL: Field = Field::new(5, 0b0001_0000);
        pub const SWING_VERTICAL: Field = Field::new(5, 0b0000_0100);
    }

    pub mod error {
        use super::Field;

        pub const CODE: Field = Field::new(4, 0b1111_1111);
    }

    pub mod features {
        use super::Field;

        pub const MODE_AUTO: Field = Field::new(3, 0b0001_0000);
        pub const MODE_HEAT: Field = Field::new(3, 0b0000_1000);
        pub const MODE_FAN: Field = Field::new(3, 0b0000_0100);
        pub const MODE_DRY: Field = Field::new(3, 0b0000_0010);
        pub const MODE_COOL: Field = Field::new(3, 0b0000_0001);
        pub const FAN_QUIET: Field = Field::new(4, 0b0001_0000);
        pub const FAN_LOW: Field = Field::new(4, 0b0000_1000);
        pub const FAN_MEDIUM: Field = Field::new(4, 0b0000_0100);
        pub const FAN_HIGH: Field = Field::new(4, 0b0000_0010);
        pub const FAN_AUTO: Field = Field::new(4, 0b0000_0001);
        pub const FILTER_TIMER: Field = Field::new(5, 0b1000_0000);
        pub const SENSOR_SWITCHING: Field = Field::new(5, 0b0100_0000);
        pub const MAINTENANCE: Field = Field::new(5, 0b0000_1000);
        pub const ECONOMY_MODE: Field = Field::new(5, 0b0000_0100);
        pub const HORIZONTAL_LOUVERS: Field = Field::new(5, 0b0000_0010);
        pub const VERTICAL_LOUVERS: Field = Field::new(5, 0b0000_0001);
        pub const ZONES: Field = Field::new(6, 0b0001_0000);
    }

    pub mod function {
        use super::Field;

        pub const WRITE: Field = Field::new(2, 0b0000_1000);
        pub const FUNCTION: Field = Field::new(4, 0b1111_1111);
        pub const VALUE: Field = Field::new(5, 0b1111_1111);
        pub const UNIT: Field = Field::new(7, 0b0000_1111);
    }

    pub mod zone_config {
        use super::Field;

        pub const WRITE: Field = Field::new(2, 0b0000_1000);
        pub const ACTIVE_ZONES: Field = Field::new(3, 0b1111_1111);
        pub const GROUP_DAY: Field = Field::new(4, 0b0000_1000);
        pub const GROUP_NIGHT: Field = Field::new(4, 0b0001_0000);
        pub const ASSOCIATIONS_1_4: Field = Field::new(5, 0b1111_1111);
        pub const ASSOCIATIONS_5_8: Field = Field::new(6, 0b1111_1111);
    }

    pub mod zone_function {
        use super::Field;

        pub const ZONE_COMMON: Field = Field::new(2, 0b0000_1000);
        pub const ENABLED_ZONES: Field = Field::new(3, 0b1111_1111);
        pub const WRITE: Field = Field::new(5, 0b1000_0000);
        pub const FUNCTION: Field = Field::new(6, 0b1111_1111);
        pub const VALUE: Field = Field::new(7, 0b1111_1111);
    }
}

/// Collects the odd (`odd == true`) or even bit positions of `input` into the
/// low nibble of the result.
fn extract_bits(input: u8, odd: bool) -> u8 {
    (0..8)
        .filter(|i| (i % 2 == 1) == odd)
        .enumerate()
        .fold(0, |output, (j, i)| output | ((input >> i) & 1) << j)
}

/// Spreads the low nibble of `input` over the odd or even bit positions.
fn interleave_bits(input: u8, odd: bool) -> u8 {
    (0..8)
        .filter(|i| (i % 2 == 1) == odd)
        .enumerate()
        .fold(0, |output, (j, i)| output | ((input >> j) & 1) << i)
}

/// A decoded bus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub source: Endpoint,
    /// The participant that may transmit next.
    pub token: Endpoint,
    pub payload: Payload,
}

impl Frame {
    pub fn new(source: Endpoint, token: Endpoint, payload: Payload) -> Self {
        Self {
            source,
            token,
            payload,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        self.payload.frame_type()
    }

    /// Encodes the frame into line symbols with even parity.
    pub fn encode(&self) -> [Symbol; FRAME_SIZE] {
        self.to_bytes().map(Symbol::from_byte)
    }

    /// Decodes line symbols, checking the parity of every symbol first.
    pub fn decode(symbols: &[Symbol]) -> Result<Self, Error> {
        if symbols.len() != FRAME_SIZE {
            return Err(Error::FrameLength {
                expected: FRAME_SIZE,
                actual: symbols.len(),
            });
        }
        let mut bytes = [0u8; FRAME_SIZE];
        for (index, (byte, symbol)) in bytes.iter_mut().zip(symbols).enumerate() {
            if !symbol.is_valid() {
                return Err(Error::Checksum { index });
            }
            *byte = symbol.byte();
        }
        Self::from_bytes(&bytes)
    }

    /// Encodes the frame into the inverted bytes sent on the wire.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        self.to_logical().map(|b| !b)
    }

    /// Decodes the inverted bytes received from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let buffer: [u8; FRAME_SIZE] = bytes.try_into().map_err(|_| Error::FrameLength {
            expected: FRAME_SIZE,
            actual: bytes.len(),
        })?;
        Self::from_logical(&buffer.map(|b| !b))
    }

    /// The frame layout before inversion, as shown in captures.
    pub fn to_logical(&self) -> [u8; FRAME_SIZE] {
        let mut buffer = [0u8; FRAME_SIZE];
        let b = &mut buffer;

        field::SOURCE_TYPE.set(b, self.source.kind.bit());
        field::SOURCE_ADDRESS.set(b, *self.source.address);
        field::TOKEN_TYPE.set(b, self.token.kind.bit());
        field::TOKEN_ADDRESS.set(b, *self.token.address);
        // Set in every captured frame
        b[1] |= 0b1000_0000;
        field::TYPE.set(b, self.frame_type() as u8);

        let from_indoor_unit = self.source.is_indoor_unit();

        match &self.payload {
            Payload::Config(config) => {
                use field::config as f;

                if from_indoor_unit {
                    let iu = &config.indoor_unit;
                    f::STANDBY.set_flag(b, iu.standby);
                    f::ERROR.set_flag(b, iu.error);
                    f::SEEN_PRIMARY.set_flag(b, iu.seen_controller.primary);
                    f::SEEN_SECONDARY.set_flag(b, iu.seen_controller.secondary);
                    f::LOCK_ALL.set_flag(b, iu.lock.all);
                    f::LOCK_TIMER.set_flag(b, iu.lock.timer);
                    f::LOCK_MODE.set_flag(b, iu.lock.mode);
                    f::LOCK_ENABLED.set_flag(b, iu.lock.enabled);
                    f::LOCK_RESET_FILTER_TIMER.set_flag(b, iu.lock.reset_filter_timer);
                    f::FILTER_TIMER_EXPIRED.set_flag(b, iu.filter_timer_expired);
                    b[5] |= 0b1010_0000;
                    b[7] |= 0b0010_0000;
                } else {
                    let rc = &config.controller;
                    f::WRITE.set_flag(b, rc.write);
                    f::ADVANCE_VERTICAL_LOUVER.set_flag(b, rc.advance_vertical_louver);
                    f::ADVANCE_HORIZONTAL_LOUVER.set_flag(b, rc.advance_horizontal_louver);
                    f::TEMPERATURE.set(b, rc.temperature);
                    f::USE_CONTROLLER_SENSOR.set_flag(b, rc.use_controller_sensor);
                    f::MAINTENANCE.set_flag(b, rc.maintenance);
                    f::RESET_FILTER_TIMER.set_flag(b, rc.reset_filter_timer);
                    if !self.source.address.is_primary() {
                        b[5] |= 0b0010_0000;
                    }
                }

                f::MODE.set(b, config.mode.map_or(0, |mode| mode as u8));
                f::FAN_SPEED.set(b, config.fan_speed.map_or(0, |speed| speed as u8));
                f::ECONOMY.set_flag(b, config.economy);
                f::ENABLED.set_flag(b, config.enabled);
                f::SETPOINT.set(b, config.setpoint);
                f::TEST_RUN.set_flag(b, config.test_run);
                f::SWING_VERTICAL.set_flag(b, config.swing_vertical);
                f::SWING_HORIZONTAL.set_flag(b, config.swing_horizontal);
            }
            Payload::Error(report) => {
                field::error::CODE.set(b, report.code);
            }
            Payload::Features(features) => {
                use field::features as f;

                if from_indoor_unit {
                    f::MODE_COOL.set_flag(b, features.modes.cool);
                    f::MODE_DRY.set_flag(b, features.modes.dry);
                    f::MODE_FAN.set_flag(b, features.modes.fan);
                    f::MODE_HEAT.set_flag(b, features.modes.heat);
                    f::MODE_AUTO.set_flag(b, features.modes.auto);
                    f::FAN_AUTO.set_flag(b, features.fan_speeds.auto);
                    f::FAN_HIGH.set_flag(b, features.fan_speeds.high);
                    f::FAN_MEDIUM.set_flag(b, features.fan_speeds.medium);
                    f::FAN_LOW.set_flag(b, features.fan_speeds.low);
                    f::FAN_QUIET.set_flag(b, features.fan_speeds.quiet);
                    f::ECONOMY_MODE.set_flag(b, features.economy_mode);
                    f::FILTER_TIMER.set_flag(b, features.filter_timer);
                    f::MAINTENANCE.set_flag(b, features.maintenance);
                    f::SENSOR_SWITCHING.set_flag(b, features.sensor_switching);
                    f::VERTICAL_LOUVERS.set_flag(b, features.vertical_louvers);
                    f::HORIZONTAL_LOUVERS.set_flag(b, features.horizontal_louvers);
                    f::ZONES.set_flag(b, features.zones);
                    b[6] |= 0b0000_0001;
                }
            }
            Payload::Function(function) => {
                use field::function as f;

                if !from_indoor_unit {
                    f::WRITE.set_flag(b, function.write);
                }
                f::FUNCTION.set(b, function.function);
                f::VALUE.set(b, function.value);
                f::UNIT.set(b, function.unit);
            }
            Payload::Status => {}
            Payload::ZoneConfig(zones) => {
                use field::zone_config as f;

                if !from_indoor_unit {
                    f::WRITE.set_flag(b, zones.write);
                    b[4] |= 0b1000_0000;
                }
                f::ACTIVE_ZONES.set(b, zones.active_zones.bits());
                f::GROUP_DAY.set_flag(b, zones.active_groups.day);
                f::GROUP_NIGHT.set_flag(b, zones.active_groups.night);

                let day = zones.associations.day.bits();
                let night = zones.associations.night.bits();
                f::ASSOCIATIONS_1_4.set(
                    b,
                    interleave_bits(day, true) | interleave_bits(night, false),
                );
                f::ASSOCIATIONS_5_8.set(
                    b,
                    interleave_bits(day >> 4, true) | interleave_bits(night >> 4, false),
                );
                b[7] |= 0b0100_0000;
            }
            Payload::ZoneFunction(zone_function) => {
                use field::zone_function as f;

                if from_indoor_unit {
                    f::ZONE_COMMON.set_flag(b, zone_function.indoor_unit.zone_common);
                    f::ENABLED_ZONES.set(b, zone_function.indoor_unit.enabled_zones.bits());
                } else {
                    f::WRITE.set_flag(b, zone_function.write);
                }
                f::FUNCTION.set(b, zone_function.function);
                f::VALUE.set(b, zone_function.value);
            }
        }

        buffer
    }

    /// Parses the frame layout before inversion.
    pub fn from_logical(b: &[u8; FRAME_SIZE]) -> Result<Self, Error> {
        let source = Endpoint {
            kind: AddressType::from_bit(field::SOURCE_TYPE.get(b)),
            address: Address(field::SOURCE_ADDRESS.get(b)),
        };
        let token = Endpoint {
            kind: AddressType::from_bit(field::TOKEN_TYPE.get(b)),
            address: Address(field::TOKEN_ADDRESS.get(b)),
        };
        let from_indoor_unit = source.is_indoor_unit();

        let payload = match FrameType::try_from(field::TYPE.get(b))? {
            FrameType::Config => {
                use field::config as f;

                let mut config = Config {
                    mode: Mode::try_from(f::MODE.get(b)).ok(),
                    fan_speed: FanSpeed::try_from(f::FAN_SPEED.get(b)).ok(),
                    enabled: f::ENABLED.flag(b),
                    economy: f::ECONOMY.flag(b),
                    setpoint: f::SETPOINT.get(b),
                    test_run: f::TEST_RUN.flag(b),
                    swing_vertical: f::SWING_VERTICAL.flag(b),
                    swing_horizontal: f::SWING_HORIZONTAL.flag(b),
                    ..Default::default()
                };
                if from_indoor_unit {
                    config.indoor_unit = IndoorUnitStatus {
                        lock: Lock {
                            reset_filter_timer: f::LOCK_RESET_FILTER_TIMER.flag(b),
                            enabled: f::LOCK_ENABLED.flag(b),
                            mode: f::LOCK_MODE.flag(b),
                            timer: f::LOCK_TIMER.flag(b),
                            all: f::LOCK_ALL.flag(b),
                        },
                        seen_controller: SeenControllers {
                            primary: f::SEEN_PRIMARY.flag(b),
                            secondary: f::SEEN_SECONDARY.flag(b),
                        },
                        standby: f::STANDBY.flag(b),
                        error: f::ERROR.flag(b),
                        filter_timer_expired: f::FILTER_TIMER_EXPIRED.flag(b),
                    };
                } else {
                    config.controller = ControllerRequest {
                        temperature: f::TEMPERATURE.get(b),
                        write: f::WRITE.flag(b),
                        use_controller_sensor: f::USE_CONTROLLER_SENSOR.flag(b),
                        advance_horizontal_louver: f::ADVANCE_HORIZONTAL_LOUVER.flag(b),
                        advance_vertical_louver: f::ADVANCE_VERTICAL_LOUVER.flag(b),
                        reset_filter_timer: f::RESET_FILTER_TIMER.flag(b),
                        maintenance: f::MAINTENANCE.flag(b),
                    };
                }
                Payload::Config(config)
            }
            FrameType::Error => Payload::Error(ErrorReport {
                code: field::error::CODE.get(b),
            }),
            FrameType::Features => {
                use field::features as f;

                let mut features = Features::default();
                if from_indoor_unit {
                    features = Features {
                        modes: ModeSupport {
                            auto: f::MODE_AUTO.flag(b),
                            heat: f::MODE_HEAT.flag(b),
                            fan: f::MODE_FAN.flag(b),
                            dry: f::MODE_DRY.flag(b),
                            cool: f::MODE_COOL.flag(b),
                        },
                        fan_speeds: FanSpeedSupport {
                            quiet: f::FAN_QUIET.flag(b),
                            low: f::FAN_LOW.flag(b),
                            medium: f::FAN_MEDIUM.flag(b),
                            high: f::FAN_HIGH.flag(b),
                            auto: f::FAN_AUTO.flag(b),
                        },
                        filter_timer: f::FILTER_TIMER.flag(b),
                        sensor_switching: f::SENSOR_SWITCHING.flag(b),
                        maintenance: f::MAINTENANCE.flag(b),
                        economy_mode: f::ECONOMY_MODE.flag(b),
                        horizontal_louvers: f::HORIZONTAL_LOUVERS.flag(b),
                        vertical_louvers: f::VERTICAL_LOUVERS.flag(b),
                        zones: f::ZONES.flag(b),
                    };
                }
                Payload::Features(features)
            }
            FrameType::Function => {
                use field::function as f;

                Payload::Function(Function {
                    write: !from_indoor_unit && f::WRITE.flag(b),
                    function: f::FUNCTION.get(b),
                    value: f::VALUE.get(b),
                    unit: f::UNIT.get(b),
                })
            }
            FrameType::Status => Payload::Status,
            FrameType::ZoneConfig => {
                use field::zone_config as f;

                let associations_1_4 = f::ASSOCIATIONS_1_4.get(b);
                let associations_5_8 = f::ASSOCIATIONS_5_8.get(b);
                Payload::ZoneConfig(ZoneConfig {
                    write: !from_indoor_unit && f::WRITE.flag(b),
                    active_zones: ZoneSet(f::ACTIVE_ZONES.get(b)),
                    active_groups: ZoneGroups {
                        day: f::GROUP_DAY.flag(b),
                        night: f::GROUP_NIGHT.flag(b),
                    },
                    associations: ZoneGroupAssociations {
                        day: ZoneSet(
                            extract_bits(associations_5_8, true) << 4
                                | extract_bits(associations_1_4, true),
                        ),
                        night: ZoneSet(
                            extract_bits(associations_5_8, false) << 4
                                | extract_bits(associations_1_4, false),
                        ),
                    },
                })
            }
            FrameType::ZoneFunction => {
                use field::zone_function as f;

                let mut zone_function = ZoneFunction {
                    function: f::FUNCTION.get(b),
                    value: f::VALUE.get(b),
                    ..Default::default()
                };
                if from_indoor_unit {
                    zone_function.indoor_unit = ZoneAvailability {
                        zone_common: f::ZONE_COMMON.flag(b),
                        enabled_zones: ZoneSet(f::ENABLED_ZONES.get(b)),
                    };
                } else {
                    zone_function.write = f::WRITE.flag(b);
                }
                Payload::ZoneFunction(zone_function)
            }
        };

        Ok(Self {
            source,
            token,
            payload,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} [{}]",
            self.frame_type(),
            self.source,
            self.token,
            format_hex(&self.to_logical())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn address(value: u8) -> Address {
        Address::try_from(value).unwrap()
    }

    fn indoor_unit_config() -> Frame {
        Frame::new(
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Endpoint::controller(Address::PRIMARY),
            Payload::Config(Config {
                indoor_unit: IndoorUnitStatus {
                    lock: Lock {
                        mode: true,
                        ..Default::default()
                    },
                    seen_controller: SeenControllers {
                        primary: true,
                        secondary: false,
                    },
                    standby: true,
                    error: false,
                    filter_timer_expired: true,
                },
                fan_speed: Some(FanSpeed::Medium),
                mode: Some(Mode::Heat),
                setpoint: 22,
                enabled: true,
                swing_vertical: true,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn address_range() {
        assert_matches!(Address::try_from(0), Ok(a) if a.is_primary());
        assert_matches!(Address::try_from(15), Ok(a) if *a == 15);
        assert_matches!(Address::try_from(16), Err(Error::AddressOutOfRange(16)));
        assert_eq!(address(14).next(), Some(address(15)));
        assert_eq!(address(15).next(), None);
    }

    #[test]
    fn zone_numbers() {
        assert_matches!(Zone::try_from(1), Ok(Zone::Zone1));
        assert_matches!(Zone::try_from(8), Ok(Zone::Zone8));
        assert_matches!(Zone::try_from(0), Err(Error::ZoneOutOfRange(0)));
        assert_matches!(Zone::try_from(9), Err(Error::ZoneOutOfRange(9)));
        assert_eq!(Zone::Zone3.index(), 2);
        assert_eq!(Zone::Zone3.to_string(), "zone 3");
    }

    #[test]
    fn zone_set() {
        let mut set: ZoneSet = [Zone::Zone1, Zone::Zone3].into_iter().collect();
        assert_eq!(set.bits(), 0b0000_0101);
        set.set(Zone::Zone1, false);
        set.set(Zone::Zone8, true);
        assert_eq!(set.count(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Zone::Zone3, Zone::Zone8]);
        assert_eq!(
            set.to_array(),
            [false, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn symbol_parity() {
        assert!(!Symbol::from_byte(0x00).parity());
        assert!(Symbol::from_byte(0x01).parity());
        assert!(!Symbol::from_byte(0x03).parity());
        assert!(Symbol::from_byte(0xFE).parity());
        assert!(Symbol::from_byte(0xA7).is_valid());
        assert!(!Symbol::from_parts(0xA7, false).is_valid());
        assert_eq!(Symbol::from_byte(0xA7).byte(), 0xA7);
    }

    #[test]
    fn features_request_wire_bytes() {
        let frame = Frame::new(
            Endpoint::controller(Address::PRIMARY),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Payload::Features(Features::default()),
        );
        assert_eq!(frame.to_logical(), [0x20, 0x81, 0x20, 0, 0, 0, 0, 0]);
        assert_eq!(
            frame.to_bytes(),
            [0xDF, 0x7E, 0xDF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn indoor_unit_config_layout() {
        let logical = indoor_unit_config().to_logical();
        // source IU1, token RC0
        assert_eq!(logical[0], 0x01);
        assert_eq!(logical[1], 0x80);
        // type config, standby
        assert_eq!(logical[2], 0x08);
        // fan medium, mode heat, enabled
        assert_eq!(logical[3], 0b0011_1001);
        assert_eq!(logical[4], 22);
        // swing vertical plus constant bits
        assert_eq!(logical[5], 0b1010_0100);
        // mode lock, seen primary
        assert_eq!(logical[6], 0b0010_0001);
        // filter expired plus constant bit
        assert_eq!(logical[7], 0b0110_0000);
    }

    #[test]
    fn controller_config_temperature() {
        let frame = Frame::new(
            Endpoint::controller(address(1)),
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Payload::Config(Config {
                controller: ControllerRequest {
                    temperature: 23,
                    write: true,
                    use_controller_sensor: true,
                    ..Default::default()
                },
                mode: Some(Mode::Cool),
                setpoint: 24,
                ..Default::default()
            }),
        );
        let logical = frame.to_logical();
        assert_eq!(logical[6], 23 << 1);
        // use sensor plus secondary controller constant bit
        assert_eq!(logical[5], 0b1010_0000);
        assert_eq!(Frame::decode(&frame.encode()), Ok(frame));
    }

    #[test]
    fn round_trip() {
        let controller = Endpoint::controller(Address::PRIMARY);
        let indoor_unit = Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT);
        let frames = [
            indoor_unit_config(),
            Frame::new(indoor_unit, controller, Payload::Error(ErrorReport { code: 0xA3 })),
            Frame::new(
                indoor_unit,
                controller,
                Payload::Features(Features {
                    modes: ModeSupport {
                        cool: true,
                        heat: true,
                        ..Default::default()
                    },
                    fan_speeds: FanSpeedSupport {
                        auto: true,
                        quiet: true,
                        ..Default::default()
                    },
                    filter_timer: true,
                    zones: true,
                    ..Default::default()
                }),
            ),
            Frame::new(
                controller,
                indoor_unit,
                Payload::Function(Function {
                    write: true,
                    function: 0x2C,
                    value: 0x81,
                    unit: 15,
                }),
            ),
            Frame::new(indoor_unit, controller, Payload::Status),
            Frame::new(
                controller,
                indoor_unit,
                Payload::ZoneConfig(ZoneConfig {
                    write: true,
                    active_zones: [Zone::Zone2, Zone::Zone7].into_iter().collect(),
                    active_groups: ZoneGroups {
                        day: true,
                        night: false,
                    },
                    associations: ZoneGroupAssociations {
                        day: ZoneSet::from_bits(0b1001_0001),
                        night: ZoneSet::from_bits(0b0110_1110),
                    },
                }),
            ),
            Frame::new(
                indoor_unit,
                controller,
                Payload::ZoneFunction(ZoneFunction {
                    indoor_unit: ZoneAvailability {
                        zone_common: true,
                        enabled_zones: ZoneSet::from_bits(0x3F),
                    },
                    function: 1,
                    value: 2,
                    ..Default::default()
                }),
            ),
        ];

        for frame in frames {
            assert_eq!(Frame::decode(&frame.encode()), Ok(frame), "{frame}");
            assert_eq!(Frame::from_bytes(&frame.to_bytes()), Ok(frame), "{frame}");
        }
    }

    #[test]
    fn unknown_mode_and_fan_speed() {
        let mut logical = indoor_unit_config().to_logical();
        // fan speed 7, mode 7
        logical[3] |= 0b0111_1110;
        let frame = Frame::from_logical(&logical).unwrap();
        assert_matches!(frame.payload, Payload::Config(config) => {
            assert_eq!(config.mode, None);
            assert_eq!(config.fan_speed, None);
            assert_eq!(config.setpoint, 22);
            assert!(config.enabled);
        });

        logical[3] &= !0b0000_1110;
        let frame = Frame::from_logical(&logical).unwrap();
        assert_matches!(frame.payload, Payload::Config(config) if config.mode.is_none());
    }

    #[test]
    fn zone_group_associations_interleave() {
        let frame = Frame::new(
            Endpoint::indoor_unit(Address::FIRST_INDOOR_UNIT),
            Endpoint::controller(Address::PRIMARY),
            Payload::ZoneConfig(ZoneConfig {
                associations: ZoneGroupAssociations {
                    day: [Zone::Zone1, Zone::Zone5].into_iter().collect(),
                    night: [Zone::Zone2, Zone::Zone8].into_iter().collect(),
                },
                ..Default::default()
            }),
        );
        let logical = frame.to_logical();
        // zone 1 day -> bit 1, zone 2 night -> bit 2
        assert_eq!(logical[5], 0b0000_0110);
        // zone 5 day -> bit 1, zone 8 night -> bit 6
        assert_eq!(logical[6], 0b0100_0010);
        assert_eq!(logical[7], 0b0100_0000);
    }

    #[test]
    fn single_bit_flip_is_detected() {
        let symbols = indoor_unit_config().encode();
        for index in 0..FRAME_SIZE {
            for bit in 0..9 {
                let mut corrupted = symbols;
                corrupted[index] = Symbol::from_bits(corrupted[index].bits() ^ (1 << bit));
                assert_matches!(
                    Frame::decode(&corrupted),
                    Err(Error::Checksum { index: i }) if i == index
                );
            }
        }
    }

    #[test]
    fn frame_length() {
        let symbols = indoor_unit_config().encode();
        assert_matches!(
            Frame::decode(&symbols[..7]),
            Err(Error::FrameLength {
                expected: 8,
                actual: 7
            })
        );
        let mut long = symbols.to_vec();
        long.push(Symbol::from_byte(0xFF));
        assert_matches!(
            Frame::decode(&long),
            Err(Error::FrameLength { actual: 9, .. })
        );
        assert_matches!(Frame::from_bytes(&[]), Err(Error::FrameLength { actual: 0, .. }));
    }

    #[test]
    fn unknown_frame_type() {
        let mut logical = [0u8; FRAME_SIZE];
        logical[2] = 0b0111_0000;
        assert_matches!(Frame::from_logical(&logical), Err(Error::UnknownCommand(7)));
    }

    #[test]
    fn mode_and_fan_speed_codes() {
        assert_matches!(Mode::try_from(3), Ok(Mode::Cool));
        assert_matches!(
            Mode::try_from(0),
            Err(Error::InvalidField { field: "mode", value: 0 })
        );
        assert_matches!(FanSpeed::try_from(4), Ok(FanSpeed::High));
        assert_matches!(FanSpeed::try_from(5), Err(Error::InvalidField { .. }));
    }

    #[test]
    fn function_unit_range() {
        assert_matches!(Function::new(1, 2, 15), Ok(f) if f.unit == 15);
        assert_matches!(
            Function::new(1, 2, 16),
            Err(Error::FunctionUnitOutOfRange(16))
        );
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(format_hex(&[0x01, 0xAB, 0x00]), "01 AB 00");
        assert_eq!(format_hex(&[]), "");
    }
}
