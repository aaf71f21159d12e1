//! Entities exposed to a host framework.
//!
//! Every entity has a fixed slot in an [`EntityTable`], addressed by the
//! [`Entity`] enum. Hosts subscribe to the table and are told about value
//! changes and about entities becoming visible.

use crate::protocol::{Zone, ZoneGroup, MAX_ZONES};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySensor {
    Standby,
    Error,
    FilterTimerExpired,
    CommandFailed,
}

impl BinarySensor {
    pub const ALL: [BinarySensor; 4] = [
        BinarySensor::Standby,
        BinarySensor::Error,
        BinarySensor::FilterTimerExpired,
        BinarySensor::CommandFailed,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSensor {
    ErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    RemoteTemperature,
}

/// Installer function registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Number {
    Function,
    FunctionValue,
    FunctionUnit,
}

impl Number {
    pub const ALL: [Number; 3] = [Number::Function, Number::FunctionValue, Number::FunctionUnit];

    /// Inclusive value range.
    pub fn range(self) -> (u8, u8) {
        match self {
            Number::Function | Number::FunctionValue => (0, u8::MAX),
            Number::FunctionUnit => (0, crate::protocol::MAX_FUNCTION_UNIT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Switch {
    UseSensor,
    Zone(Zone),
    ZoneGroup(ZoneGroup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    ReadFunction,
    WriteFunction,
    AdvanceVerticalLouver,
    AdvanceHorizontalLouver,
    ResetFilterTimer,
    Reinitialize,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::ReadFunction,
        Button::WriteFunction,
        Button::AdvanceVerticalLouver,
        Button::AdvanceHorizontalLouver,
        Button::ResetFilterTimer,
        Button::Reinitialize,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    BinarySensor(BinarySensor),
    TextSensor(TextSensor),
    Sensor(Sensor),
    Number(Number),
    Switch(Switch),
    Button(Button),
}

const SWITCH_BASE: usize = 9;
const BUTTON_BASE: usize = SWITCH_BASE + 1 + MAX_ZONES + 2;

impl Entity {
    /// Number of entity slots.
    pub const COUNT: usize = BUTTON_BASE + Button::ALL.len();

    /// Every entity in slot order.
    pub fn all() -> Vec<Entity> {
        let mut all = Vec::with_capacity(Self::COUNT);
        all.extend(BinarySensor::ALL.map(Entity::BinarySensor));
        all.push(Entity::TextSensor(TextSensor::ErrorCode));
        all.push(Entity::Sensor(Sensor::RemoteTemperature));
        all.extend(Number::ALL.map(Entity::Number));
        all.push(Entity::Switch(Switch::UseSensor));
        all.extend(Zone::ALL.map(|zone| Entity::Switch(Switch::Zone(zone))));
        all.extend(ZoneGroup::ALL.map(|group| Entity::Switch(Switch::ZoneGroup(group))));
        all.extend(Button::ALL.map(Entity::Button));
        all
    }

    /// Stable slot index.
    pub fn index(self) -> usize {
        match self {
            Entity::BinarySensor(sensor) => sensor as usize,
            Entity::TextSensor(TextSensor::ErrorCode) => 4,
            Entity::Sensor(Sensor::RemoteTemperature) => 5,
            Entity::Number(number) => 6 + number as usize,
            Entity::Switch(Switch::UseSensor) => SWITCH_BASE,
            Entity::Switch(Switch::Zone(zone)) => SWITCH_BASE + 1 + zone.index(),
            Entity::Switch(Switch::ZoneGroup(group)) => SWITCH_BASE + 1 + MAX_ZONES + group.index(),
            Entity::Button(button) => BUTTON_BASE + button as usize,
        }
    }

    /// The key used for this entity in configuration files.
    pub fn key(self) -> String {
        match self {
            Entity::BinarySensor(BinarySensor::Standby) => "standby_mode".into(),
            Entity::BinarySensor(BinarySensor::Error) => "error_state".into(),
            Entity::BinarySensor(BinarySensor::FilterTimerExpired) => "filter_timer_expired".into(),
            Entity::BinarySensor(BinarySensor::CommandFailed) => "command_failed".into(),
            Entity::TextSensor(TextSensor::ErrorCode) => "error_code".into(),
            Entity::Sensor(Sensor::RemoteTemperature) => "remote_sensor".into(),
            Entity::Number(Number::Function) => "function".into(),
            Entity::Number(Number::FunctionValue) => "function_value".into(),
            Entity::Number(Number::FunctionUnit) => "function_unit".into(),
            Entity::Switch(Switch::UseSensor) => "use_sensor".into(),
            Entity::Switch(Switch::Zone(zone)) => format!("zone_{}", zone.number()),
            Entity::Switch(Switch::ZoneGroup(ZoneGroup::Day)) => "zone_group_day".into(),
            Entity::Switch(Switch::ZoneGroup(ZoneGroup::Night)) => "zone_group_night".into(),
            Entity::Button(Button::ReadFunction) => "get_function".into(),
            Entity::Button(Button::WriteFunction) => "set_function".into(),
            Entity::Button(Button::AdvanceVerticalLouver) => "advance_vertical_louver".into(),
            Entity::Button(Button::AdvanceHorizontalLouver) => "advance_horizontal_louver".into(),
            Entity::Button(Button::ResetFilterTimer) => "reset_filter_timer".into(),
            Entity::Button(Button::Reinitialize) => "reinitialize".into(),
        }
    }

    pub fn from_key(key: &str) -> Option<Entity> {
        Self::all().into_iter().find(|entity| entity.key() == key)
    }

    pub fn default_name(self) -> String {
        match self {
            Entity::BinarySensor(BinarySensor::Standby) => "Standby Mode".into(),
            Entity::BinarySensor(BinarySensor::Error) => "Error".into(),
            Entity::BinarySensor(BinarySensor::FilterTimerExpired) => "Filter Timer Expired".into(),
            Entity::BinarySensor(BinarySensor::CommandFailed) => "Command Failed".into(),
            Entity::TextSensor(TextSensor::ErrorCode) => "Error Code".into(),
            Entity::Sensor(Sensor::RemoteTemperature) => "Remote Temperature Sensor".into(),
            Entity::Number(Number::Function) => "Function".into(),
            Entity::Number(Number::FunctionValue) => "Function Value".into(),
            Entity::Number(Number::FunctionUnit) => "Function Unit".into(),
            Entity::Switch(Switch::UseSensor) => "Use Sensor".into(),
            Entity::Switch(Switch::Zone(zone)) => format!("Zone {}", zone.number()),
            Entity::Switch(Switch::ZoneGroup(ZoneGroup::Day)) => "Zone Group Day".into(),
            Entity::Switch(Switch::ZoneGroup(ZoneGroup::Night)) => "Zone Group Night".into(),
            Entity::Button(Button::ReadFunction) => "Function Read".into(),
            Entity::Button(Button::WriteFunction) => "Function Write".into(),
            Entity::Button(Button::AdvanceVerticalLouver) => "Advance Vertical Louver".into(),
            Entity::Button(Button::AdvanceHorizontalLouver) => "Advance Horizontal Louver".into(),
            Entity::Button(Button::ResetFilterTimer) => "Reset Filter Timer".into(),
            Entity::Button(Button::Reinitialize) => "Reinitialize".into(),
        }
    }

    /// Entities hidden until the indoor unit shows them to be usable.
    fn hidden_until_supported(self) -> bool {
        matches!(
            self,
            Entity::BinarySensor(BinarySensor::FilterTimerExpired)
                | Entity::Sensor(Sensor::RemoteTemperature)
                | Entity::Switch(_)
                | Entity::Button(
                    Button::AdvanceVerticalLouver
                        | Button::AdvanceHorizontalLouver
                        | Button::ResetFilterTimer
                        | Button::Reinitialize
                )
        )
    }

    fn disabled_by_default(self) -> bool {
        self == Entity::Button(Button::WriteFunction)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Per entity overrides from the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct EntitySettings {
    pub name: Option<String>,
    /// `Some(true)` hides the entity for good, `Some(false)` shows it from
    /// the start; `None` shows it once the indoor unit supports it.
    pub internal: Option<bool>,
    pub disabled_by_default: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    pub name: String,
    pub internal: bool,
    pub disabled_by_default: bool,
    pinned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Bool(bool),
    Text(String),
    Float(f32),
    Number(u8),
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityValue::Bool(true) => write!(f, "ON"),
            EntityValue::Bool(false) => write!(f, "OFF"),
            EntityValue::Text(text) => write!(f, "{text:?}"),
            EntityValue::Float(value) => write!(f, "{value:.1}"),
            EntityValue::Number(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    State { entity: Entity, value: EntityValue },
    Visible { entity: Entity },
}

type Observer = Box<dyn FnMut(&EntityEvent)>;

pub struct EntityTable {
    info: Vec<EntityInfo>,
    values: Vec<Option<EntityValue>>,
    observers: Vec<Observer>,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl fmt::Debug for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTable")
            .field("info", &self.info)
            .field("values", &self.values)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EntityTable {
    pub fn new(settings: &HashMap<Entity, EntitySettings>) -> Self {
        let info = Entity::all()
            .into_iter()
            .map(|entity| {
                let overrides = settings.get(&entity);
                let internal = overrides.and_then(|s| s.internal);
                EntityInfo {
                    name: overrides
                        .and_then(|s| s.name.clone())
                        .unwrap_or_else(|| entity.default_name()),
                    internal: internal.unwrap_or_else(|| entity.hidden_until_supported()),
                    disabled_by_default: overrides
                        .and_then(|s| s.disabled_by_default)
                        .unwrap_or_else(|| entity.disabled_by_default()),
                    pinned: internal.is_some(),
                }
            })
            .collect();
        Self {
            info,
            values: vec![None; Entity::COUNT],
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&EntityEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn info(&self, entity: Entity) -> &EntityInfo {
        &self.info[entity.index()]
    }

    pub fn value(&self, entity: Entity) -> Option<&EntityValue> {
        self.values[entity.index()].as_ref()
    }

    pub fn is_visible(&self, entity: Entity) -> bool {
        !self.info(entity).internal
    }

    /// Stores `value` and notifies observers if it differs from the last one.
    pub fn publish(&mut self, entity: Entity, value: EntityValue) {
        let slot = &mut self.values[entity.index()];
        if slot.as_ref() == Some(&value) {
            return;
        }
        *slot = Some(value.clone());
        self.notify(EntityEvent::State { entity, value });
    }

    /// Makes an entity visible unless the configuration decided otherwise.
    pub fn reveal(&mut self, entity: Entity) {
        let info = &mut self.info[entity.index()];
        if info.pinned || !info.internal {
            return;
        }
        info.internal = false;
        self.notify(EntityEvent::Visible { entity });
    }

    fn notify(&mut self, event: EntityEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }
}
