use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Units a [`Temperature`] can be built from or viewed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempUnit {
    /// Native device encoding: tenths of a degree Fahrenheit.
    Device,
    Celsius,
    Fahrenheit,
}

impl FromStr for TempUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "device" => Ok(TempUnit::Device),
            "c" | "celsius" => Ok(TempUnit::Celsius),
            "f" | "fahrenheit" => Ok(TempUnit::Fahrenheit),
            other => Err(Error::InvalidUnit(other.to_string())),
        }
    }
}

/// Temperature stored in device units (tenths of a degree Fahrenheit).
///
/// Values are never mutated; a changed setpoint is a new `Temperature`.
/// Equality compares the device value, the writability flag and the slot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temperature {
    device: i64,
    writable: bool,
    name: Option<TempSlot>,
}

impl Temperature {
    pub fn new(value: f64, unit: TempUnit) -> Self {
        let device = match unit {
            TempUnit::Device => value.round(),
            TempUnit::Celsius => (18.0 * value + 320.0).round(),
            TempUnit::Fahrenheit => (10.0 * value).round(),
        };
        Self {
            device: device as i64,
            writable: false,
            name: None,
        }
    }

    /// Build from a unit name as used by hosts ("c", "f", "device", ...).
    pub fn parse(value: f64, unit: &str) -> crate::Result<Self> {
        Ok(Self::new(value, unit.parse()?))
    }

    pub fn from_device(device: i64) -> Self {
        Self {
            device,
            writable: false,
            name: None,
        }
    }

    pub fn from_celsius(c: f64) -> Self {
        Self::new(c, TempUnit::Celsius)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self::new(f, TempUnit::Fahrenheit)
    }

    /// Tag this value as the reading of a named slot.
    pub fn for_slot(self, slot: TempSlot, writable: bool) -> Self {
        Self {
            writable,
            name: Some(slot),
            ..self
        }
    }

    pub fn device(&self) -> i64 {
        self.device
    }

    pub fn celsius(&self) -> f64 {
        (self.device as f64 - 320.0) / 18.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.device as f64 / 10.0
    }

    pub fn as_unit(&self, unit: TempUnit) -> f64 {
        match unit {
            TempUnit::Device => self.device as f64,
            TempUnit::Celsius => self.celsius(),
            TempUnit::Fahrenheit => self.fahrenheit(),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn name(&self) -> Option<TempSlot> {
        self.name
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.celsius())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeatMode {
    Comfort,
    Eco,
    Frost,
    Program,
    Boost,
    Off,
}

impl HeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeatMode::Comfort => "comfort",
            HeatMode::Eco => "eco",
            HeatMode::Frost => "frost",
            HeatMode::Program => "program",
            HeatMode::Boost => "boost",
            HeatMode::Off => "off",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "comfort" => Some(HeatMode::Comfort),
            "eco" => Some(HeatMode::Eco),
            "frost" => Some(HeatMode::Frost),
            "program" => Some(HeatMode::Program),
            "boost" => Some(HeatMode::Boost),
            "off" => Some(HeatMode::Off),
            _ => None,
        }
    }
}

impl fmt::Display for HeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named setpoint or reading on a radiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TempSlot {
    Eco,
    Frost,
    Comfort,
    Current,
    Boost,
    /// Synthesized from whichever slot the heat mode targets.
    Target,
}

impl TempSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempSlot::Eco => "eco",
            TempSlot::Frost => "frost",
            TempSlot::Comfort => "comfort",
            TempSlot::Current => "current",
            TempSlot::Boost => "boost",
            TempSlot::Target => "target",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "eco" => Some(TempSlot::Eco),
            "frost" => Some(TempSlot::Frost),
            "comfort" => Some(TempSlot::Comfort),
            "current" => Some(TempSlot::Current),
            "boost" => Some(TempSlot::Boost),
            "target" => Some(TempSlot::Target),
            _ => None,
        }
    }

    /// Current and boost are sensor/derived values, target is synthesized.
    pub fn is_writable(&self) -> bool {
        !matches!(self, TempSlot::Current | TempSlot::Target | TempSlot::Boost)
    }
}

impl fmt::Display for TempSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grouping of devices, typically a room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub label: String,
}

/// Lightweight home entry as listed on the user account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomeSummary {
    pub id: String,
    pub label: String,
}

/// Events emitted when a refresh changes the local mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ZoneAdded { home_id: String, zone_id: String, label: String },
    DeviceAdded { home_id: String, device_id: String, label: String },
    HeatModeChanged { home_id: String, device_id: String, mode: HeatMode, slot: Option<TempSlot> },
    TemperatureChanged { home_id: String, device_id: String, slot: TempSlot, temp: Option<Temperature> },
    HeatingChanged { home_id: String, device_id: String, active: bool },
    OnOffChanged { home_id: String, device_id: String, on: bool },
    DecodeFailed { home_id: String, device_id: String, reason: String },
}
