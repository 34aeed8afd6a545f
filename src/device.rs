use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::protocol::{field_bool, field_i64, field_str};
use crate::types::{Event, HeatMode, TempSlot, Temperature};
use crate::{Error, Result};

const FAMILY_RADIATOR: i64 = 0;
const FAMILY_LIGHT: i64 = 1;
const FAMILY_OUTLET: i64 = 12;

const FIELD_ID: &str = "id";
const FIELD_LOCAL_ID: &str = "id_device";
const FIELD_ZONE: &str = "num_zone";
const FIELD_LABEL: &str = "label_interface";
const FIELD_FAMILY: &str = "nv_mode";
const FIELD_MODE: &str = "gv_mode";
const FIELD_HEATING: &str = "heating_up";
const FIELD_BOOST_TIME: &str = "time_boost";
const FIELD_ON_OFF: &str = "on_off";

const MODE_BOOST: i64 = 4;

const SLOT_FIELDS: &[(TempSlot, &str)] = &[
    (TempSlot::Eco, "consigne_eco"),
    (TempSlot::Frost, "consigne_hg"),
    (TempSlot::Comfort, "consigne_confort"),
    (TempSlot::Current, "temperature_air"),
    (TempSlot::Boost, "consigne_boost"),
];

/// Modes accepted by [`Device::mode_query`]. Boost has its own action.
pub const WRITABLE_MODES: &[HeatMode] = &[
    HeatMode::Comfort,
    HeatMode::Eco,
    HeatMode::Frost,
    HeatMode::Program,
    HeatMode::Off,
];

fn slot_field(slot: TempSlot) -> Option<&'static str> {
    SLOT_FIELDS
        .iter()
        .find(|(s, _)| *s == slot)
        .map(|(_, field)| *field)
}

/// Operating-mode code to (heat mode, targeted slot).
///
/// Frost protection (2) is reported by the API as a comfort variant aimed at
/// the frost setpoint, so it decodes to `Comfort` with the `Frost` slot.
pub fn decode_mode(code: i64) -> Option<(HeatMode, Option<TempSlot>)> {
    match code {
        0 => Some((HeatMode::Comfort, Some(TempSlot::Comfort))),
        1 => Some((HeatMode::Off, None)),
        2 => Some((HeatMode::Comfort, Some(TempSlot::Frost))),
        3 => Some((HeatMode::Eco, Some(TempSlot::Eco))),
        4 => Some((HeatMode::Boost, Some(TempSlot::Boost))),
        8 => Some((HeatMode::Program, Some(TempSlot::Comfort))),
        11 => Some((HeatMode::Program, Some(TempSlot::Eco))),
        _ => None,
    }
}

pub fn encode_mode(mode: HeatMode) -> Option<i64> {
    match mode {
        HeatMode::Comfort => Some(0),
        HeatMode::Off => Some(1),
        HeatMode::Frost => Some(2),
        HeatMode::Eco => Some(3),
        HeatMode::Program => Some(11),
        HeatMode::Boost => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Radiator,
    Light,
    Outlet,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Radiator {
    mode_code: i64,
    heat_mode: HeatMode,
    temp_slot: Option<TempSlot>,
    temperatures: BTreeMap<TempSlot, Temperature>,
    active: bool,
    boost_seconds: u64,
}

impl Radiator {
    fn from_json(data: &Value) -> std::result::Result<Self, String> {
        let mode_code = field_i64(data, FIELD_MODE).ok_or_else(|| format!("missing {FIELD_MODE}"))?;
        let (heat_mode, temp_slot) =
            decode_mode(mode_code).ok_or_else(|| format!("unknown operating mode {mode_code}"))?;

        let mut temperatures = BTreeMap::new();
        for (slot, field) in SLOT_FIELDS {
            if data.get(*field).is_none_or(Value::is_null) {
                continue;
            }
            let units = field_i64(data, field).ok_or_else(|| format!("{field} is not an integer"))?;
            temperatures.insert(*slot, Temperature::from_device(units).for_slot(*slot, slot.is_writable()));
        }

        let boost_seconds = match data.get(FIELD_BOOST_TIME) {
            None | Some(Value::Null) => 0,
            Some(_) => field_i64(data, FIELD_BOOST_TIME)
                .ok_or_else(|| format!("{FIELD_BOOST_TIME} is not an integer"))?
                .max(0) as u64,
        };

        let mut radiator = Self {
            mode_code,
            heat_mode,
            temp_slot,
            temperatures,
            active: field_bool(data, FIELD_HEATING).unwrap_or(false),
            boost_seconds,
        };
        radiator.sync_target();
        Ok(radiator)
    }

    fn sync_target(&mut self) {
        let target = self
            .temp_slot
            .and_then(|slot| self.temperatures.get(&slot))
            .map(|t| Temperature::from_device(t.device()).for_slot(TempSlot::Target, false));
        match target {
            Some(t) => self.temperatures.insert(TempSlot::Target, t),
            None => self.temperatures.remove(&TempSlot::Target),
        };
    }

    pub fn mode_code(&self) -> i64 {
        self.mode_code
    }

    pub fn heat_mode(&self) -> HeatMode {
        self.heat_mode
    }

    /// Slot the current mode regulates against; `None` when off.
    pub fn temp_slot(&self) -> Option<TempSlot> {
        self.temp_slot
    }

    pub fn temperature(&self, slot: TempSlot) -> Option<Temperature> {
        self.temperatures.get(&slot).copied()
    }

    pub fn target(&self) -> Option<Temperature> {
        self.temperature(TempSlot::Target)
    }

    pub fn current(&self) -> Option<Temperature> {
        self.temperature(TempSlot::Current)
    }

    pub fn temperatures(&self) -> impl Iterator<Item = &Temperature> {
        self.temperatures.values()
    }

    /// Heating element is on right now.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn boost_time(&self) -> Duration {
        Duration::from_secs(self.boost_seconds)
    }

    pub fn available_modes(&self) -> &'static [HeatMode] {
        WRITABLE_MODES
    }

    fn diff_events(&self, new: &Radiator, home_id: &str, device_id: &str, events: &mut Vec<Event>) {
        if self.heat_mode != new.heat_mode || self.temp_slot != new.temp_slot {
            events.push(Event::HeatModeChanged {
                home_id: home_id.to_string(),
                device_id: device_id.to_string(),
                mode: new.heat_mode,
                slot: new.temp_slot,
            });
        }
        let mut slots: Vec<TempSlot> = self.temperatures.keys().chain(new.temperatures.keys()).copied().collect();
        slots.sort();
        slots.dedup();
        for slot in slots {
            let (old, current) = (self.temperature(slot), new.temperature(slot));
            if old != current {
                events.push(Event::TemperatureChanged {
                    home_id: home_id.to_string(),
                    device_id: device_id.to_string(),
                    slot,
                    temp: current,
                });
            }
        }
        if self.active != new.active {
            events.push(Event::HeatingChanged {
                home_id: home_id.to_string(),
                device_id: device_id.to_string(),
                active: new.active,
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnOff {
    on: bool,
}

impl OnOff {
    fn from_json(data: &Value) -> Self {
        Self {
            on: field_bool(data, FIELD_ON_OFF).unwrap_or(false),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Device family the crate does not model; the raw payload is kept as is.
#[derive(Debug, Clone, PartialEq)]
pub struct Unknown {
    pub family: Option<i64>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKind {
    Radiator(Radiator),
    Light(OnOff),
    Outlet(OnOff),
    Unknown(Unknown),
}

impl DeviceKind {
    fn from_json(data: &Value) -> std::result::Result<Self, String> {
        let family = field_i64(data, FIELD_FAMILY);
        Ok(match family {
            Some(FAMILY_RADIATOR) => DeviceKind::Radiator(Radiator::from_json(data)?),
            Some(FAMILY_LIGHT) => DeviceKind::Light(OnOff::from_json(data)),
            Some(FAMILY_OUTLET) => DeviceKind::Outlet(OnOff::from_json(data)),
            _ => DeviceKind::Unknown(Unknown {
                family,
                raw: data.clone(),
            }),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        match self {
            DeviceKind::Radiator(_) => DeviceType::Radiator,
            DeviceKind::Light(_) => DeviceType::Light,
            DeviceKind::Outlet(_) => DeviceType::Outlet,
            DeviceKind::Unknown(_) => DeviceType::Unknown,
        }
    }
}

/// A device in a home. Refreshes update it in place; `instance_id` is fixed
/// at creation and survives every merge.
#[derive(Debug, Clone)]
pub struct Device {
    instance_id: Uuid,
    id: String,
    local_id: String,
    label: String,
    zone_id: String,
    kind: DeviceKind,
}

struct Header {
    id: String,
    local_id: String,
    label: String,
    zone_id: String,
}

fn decode_header(data: &Value) -> std::result::Result<Header, String> {
    let id = field_str(data, FIELD_ID).ok_or_else(|| format!("missing {FIELD_ID}"))?;
    Ok(Header {
        local_id: field_str(data, FIELD_LOCAL_ID).unwrap_or_else(|| id.clone()),
        label: field_str(data, FIELD_LABEL).unwrap_or_default(),
        zone_id: field_str(data, FIELD_ZONE).unwrap_or_default(),
        id,
    })
}

fn decode_error(data: &Value, reason: String) -> Error {
    let entity = match field_str(data, FIELD_ID) {
        Some(id) => format!("device {id}"),
        None => "device".to_string(),
    };
    Error::Decode { entity, reason }
}

impl Device {
    pub fn from_json(data: &Value) -> Result<Self> {
        let header = decode_header(data).map_err(|r| decode_error(data, r))?;
        let kind = DeviceKind::from_json(data).map_err(|r| decode_error(data, r))?;
        Ok(Self {
            instance_id: Uuid::new_v4(),
            id: header.id,
            local_id: header.local_id,
            label: header.label,
            zone_id: header.zone_id,
            kind,
        })
    }

    /// Apply a fresh payload. Decoding completes before anything is assigned,
    /// so a failed update leaves the device exactly as it was.
    pub fn update(&mut self, data: &Value, home_id: &str, events: &mut Vec<Event>) -> Result<()> {
        let header = decode_header(data).map_err(|r| decode_error(data, r))?;
        let kind = DeviceKind::from_json(data).map_err(|r| decode_error(data, r))?;

        match (&self.kind, &kind) {
            (DeviceKind::Radiator(old), DeviceKind::Radiator(new)) => {
                old.diff_events(new, home_id, &self.id, events);
            }
            (DeviceKind::Light(old), DeviceKind::Light(new))
            | (DeviceKind::Outlet(old), DeviceKind::Outlet(new)) => {
                if old.on != new.on {
                    events.push(Event::OnOffChanged {
                        home_id: home_id.to_string(),
                        device_id: self.id.clone(),
                        on: new.on,
                    });
                }
            }
            _ => {}
        }

        self.local_id = header.local_id;
        self.label = header.label;
        self.zone_id = header.zone_id;
        self.kind = kind;
        Ok(())
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier used in write queries (`id_device`).
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn device_type(&self) -> DeviceType {
        self.kind.device_type()
    }

    pub fn as_radiator(&self) -> Option<&Radiator> {
        match &self.kind {
            DeviceKind::Radiator(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_on_off(&self) -> Option<&OnOff> {
        match &self.kind {
            DeviceKind::Light(o) | DeviceKind::Outlet(o) => Some(o),
            _ => None,
        }
    }

    fn require_radiator(&self) -> Result<&Radiator> {
        self.as_radiator()
            .ok_or_else(|| Error::UnsupportedDevice(format!("{} is not a radiator", self.id)))
    }

    // -- Write queries --

    pub fn temperature_query(&self, slot: TempSlot, temp: Temperature) -> Result<Vec<(&'static str, String)>> {
        self.require_radiator()?;
        if !slot.is_writable() {
            return Err(Error::ReadOnlySlot(slot));
        }
        let field = slot_field(slot).ok_or(Error::ReadOnlySlot(slot))?;
        Ok(vec![
            (FIELD_LOCAL_ID, self.local_id.clone()),
            (field, temp.device().to_string()),
        ])
    }

    pub fn mode_query(&self, mode: HeatMode) -> Result<Vec<(&'static str, String)>> {
        self.require_radiator()?;
        let code = encode_mode(mode).ok_or_else(|| {
            Error::InvalidMode(format!("{mode} cannot be set directly, activate boost instead"))
        })?;
        Ok(vec![
            (FIELD_LOCAL_ID, self.local_id.clone()),
            (FIELD_MODE, code.to_string()),
            (FIELD_FAMILY, code.to_string()),
        ])
    }

    pub fn boost_query(&self, duration: Duration, temp: Option<Temperature>) -> Result<Vec<(&'static str, String)>> {
        self.require_radiator()?;
        let mut query = vec![
            (FIELD_LOCAL_ID, self.local_id.clone()),
            (FIELD_MODE, MODE_BOOST.to_string()),
            (FIELD_FAMILY, MODE_BOOST.to_string()),
            (FIELD_BOOST_TIME, duration.as_secs().to_string()),
        ];
        if let Some(t) = temp {
            query.push(("consigne_boost", t.device().to_string()));
        }
        Ok(query)
    }

    pub fn on_off_query(&self, on: bool) -> Result<Vec<(&'static str, String)>> {
        if self.as_on_off().is_none() {
            return Err(Error::UnsupportedDevice(format!("{} has no on/off state", self.id)));
        }
        Ok(vec![
            (FIELD_LOCAL_ID, self.local_id.clone()),
            (FIELD_ON_OFF, if on { "1" } else { "0" }.to_string()),
        ])
    }

    /// Optimistically store a written setpoint until the next poll confirms it.
    pub fn apply_temperature(&mut self, slot: TempSlot, temp: Temperature) -> Result<()> {
        if !slot.is_writable() {
            return Err(Error::ReadOnlySlot(slot));
        }
        match &mut self.kind {
            DeviceKind::Radiator(r) => {
                r.temperatures
                    .insert(slot, Temperature::from_device(temp.device()).for_slot(slot, true));
                r.sync_target();
                Ok(())
            }
            _ => Err(Error::UnsupportedDevice(format!("{} is not a radiator", self.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn radiator_json(mode: &str) -> Value {
        json!({
            "id": "R1",
            "id_device": "C001-000",
            "num_zone": "1",
            "label_interface": "Living room",
            "nv_mode": "0",
            "gv_mode": mode,
            "heating_up": "1",
            "time_boost": "3600",
            "consigne_eco": "185",
            "consigne_hg": "446",
            "consigne_confort": "680",
            "temperature_air": "210",
            "consigne_boost": "770"
        })
    }

    #[test]
    fn decode_table() {
        assert_eq!(decode_mode(1), Some((HeatMode::Off, None)));
        assert_eq!(decode_mode(11), Some((HeatMode::Program, Some(TempSlot::Eco))));
        assert_eq!(decode_mode(2), Some((HeatMode::Comfort, Some(TempSlot::Frost))));
        assert_eq!(decode_mode(5), None);
    }

    #[test]
    fn eco_radiator_example() {
        let device = Device::from_json(&radiator_json("3")).unwrap();
        let r = device.as_radiator().unwrap();
        assert_eq!(r.heat_mode(), HeatMode::Eco);
        assert_eq!(r.temp_slot(), Some(TempSlot::Eco));
        assert!((r.target().unwrap().fahrenheit() - 18.5).abs() < 1e-9);
        assert!((r.current().unwrap().fahrenheit() - 21.0).abs() < 1e-9);
        assert!(r.is_active());
        assert_eq!(r.boost_time(), Duration::from_secs(3600));
    }

    #[test]
    fn slot_writability_tags() {
        let device = Device::from_json(&radiator_json("0")).unwrap();
        let r = device.as_radiator().unwrap();
        assert!(r.temperature(TempSlot::Eco).unwrap().is_writable());
        assert!(r.temperature(TempSlot::Frost).unwrap().is_writable());
        assert!(r.temperature(TempSlot::Comfort).unwrap().is_writable());
        assert!(!r.temperature(TempSlot::Current).unwrap().is_writable());
        assert!(!r.temperature(TempSlot::Boost).unwrap().is_writable());
        let target = r.target().unwrap();
        assert!(!target.is_writable());
        assert_eq!(target.name(), Some(TempSlot::Target));
        assert_eq!(target.device(), 680);
    }

    #[test]
    fn off_has_no_target() {
        let device = Device::from_json(&radiator_json("1")).unwrap();
        let r = device.as_radiator().unwrap();
        assert_eq!(r.heat_mode(), HeatMode::Off);
        assert_eq!(r.temp_slot(), None);
        assert_eq!(r.target(), None);
    }

    #[test]
    fn unknown_mode_is_decode_error() {
        let err = Device::from_json(&radiator_json("99")).unwrap_err();
        match err {
            Error::Decode { entity, reason } => {
                assert_eq!(entity, "device R1");
                assert!(reason.contains("99"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn failed_update_keeps_previous_state() {
        let mut device = Device::from_json(&radiator_json("3")).unwrap();
        let before = device.as_radiator().unwrap().clone();
        let mut events = Vec::new();
        assert!(device.update(&radiator_json("42"), "H1", &mut events).is_err());
        assert_eq!(device.as_radiator().unwrap(), &before);
        assert!(events.is_empty());
    }

    #[test]
    fn family_codes_select_variant() {
        let light = Device::from_json(&json!({"id": "L1", "nv_mode": "1", "on_off": "1"})).unwrap();
        assert_eq!(light.device_type(), DeviceType::Light);
        assert!(light.as_on_off().unwrap().is_on());

        let outlet = Device::from_json(&json!({"id": "O1", "nv_mode": 12, "on_off": "0"})).unwrap();
        assert_eq!(outlet.device_type(), DeviceType::Outlet);
        assert!(!outlet.as_on_off().unwrap().is_on());

        let other = Device::from_json(&json!({"id": "X1", "nv_mode": "7", "foo": "bar"})).unwrap();
        match other.kind() {
            DeviceKind::Unknown(u) => {
                assert_eq!(u.family, Some(7));
                assert_eq!(u.raw["foo"], "bar");
            }
            kind => panic!("expected unknown, got {kind:?}"),
        }
    }

    #[test]
    fn update_emits_changes_only() {
        let mut device = Device::from_json(&radiator_json("3")).unwrap();
        let id = device.instance_id();
        let mut events = Vec::new();
        device.update(&radiator_json("3"), "H1", &mut events).unwrap();
        assert!(events.is_empty());

        let mut changed = radiator_json("0");
        changed["heating_up"] = json!("0");
        device.update(&changed, "H1", &mut events).unwrap();
        assert_eq!(device.instance_id(), id);
        assert!(events.iter().any(|e| matches!(e, Event::HeatModeChanged { mode: HeatMode::Comfort, .. })));
        assert!(events.iter().any(|e| matches!(e, Event::HeatingChanged { active: false, .. })));
        assert!(events.iter().any(|e| matches!(e, Event::TemperatureChanged { slot: TempSlot::Target, .. })));
    }

    #[test]
    fn temperature_query_uses_backing_field() {
        let device = Device::from_json(&radiator_json("3")).unwrap();
        let query = device.temperature_query(TempSlot::Eco, Temperature::from_celsius(17.0)).unwrap();
        assert_eq!(query, vec![("id_device", "C001-000".to_string()), ("consigne_eco", "626".to_string())]);

        let err = device.temperature_query(TempSlot::Current, Temperature::from_device(1)).unwrap_err();
        assert!(matches!(err, Error::ReadOnlySlot(TempSlot::Current)));
    }

    #[test]
    fn mode_query_codes() {
        let device = Device::from_json(&radiator_json("3")).unwrap();
        let query = device.mode_query(HeatMode::Program).unwrap();
        assert!(query.contains(&("gv_mode", "11".to_string())));
        assert!(query.contains(&("nv_mode", "11".to_string())));
        assert!(matches!(device.mode_query(HeatMode::Boost), Err(Error::InvalidMode(_))));
    }

    #[test]
    fn boost_query_includes_duration() {
        let device = Device::from_json(&radiator_json("3")).unwrap();
        let query = device
            .boost_query(Duration::from_secs(1800), Some(Temperature::from_device(770)))
            .unwrap();
        assert!(query.contains(&("gv_mode", "4".to_string())));
        assert!(query.contains(&("time_boost", "1800".to_string())));
        assert!(query.contains(&("consigne_boost", "770".to_string())));
    }

    #[test]
    fn on_off_query_rejects_radiators() {
        let device = Device::from_json(&radiator_json("3")).unwrap();
        assert!(matches!(device.on_off_query(true), Err(Error::UnsupportedDevice(_))));
    }

    #[test]
    fn optimistic_update_moves_target() {
        let mut device = Device::from_json(&radiator_json("3")).unwrap();
        device.apply_temperature(TempSlot::Eco, Temperature::from_device(200)).unwrap();
        let r = device.as_radiator().unwrap();
        assert_eq!(r.temperature(TempSlot::Eco).unwrap().device(), 200);
        assert_eq!(r.target().unwrap().device(), 200);
        assert!(device.clone().apply_temperature(TempSlot::Target, Temperature::from_device(1)).is_err());
    }
}
