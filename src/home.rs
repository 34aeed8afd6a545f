use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::device::Device;
use crate::protocol::{field_i64, field_str};
use crate::types::{Event, HomeSummary, Zone};
use crate::{Error, Result};

/// Entries of a keyed map (`{"0": {...}, "1": {...}}`) or a plain array.
fn entries<'a>(data: &'a Value, key: &str) -> Result<Vec<&'a Value>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map.values().collect()),
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(_) => Err(Error::Malformed(format!("{key} is neither a map nor a list"))),
    }
}

/// A fully hydrated site: its zones and devices.
#[derive(Debug, Clone, Default)]
pub struct Home {
    pub id: String,
    pub label: String,
    zones: BTreeMap<String, Zone>,
    devices: BTreeMap<String, Device>,
}

impl Home {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn zones(&self) -> &BTreeMap<String, Zone> {
        &self.zones
    }

    pub fn devices(&self) -> &BTreeMap<String, Device> {
        &self.devices
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn device_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.get_mut(device_id)
    }

    pub fn zone_of(&self, device: &Device) -> Option<&Zone> {
        self.zones.get(device.zone_id())
    }

    /// Union-merge a `smarthome/read` payload.
    ///
    /// Known zones and devices are updated in place, new ones are created,
    /// and nothing absent from `data` is removed. A device that fails to
    /// decode keeps its previous state and is reported as `DecodeFailed`.
    pub fn apply_snapshot(&mut self, data: &Value) -> Result<Vec<Event>> {
        let zone_entries = entries(data, "zones")?;
        let device_entries = entries(data, "devices")?;
        let mut events = Vec::new();

        if let Some(id) = field_str(data, "smarthome_id") {
            self.id = id;
        }
        if let Some(label) = field_str(data, "label") {
            self.label = label;
        }

        for zone_data in zone_entries {
            let Some(zone_id) = field_str(zone_data, "num_zone") else {
                warn!(home_id = %self.id, "zone without num_zone, skipping");
                continue;
            };
            let label = field_str(zone_data, "zone_label").unwrap_or_default();
            match self.zones.get_mut(&zone_id) {
                Some(zone) => zone.label = label,
                None => {
                    events.push(Event::ZoneAdded {
                        home_id: self.id.clone(),
                        zone_id: zone_id.clone(),
                        label: label.clone(),
                    });
                    self.zones.insert(zone_id.clone(), Zone { id: zone_id, label });
                }
            }
        }

        for device_data in device_entries {
            if let Err(e) = self.update_or_create_device(device_data, &mut events) {
                warn!(
                    home_id = %self.id,
                    family = ?family_code(device_data),
                    error = %e,
                    "device skipped in merge"
                );
                events.push(Event::DecodeFailed {
                    home_id: self.id.clone(),
                    device_id: field_str(device_data, "id").unwrap_or_default(),
                    reason: e.to_string(),
                });
            }
        }

        debug!(
            home_id = %self.id,
            zones = self.zones.len(),
            devices = self.devices.len(),
            changes = events.len(),
            "merged home snapshot"
        );
        Ok(events)
    }

    fn update_or_create_device(&mut self, data: &Value, events: &mut Vec<Event>) -> Result<()> {
        let device_id = field_str(data, "id").ok_or_else(|| Error::Decode {
            entity: "device".to_string(),
            reason: "missing id".to_string(),
        })?;

        match self.devices.get_mut(&device_id) {
            Some(device) => device.update(data, &self.id, events),
            None => {
                let device = Device::from_json(data)?;
                events.push(Event::DeviceAdded {
                    home_id: self.id.clone(),
                    device_id: device_id.clone(),
                    label: device.label().to_string(),
                });
                self.devices.insert(device_id, device);
                Ok(())
            }
        }
    }
}

/// Account-level view: who is logged in and which homes they can see.
#[derive(Debug, Clone, Default)]
pub struct User {
    pub email: String,
    pub user_id: Option<String>,
    pub homes: BTreeMap<String, HomeSummary>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    /// Merge a `user/read` payload; home summaries are never removed.
    pub fn apply(&mut self, data: &Value) -> Result<()> {
        if let Some(user_id) = field_str(data, "user_id") {
            self.user_id = Some(user_id);
        }
        for home_data in entries(data, "smarthomes")? {
            let Some(home_id) = field_str(home_data, "smarthome_id") else {
                warn!(email = %self.email, "home summary without smarthome_id, skipping");
                continue;
            };
            let label = field_str(home_data, "label").unwrap_or_default();
            self.homes
                .entry(home_id.clone())
                .and_modify(|h| h.label = label.clone())
                .or_insert(HomeSummary { id: home_id, label });
        }
        Ok(())
    }
}

/// Mode family code of a raw device payload, for diagnostics.
pub fn family_code(device_data: &Value) -> Option<i64> {
    field_i64(device_data, "nv_mode")
}
