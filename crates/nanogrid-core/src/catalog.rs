//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Reading descriptors and the built-in Nanogrid Air catalog."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use nanogrid_common::config::ReadingConfig;
use serde::Serialize;

use crate::path::JsonPath;

/// Prefix applied to reading ids to form the host-facing unique id.
pub const UNIQUE_ID_PREFIX: &str = "ctek_nanogrid_air_";

/// Device endpoint path such as `/meter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub const STATUS: &'static str = "/status";
    pub const METER: &'static str = "/meter";
    pub const EVSE: &'static str = "/evse";

    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable definition of one exposed reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingDescriptor {
    pub id: String,
    pub name: String,
    pub endpoint: Endpoint,
    pub path: JsonPath,
    pub unit: Option<String>,
    pub icon: Option<String>,
}

impl ReadingDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: Endpoint::new(endpoint),
            path: JsonPath::new(path),
            unit: None,
            icon: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn unique_id(&self) -> String {
        format!("{UNIQUE_ID_PREFIX}{}", self.id)
    }
}

impl From<&ReadingConfig> for ReadingDescriptor {
    fn from(config: &ReadingConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            endpoint: Endpoint::new(config.endpoint.clone()),
            path: JsonPath::new(config.path.clone()),
            unit: config.unit.clone(),
            icon: config.icon.clone(),
        }
    }
}

/// Errors raised while assembling a catalog.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate reading id '{0}'")]
    DuplicateId(String),
}

// (id, name, endpoint, path, unit, icon)
type Row = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    Option<&'static str>,
    &'static str,
);

const BUILTIN: [Row; 22] = [
    ("device_serial", "Device Serial", Endpoint::STATUS, "deviceInfo.serial", None, "mdi:numeric"),
    ("device_firmware", "Device Firmware", Endpoint::STATUS, "deviceInfo.firmware", None, "mdi:update"),
    ("device_mac", "Device MAC", Endpoint::STATUS, "deviceInfo.mac", None, "mdi:router"),
    ("chargebox_state", "Chargebox State", Endpoint::STATUS, "chargeboxInfo.state", None, "mdi:power"),
    ("wifi_ssid", "WiFi SSID", Endpoint::STATUS, "wifiInfo.ssid", None, "mdi:wifi"),
    ("wifi_rssi", "WiFi Signal Strength", Endpoint::STATUS, "wifiInfo.rssi", Some("dBm"), "mdi:signal"),
    ("active_power_in", "Active Power In", Endpoint::METER, "activePowerIn", Some("W"), "mdi:meter-electric"),
    ("active_power_out", "Active Power Out", Endpoint::METER, "activePowerOut", Some("W"), "mdi:flash-off"),
    ("current_phase_1", "Current Phase 1", Endpoint::METER, "current.0", Some("A"), "mdi:current-ac"),
    ("current_phase_2", "Current Phase 2", Endpoint::METER, "current.1", Some("A"), "mdi:current-ac"),
    ("current_phase_3", "Current Phase 3", Endpoint::METER, "current.2", Some("A"), "mdi:current-ac"),
    ("voltage_phase_1", "Voltage Phase 1", Endpoint::METER, "voltage.0", Some("V"), "mdi:flash"),
    ("voltage_phase_2", "Voltage Phase 2", Endpoint::METER, "voltage.1", Some("V"), "mdi:flash"),
    ("voltage_phase_3", "Voltage Phase 3", Endpoint::METER, "voltage.2", Some("V"), "mdi:flash"),
    ("total_energy_import", "Total Energy Import", Endpoint::METER, "totalEnergyActiveImport", Some("Wh"), "mdi:flash"),
    ("total_energy_export", "Total Energy Export", Endpoint::METER, "totalEnergyActiveExport", Some("Wh"), "mdi:flash-off"),
    ("charger_serial", "Charger Serial", Endpoint::EVSE, "cb_id", None, "mdi:ev-plug-type2"),
    ("charger_connection_status", "Charger Connection Status", Endpoint::EVSE, "connection_status", None, "mdi:ev-plug-type2"),
    ("charger_outlet_1_state", "Charger Outlet 1 State", Endpoint::EVSE, "evse.0.state", None, "mdi:ev-plug-type2"),
    ("charger_outlet_2_state", "Charger Outlet 2 State", Endpoint::EVSE, "evse.1.state", None, "mdi:ev-plug-type2"),
    ("charger_outlet_1_current", "Charger Outlet 1 Current", Endpoint::EVSE, "evse.0.current", Some("A"), "mdi:ev-plug-type2"),
    ("charger_outlet_2_current", "Charger Outlet 2 Current", Endpoint::EVSE, "evse.1.current", Some("A"), "mdi:ev-plug-type2"),
];

/// Ordered, id-unique set of reading descriptors for one device.
#[derive(Debug, Clone)]
pub struct Catalog {
    descriptors: IndexMap<String, Arc<ReadingDescriptor>>,
}

impl Catalog {
    /// The 22 readings exposed by a Nanogrid Air.
    pub fn builtin() -> Self {
        let descriptors = BUILTIN
            .iter()
            .map(|&(id, name, endpoint, path, unit, icon)| {
                let mut descriptor = ReadingDescriptor::new(id, name, endpoint, path).with_icon(icon);
                descriptor.unit = unit.map(str::to_owned);
                (id.to_owned(), Arc::new(descriptor))
            })
            .collect();
        Self { descriptors }
    }

    /// Built-in catalog followed by operator-configured readings.
    pub fn with_extras(extras: &[ReadingConfig]) -> Result<Self, CatalogError> {
        let mut catalog = Self::builtin();
        for extra in extras {
            catalog.insert(ReadingDescriptor::from(extra))?;
        }
        Ok(catalog)
    }

    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ReadingDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            descriptors: IndexMap::new(),
        };
        for descriptor in descriptors {
            catalog.insert(descriptor)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, descriptor: ReadingDescriptor) -> Result<(), CatalogError> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(CatalogError::DuplicateId(descriptor.id));
        }
        self.descriptors
            .insert(descriptor.id.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ReadingDescriptor>> {
        self.descriptors.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ReadingDescriptor>> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Distinct endpoints in first-use order.
    pub fn endpoints(&self) -> IndexSet<Endpoint> {
        self.iter().map(|d| d.endpoint.clone()).collect()
    }
}
