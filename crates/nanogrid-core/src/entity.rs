//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Host-facing projection of readings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ReadingDescriptor};
use crate::reading::ReadingValue;
use crate::store::ReadingStore;

/// What a home-automation host registers for one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingEntity {
    pub unique_id: String,
    pub name: String,
    pub state: ReadingValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ReadingEntity {
    pub fn new(descriptor: &ReadingDescriptor, state: ReadingValue) -> Self {
        Self {
            unique_id: descriptor.unique_id(),
            name: descriptor.name.clone(),
            state,
            unit: descriptor.unit.clone(),
            icon: descriptor.icon.clone(),
        }
    }
}

/// Entities for every catalog reading in catalog order.
pub fn project(catalog: &Catalog, store: &ReadingStore) -> Vec<ReadingEntity> {
    catalog
        .iter()
        .map(|descriptor| {
            let state = store.get(&descriptor.id).unwrap_or_default();
            ReadingEntity::new(descriptor, state)
        })
        .collect()
}
