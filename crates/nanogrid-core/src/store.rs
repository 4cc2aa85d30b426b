//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Current reading values keyed by descriptor id."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::catalog::Catalog;
use crate::reading::ReadingValue;

/// Latest value per reading id. Values carry no history.
#[derive(Debug, Default)]
pub struct ReadingStore {
    values: RwLock<IndexMap<String, ReadingValue>>,
}

impl ReadingStore {
    /// Store with one unknown entry per catalog descriptor.
    pub fn for_catalog(catalog: &Catalog) -> Self {
        let values = catalog
            .iter()
            .map(|descriptor| (descriptor.id.clone(), ReadingValue::Unknown))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set(&self, id: &str, value: ReadingValue) {
        let mut values = self.values.write();
        match values.get_mut(id) {
            Some(slot) => *slot = value,
            None => {
                values.insert(id.to_owned(), value);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<ReadingValue> {
        self.values.read().get(id).cloned()
    }

    pub fn snapshot(&self) -> IndexMap<String, ReadingValue> {
        self.values.read().clone()
    }

    pub fn known_count(&self) -> usize {
        self.values.read().values().filter(|v| v.is_known()).count()
    }
}
