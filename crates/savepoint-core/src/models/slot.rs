//! Save slot catalog

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Policy for one named save slot.
///
/// Catalog entries are created at engine initialization. Adding a slot at
/// runtime is allowed, but a changed definition never re-validates records
/// that were created under the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDefinition {
    /// Unique slot name
    pub name: String,
    /// Ceiling for the encoded payload, checked after compression/encryption
    pub max_size_bytes: usize,
    /// Whether the game writes this slot automatically
    pub auto_save: bool,
    /// How many versions of a lineage to retain
    pub versions_to_keep: usize,
    /// Whether creates in this slot join the sync queue
    pub sync_with_cloud: bool,
    /// Whether payloads in this slot are encrypted
    pub encryption_enabled: bool,
}

/// Catalog of slot definitions keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotRegistry {
    slots: HashMap<String, SlotDefinition>,
}

impl SlotRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the standard slot set.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(SlotDefinition {
            name: "quicksave".to_string(),
            max_size_bytes: 1024 * 1024,
            auto_save: true,
            versions_to_keep: 3,
            sync_with_cloud: true,
            encryption_enabled: false,
        });
        registry.insert(SlotDefinition {
            name: "autosave".to_string(),
            max_size_bytes: 2 * 1024 * 1024,
            auto_save: true,
            versions_to_keep: 5,
            sync_with_cloud: true,
            encryption_enabled: false,
        });
        registry.insert(SlotDefinition {
            name: "checkpoint".to_string(),
            max_size_bytes: 4 * 1024 * 1024,
            auto_save: false,
            versions_to_keep: 10,
            sync_with_cloud: true,
            encryption_enabled: true,
        });
        registry.insert(SlotDefinition {
            name: "manual".to_string(),
            max_size_bytes: 8 * 1024 * 1024,
            auto_save: false,
            versions_to_keep: 20,
            sync_with_cloud: true,
            encryption_enabled: true,
        });
        registry.insert(SlotDefinition {
            name: "settings".to_string(),
            max_size_bytes: 64 * 1024,
            auto_save: true,
            versions_to_keep: 1,
            sync_with_cloud: true,
            encryption_enabled: false,
        });
        registry
    }

    /// Register a slot definition, replacing any previous one with the same name.
    pub fn insert(&mut self, definition: SlotDefinition) {
        self.slots.insert(definition.name.clone(), definition);
    }

    /// Look up a slot definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SlotDefinition> {
        self.slots.get(name)
    }

    /// Slot names in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    /// All definitions, sorted by name for stable output.
    #[must_use]
    pub fn definitions(&self) -> Vec<&SlotDefinition> {
        let mut definitions: Vec<&SlotDefinition> = self.slots.values().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_contain_standard_slots() {
        let registry = SlotRegistry::with_defaults();
        for name in ["quicksave", "autosave", "checkpoint", "manual", "settings"] {
            assert!(registry.get(name).is_some(), "missing slot {name}");
        }
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut registry = SlotRegistry::with_defaults();
        let mut quicksave = registry.get("quicksave").unwrap().clone();
        quicksave.versions_to_keep = 7;
        registry.insert(quicksave);

        assert_eq!(registry.get("quicksave").unwrap().versions_to_keep, 7);
    }

    #[test]
    fn test_definitions_sorted_by_name() {
        let registry = SlotRegistry::with_defaults();
        let names: Vec<&str> = registry
            .definitions()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
