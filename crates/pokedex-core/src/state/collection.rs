use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::utils::canonical_name;

use super::AutoSaveSettings;

/// The save file. Field names match what earlier releases wrote, and every
/// field defaults so older or newer files still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokedexDocument {
    #[serde(default)]
    pub pokedex: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_save: Option<AutoSaveSettings>,
}

/// Two stored keys name the same Pokémon but hold different records.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{canonical} is stored twice, as '{first}' and '{second}', with different data")]
pub struct KeyCollision {
    pub canonical: String,
    pub first: String,
    pub second: String,
}

/// Caught Pokémon, keyed by canonical name, each with its full API record.
///
/// Every key goes through `canonical_name`, so "Mr. Mime" and "mr-mime" are
/// the same entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    entries: BTreeMap<String, serde_json::Value>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored entries, canonicalizing keys written by hand or by
    /// older versions.
    ///
    /// Keys that collapse to the same name are merged only when their records
    /// are identical; otherwise nothing is picked and the collision is returned.
    pub fn from_entries(
        entries: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, KeyCollision> {
        let mut collection = Self::new();
        let mut stored_as: BTreeMap<String, String> = BTreeMap::new();

        for (key, record) in entries {
            let canonical = canonical_name(&key);
            if canonical != key {
                warn!(stored = %key, canonical = %canonical, "Normalized Pokédex key");
            }
            match collection.entries.entry(canonical.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    stored_as.insert(canonical, key);
                }
                Entry::Occupied(slot) => {
                    let first = stored_as.get(&canonical).cloned().unwrap_or_default();
                    if *slot.get() != record {
                        return Err(KeyCollision {
                            canonical,
                            first,
                            second: key,
                        });
                    }
                    warn!(kept = %first, dropped = %key, "Merged duplicate Pokédex entry");
                }
            }
        }
        Ok(collection)
    }

    /// Add or replace a Pokémon. Returns the record it replaced, if any.
    pub fn insert(&mut self, name: &str, record: serde_json::Value) -> Option<serde_json::Value> {
        self.entries.insert(canonical_name(name), record)
    }

    /// Remove a Pokémon, returning its canonical name and record.
    pub fn remove(&mut self, name: &str) -> Option<(String, serde_json::Value)> {
        self.entries.remove_entry(&canonical_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.entries.get(&canonical_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Canonical names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_are_canonical() {
        let mut collection = Collection::new();
        collection.insert("Mr. Mime", json!({"name": "mr-mime"}));

        assert!(collection.contains("mr-mime"));
        assert!(collection.contains("MR MIME"));
        assert_eq!(collection.names().collect::<Vec<_>>(), vec!["mr-mime"]);
    }

    #[test]
    fn test_insert_replaces_and_remove_returns_key() {
        let mut collection = Collection::new();
        assert!(collection.insert("pikachu", json!(1)).is_none());
        assert_eq!(collection.insert("Pikachu", json!(2)), Some(json!(1)));
        assert_eq!(collection.len(), 1);

        let (key, record) = collection.remove("PIKACHU").unwrap();
        assert_eq!(key, "pikachu");
        assert_eq!(record, json!(2));
        assert!(collection.is_empty());
        assert!(collection.remove("pikachu").is_none());
    }

    #[test]
    fn test_from_entries_normalizes_legacy_keys() {
        let mut stored = BTreeMap::new();
        stored.insert("Bulbasaur".to_string(), json!({"name": "bulbasaur"}));
        stored.insert("ivysaur".to_string(), json!({"name": "ivysaur"}));

        let collection = Collection::from_entries(stored).unwrap();

        assert_eq!(
            collection.names().collect::<Vec<_>>(),
            vec!["bulbasaur", "ivysaur"]
        );
    }

    #[test]
    fn test_from_entries_rejects_conflicting_duplicates() {
        let mut stored = BTreeMap::new();
        stored.insert("Mr. Mime".to_string(), json!({"name": "A"}));
        stored.insert("mr-mime".to_string(), json!({"name": "B"}));

        let err = Collection::from_entries(stored).unwrap_err();

        assert_eq!(err.canonical, "mr-mime");
        assert_eq!(err.first, "Mr. Mime");
        assert_eq!(err.second, "mr-mime");
    }

    #[test]
    fn test_from_entries_merges_identical_duplicates() {
        let mut stored = BTreeMap::new();
        stored.insert("Pikachu".to_string(), json!({"name": "pikachu"}));
        stored.insert("pikachu".to_string(), json!({"name": "pikachu"}));

        let collection = Collection::from_entries(stored).unwrap();

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get("pikachu"), Some(&json!({"name": "pikachu"})));
    }

    #[test]
    fn test_document_reads_legacy_format() {
        let legacy = r#"{
            "pokedex": {"pikachu": {"name": "pikachu", "height": 4}},
            "lastSaved": "2025-03-01T12:30:00.123456789-05:00"
        }"#;

        let document: PokedexDocument = serde_json::from_str(legacy).unwrap();

        assert_eq!(document.pokedex["pikachu"]["height"], 4);
        assert!(document.last_saved.is_some());
        assert!(document.auto_save.is_none());
    }

    #[test]
    fn test_document_ignores_unknown_fields() {
        let document: PokedexDocument =
            serde_json::from_str(r#"{"pokedex": {}, "badges": 8}"#).unwrap();
        assert!(document.pokedex.is_empty());
    }
}
