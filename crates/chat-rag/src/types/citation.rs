//! Citation records shown next to answers

use serde::{Deserialize, Serialize};

/// Enriched display record resolved from a chunk's locator
///
/// Serializes as a flat JSON object, e.g.
/// `{"Chapter": 2, "Verse": 47, "Translation": "..."}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CitationRecord {
    /// Display fields in store column order
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl CitationRecord {
    /// Build a record from display fields
    pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { fields }
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}
