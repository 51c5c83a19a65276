//! Attribute → vector field name lookup.
//!
//! Shapefile (dBASE) field names are limited to 10 characters, so long
//! attribute names such as `classification` need a shorter field name. The
//! table is injected into the pipeline and the point loader so that both
//! sides agree on the field each attribute lands in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of a dBASE field name.
pub const MAX_FIELD_NAME_LEN: usize = 10;

/// Mapping from attribute identifier to vector field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTable {
    fields: BTreeMap<String, String>,
}

impl FieldTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Add or replace one mapping. Returns `self` for chaining.
    ///
    /// Field names longer than [`MAX_FIELD_NAME_LEN`] are truncated.
    pub fn with(mut self, attribute: impl Into<String>, field: impl Into<String>) -> Self {
        self.insert(attribute, field);
        self
    }

    pub fn insert(&mut self, attribute: impl Into<String>, field: impl Into<String>) {
        let mut field = field.into();
        field.truncate(MAX_FIELD_NAME_LEN);
        self.fields.insert(attribute.into(), field);
    }

    /// Field name for `attribute`, if the table knows it.
    pub fn field(&self, attribute: &str) -> Option<&str> {
        self.fields.get(attribute).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(a, f)| (a.as_str(), f.as_str()))
    }
}

impl Default for FieldTable {
    /// The standard LAS point attributes.
    fn default() -> Self {
        Self::empty()
            .with("elevation", "elevation")
            .with("intensity", "intensity")
            .with("classification", "class")
            .with("return_number", "return_num")
            .with("number_of_returns", "num_return")
            .with("scan_angle", "scan_angle")
            .with("point_source_id", "source_id")
            .with("gps_time", "gps_time")
            .with("red", "red")
            .with("green", "green")
            .with("blue", "blue")
    }
}
