//! Code mapping: resolve client SKU and location codes to canonical codes.
//!
//! Every resolution yields a [`MappingStatus`] so that unresolved or
//! ambiguous codes stay visible in the output instead of being dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::operations::cell_text;
use crate::api::logs::log_warning;

/// Suffix of the sibling column carrying the per-row status.
pub const STATUS_SUFFIX: &str = " Mapping Status";

/// Name of the status column for a mapped code column.
pub fn status_column_name(column: &str) -> String {
    format!("{}{}", column, STATUS_SUFFIX)
}

/// A code lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeLookup {
    /// Raw code to exactly one canonical code
    OneToOne(HashMap<String, String>),
    /// Raw code to candidate canonical codes, in source order
    OneToMany(HashMap<String, Vec<String>>),
}

impl CodeLookup {
    pub fn is_empty(&self) -> bool {
        match self {
            CodeLookup::OneToOne(map) => map.is_empty(),
            CodeLookup::OneToMany(map) => map.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CodeLookup::OneToOne(map) => map.len(),
            CodeLookup::OneToMany(map) => map.len(),
        }
    }

    /// Build a one-to-many lookup from `(raw, canonical)` pairs. Repeated
    /// candidates for a raw code are collapsed, first occurrence wins.
    pub fn one_to_many<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (raw, canonical) in pairs {
            let candidates = map.entry(raw.into()).or_default();
            let canonical = canonical.into();
            if !candidates.contains(&canonical) {
                candidates.push(canonical);
            }
        }
        CodeLookup::OneToMany(map)
    }
}

/// Outcome of resolving one raw code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingStatus {
    Mapped,
    MissingMapping,
    MissingRawData,
    Ambiguous(Vec<String>),
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingStatus::Mapped => write!(f, "Mapped"),
            MappingStatus::MissingMapping => write!(f, "Missing Mapping"),
            MappingStatus::MissingRawData => write!(f, "Missing Raw Data"),
            MappingStatus::Ambiguous(candidates) => {
                write!(f, "Ambiguous({})", candidates.join(", "))
            }
        }
    }
}

/// Resolve a single raw code.
///
/// Unresolved and ambiguous codes keep their raw value; an ambiguous
/// candidate list is reported, never picked from.
pub fn resolve(raw: &Value, lookup: &CodeLookup) -> (Value, MappingStatus) {
    let Some(key) = cell_text(raw) else {
        return (raw.clone(), MappingStatus::MissingRawData);
    };

    match lookup {
        CodeLookup::OneToOne(map) => match map.get(&key) {
            Some(canonical) => (Value::String(canonical.clone()), MappingStatus::Mapped),
            None => (raw.clone(), MappingStatus::MissingMapping),
        },
        CodeLookup::OneToMany(map) => match map.get(&key).map(Vec::as_slice) {
            None | Some([]) => (raw.clone(), MappingStatus::MissingMapping),
            Some([only]) => (Value::String(only.clone()), MappingStatus::Mapped),
            Some(candidates) => {
                log_warning(format!(
                    "Ambiguous mapping for code '{}': {}",
                    key,
                    candidates.join(", ")
                ));
                (raw.clone(), MappingStatus::Ambiguous(candidates.to_vec()))
            }
        },
    }
}

/// Resolve every cell of a column, row by row.
///
/// Returns the resolved values and their status texts, aligned with the input.
pub fn map_column(values: &[Value], lookup: &CodeLookup) -> (Vec<Value>, Vec<Value>) {
    values
        .iter()
        .map(|raw| {
            let (resolved, status) = resolve(raw, lookup);
            (resolved, Value::String(status.to_string()))
        })
        .unzip()
}

/// Which lookup a code column is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Sku,
    Location,
}

/// A column whose values are resolved through a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeColumn {
    pub column: String,
    pub lookup: LookupKind,
}

impl CodeColumn {
    pub fn new(column: impl Into<String>, lookup: LookupKind) -> Self {
        Self {
            column: column.into(),
            lookup,
        }
    }
}

/// `Sku ID` against the SKU table, then `Customer ID` against locations.
pub fn default_code_columns() -> Vec<CodeColumn> {
    vec![
        CodeColumn::new("Sku ID", LookupKind::Sku),
        CodeColumn::new("Customer ID", LookupKind::Location),
    ]
}

/// Source of code lookups, resolved before the engine runs.
pub trait CodeLookupProvider {
    /// Client SKU code to canonical SKU, one-to-one.
    fn sku_mapping(&self) -> CodeLookup;

    /// Client location code to candidate canonical locations, one-to-many.
    fn location_mapping(&self) -> CodeLookup;

    fn lookup(&self, kind: LookupKind) -> CodeLookup {
        match kind {
            LookupKind::Sku => self.sku_mapping(),
            LookupKind::Location => self.location_mapping(),
        }
    }
}
