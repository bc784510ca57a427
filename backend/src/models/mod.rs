//! Domain models: the [`Table`] every stage passes around and the
//! [`TargetSchema`] the output must conform to.
//!
//! A target schema is a JSON array of field specifications:
//!
//! ```json
//! [
//!   {"name": "OrderID", "description": "The unique identifier for the customer's order."},
//!   {"name": "Source", "description": "Origin of the record.", "const": "client-upload"}
//! ]
//! ```

pub mod table;

pub use table::{Column, Table};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::error::SchemaError;
use crate::validation::validate_target_schema;

/// One output column of the target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output column name
    pub name: String,

    /// Human-readable meaning, shown to the plan provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Literal forced into every output row
    #[serde(
        default,
        rename = "const",
        deserialize_with = "deserialize_literal",
        skip_serializing_if = "Option::is_none"
    )]
    pub constant: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            constant: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_constant(mut self, value: impl Into<String>) -> Self {
        self.constant = Some(value.into());
        self
    }
}

/// Accept any JSON scalar as a constant and keep its text form.
fn deserialize_literal<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Ordered list of output fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSchema {
    fields: Vec<FieldSpec>,
}

impl TargetSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Parse and validate a schema document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Validate a parsed document and build the schema.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        validate_target_schema(value).map_err(SchemaError::Invalid)?;
        let schema: TargetSchema = serde_json::from_value(value.clone())?;

        let mut seen = HashSet::new();
        for name in schema.field_names() {
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateField(name));
            }
        }

        Ok(schema)
    }

    /// Load a schema from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Output column names in declared order. Fields with an empty name are
    /// not part of the output.
    pub fn field_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.name.is_empty())
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        !name.is_empty() && self.fields.iter().any(|f| f.name == name)
    }

    /// `(field, literal)` for every field carrying a constant.
    pub fn constants(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|f| !f.name.is_empty())
            .filter_map(|f| f.constant.as_deref().map(|c| (f.name.as_str(), c)))
    }
}

/// The canonical order schema used when no schema file is supplied.
pub fn default_order_schema() -> TargetSchema {
    TargetSchema::new(vec![
        FieldSpec::new("OrderID")
            .with_description("The unique identifier for the customer's order."),
        FieldSpec::new("OrderDate")
            .with_description("The date the order was placed, format DD/MM/YYYY."),
        FieldSpec::new("Customer ID")
            .with_description("The code of the customer or delivery location."),
        FieldSpec::new("Sku ID").with_description("The unique code for the product or material."),
        FieldSpec::new("Quantity").with_description("The number of units for the given Sku ID."),
    ])
}
