//! JSON Schema validation for the documents Orderload consumes.
//!
//! Two kinds of documents come from outside the process and are checked
//! before they are trusted:
//!
//! - **Plan documents** produced by the plan provider (or written by hand)
//! - **Target schemas** describing the output columns
//!
//! # Embedded Schemas
//!
//! Schemas are embedded at compile time from the `schemas/` directory:
//! - `plan.json`
//! - `target-schema.json`
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use orderload::validation::validate_plan_document;
//!
//! let plan = json!({"format_type": "long", "mapping_plan": []});
//! assert!(validate_plan_document(&plan).is_ok());
//! ```

use serde_json::Value;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.json");
const TARGET_SCHEMA_SCHEMA: &str = include_str!("../../schemas/target-schema.json");

/// Validate a JSON value against a JSON Schema (draft 7).
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Boolean shorthand for [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

fn embedded(source: &str) -> Result<Value, Vec<String>> {
    serde_json::from_str(source).map_err(|e| vec![format!("Invalid embedded schema: {}", e)])
}

/// The plan document JSON Schema, as shown to the plan provider.
pub fn plan_schema() -> &'static str {
    PLAN_SCHEMA
}

/// Validate a plan document before resolving it.
pub fn validate_plan_document(data: &Value) -> Result<(), Vec<String>> {
    validate(&embedded(PLAN_SCHEMA)?, data)
}

/// Validate a target schema document.
pub fn validate_target_schema(data: &Value) -> Result<(), Vec<String>> {
    validate(&embedded(TARGET_SCHEMA_SCHEMA)?, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_long_plan() {
        let plan = json!({
            "format_type": "long",
            "mapping_plan": [
                {"target_column": "OrderID", "source_column": "Order", "transformation_rule": "direct_map"},
                {"target_column": null, "source_column": "Notes", "transformation_rule": null}
            ]
        });
        assert!(validate_plan_document(&plan).is_ok());
    }

    #[test]
    fn test_valid_action_plan() {
        let plan = json!({
            "action": "unpivot_wide_to_long",
            "parameters": {
                "id_vars": ["Customer"],
                "value_vars": ["SkuA", "SkuB"],
                "var_name": "Sku ID",
                "value_name": "Quantity",
                "key_mappings": [{"target": "Customer ID", "source": "Customer"}]
            }
        });
        assert!(validate_plan_document(&plan).is_ok());
    }

    #[test]
    fn test_unknown_format_still_valid_document() {
        // Unsupported discriminators are reported by the executor, not here.
        let plan = json!({"format_type": "diagonal"});
        assert!(validate_plan_document(&plan).is_ok());
    }

    #[test]
    fn test_plan_without_discriminator() {
        let plan = json!({"mapping_plan": []});
        assert!(validate_plan_document(&plan).is_err());
    }

    #[test]
    fn test_key_mapping_requires_source() {
        let plan = json!({
            "format_type": "wide",
            "mapping_plan": {"key_column_mappings": [{"target": "OrderID"}]}
        });
        let errors = validate_plan_document(&plan).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_target_schema_validation() {
        assert!(validate_target_schema(&json!([{"name": "OrderID"}])).is_ok());
        assert!(validate_target_schema(&json!([])).is_err());
        assert!(validate_target_schema(&json!({"name": "OrderID"})).is_err());
    }

    #[test]
    fn test_embedded_schemas_parse() {
        assert!(embedded(PLAN_SCHEMA).is_ok());
        assert!(embedded(TARGET_SCHEMA_SCHEMA).is_ok());
    }
}
