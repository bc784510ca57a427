//! Transformation plans.
//!
//! A [`PlanDocument`] is the JSON a plan provider returns (and what the plan
//! registry stores). [`PlanDocument::resolve`] turns it into a typed [`Plan`]
//! the executor can run.
//!
//! Two document shapes are accepted:
//!
//! ```json
//! {"format_type": "long", "mapping_plan": [{"target_column": "OrderID", "source_column": "Order", "transformation_rule": "direct_map"}]}
//! {"action": "unpivot_wide_to_long", "parameters": {"id_vars": ["Customer"], "value_vars": ["SkuA"], "var_name": "Sku ID", "value_name": "Quantity", "key_mappings": []}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{PlanError, PlanResult};
use crate::validation::validate_plan_document;

/// Default item column of an unpivot.
pub const DEFAULT_VAR_NAME: &str = "Sku ID";

/// Default quantity column of an unpivot.
pub const DEFAULT_VALUE_NAME: &str = "Quantity";

const FORMAT_LONG: &str = "long";
const FORMAT_WIDE: &str = "wide";
const ACTION_DIRECT_MAPPING: &str = "apply_direct_mapping";
const ACTION_UNPIVOT: &str = "unpivot_wide_to_long";

// =============================================================================
// Rules
// =============================================================================

/// How a long-format rule fills its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransformationKind {
    /// Copy the source column verbatim (`"direct_map"`)
    DirectMap,
    /// Parse dates and render them `DD/MM/YYYY` (`"convert_to_DD/MM/YYYY"`)
    DateFormat,
    /// Any other rule name
    Unsupported(String),
}

impl From<String> for TransformationKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "direct_map" => TransformationKind::DirectMap,
            "convert_to_DD/MM/YYYY" => TransformationKind::DateFormat,
            _ => TransformationKind::Unsupported(name),
        }
    }
}

impl From<TransformationKind> for String {
    fn from(kind: TransformationKind) -> Self {
        match kind {
            TransformationKind::DirectMap => "direct_map".to_string(),
            TransformationKind::DateFormat => "convert_to_DD/MM/YYYY".to_string(),
            TransformationKind::Unsupported(name) => name,
        }
    }
}

/// One long-format column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(default)]
    pub target_column: Option<String>,
    #[serde(default)]
    pub source_column: Option<String>,
    #[serde(default)]
    pub transformation_rule: Option<TransformationKind>,
}

impl MappingRule {
    pub fn new(target: &str, source: &str, kind: TransformationKind) -> Self {
        Self {
            target_column: Some(target.to_string()),
            source_column: Some(source.to_string()),
            transformation_rule: Some(kind),
        }
    }

    pub fn direct(target: &str, source: &str) -> Self {
        Self::new(target, source, TransformationKind::DirectMap)
    }

    pub fn date(target: &str, source: &str) -> Self {
        Self::new(target, source, TransformationKind::DateFormat)
    }
}

/// A schema identifier column and the raw column it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumnMapping {
    pub target: String,
    pub source: String,
}

impl KeyColumnMapping {
    pub fn new(target: &str, source: &str) -> Self {
        Self {
            target: target.to_string(),
            source: source.to_string(),
        }
    }
}

/// Parameters of a wide-to-long unpivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidePlan {
    /// Raw identifier columns kept through the unpivot
    pub id_columns: Vec<String>,
    /// Identifier columns copied into the output
    pub key_mappings: Vec<KeyColumnMapping>,
    /// Raw columns holding one quantity per item
    pub value_columns: Vec<String>,
    /// Output column receiving the value-column name
    pub var_name: String,
    /// Output column receiving the quantity
    pub value_name: String,
}

impl WidePlan {
    /// An unpivot whose identifiers are exactly the key-mapping sources.
    pub fn new(key_mappings: Vec<KeyColumnMapping>, value_columns: Vec<String>) -> Self {
        Self {
            id_columns: key_mappings.iter().map(|m| m.source.clone()).collect(),
            key_mappings,
            value_columns,
            var_name: DEFAULT_VAR_NAME.to_string(),
            value_name: DEFAULT_VALUE_NAME.to_string(),
        }
    }
}

/// An executable plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Long(Vec<MappingRule>),
    Wide(WidePlan),
    /// Unknown discriminator; the executor reports it and produces nothing
    Unsupported(String),
}

impl Plan {
    pub fn format_name(&self) -> &str {
        match self {
            Plan::Long(_) => FORMAT_LONG,
            Plan::Wide(_) => FORMAT_WIDE,
            Plan::Unsupported(name) => name,
        }
    }

    /// Every raw column the plan reads, deduplicated, in first-use order.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |column: &str| {
            if !column.is_empty() && !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        };

        match self {
            Plan::Long(rules) => {
                for rule in rules {
                    if let Some(source) = rule.source_column.as_deref() {
                        push(source);
                    }
                }
            }
            Plan::Wide(wide) => {
                wide.id_columns.iter().for_each(|c| push(c));
                wide.key_mappings.iter().for_each(|m| push(&m.source));
                wide.value_columns.iter().for_each(|c| push(c));
            }
            Plan::Unsupported(_) => {}
        }
        columns
    }

    /// Source columns absent from `headers`.
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        self.source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect()
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Raw plan document, as produced by the plan provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_plan: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// `mapping_plan` of a `format_type: wide` document.
#[derive(Debug, Deserialize)]
struct WideMappingPlan {
    #[serde(default)]
    key_column_mappings: Vec<KeyColumnMapping>,
    #[serde(default)]
    product_quantity_columns: Vec<String>,
}

/// `parameters` of an `apply_direct_mapping` action.
#[derive(Debug, Deserialize)]
struct DirectMappingParameters {
    mapping: Vec<MappingRule>,
}

/// `parameters` of an `unpivot_wide_to_long` action.
#[derive(Debug, Deserialize)]
struct UnpivotParameters {
    #[serde(default)]
    id_vars: Option<Vec<String>>,
    #[serde(default)]
    value_vars: Vec<String>,
    #[serde(default)]
    var_name: Option<String>,
    #[serde(default)]
    value_name: Option<String>,
    #[serde(default)]
    key_mappings: Vec<KeyColumnMapping>,
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, value: Option<&Value>) -> PlanResult<T> {
    let value = value.ok_or_else(|| PlanError::Malformed {
        kind: kind.to_string(),
        message: "parameters are missing".to_string(),
    })?;
    serde_json::from_value(value.clone()).map_err(|e| PlanError::Malformed {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

impl PlanDocument {
    /// Parse and validate a plan document.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Validate a parsed document against the plan schema and decode it.
    pub fn from_value(value: &Value) -> PlanResult<Self> {
        validate_plan_document(value).map_err(PlanError::Invalid)?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Load a plan document from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::error::PipelineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json(&content)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The discriminator, `format_type` taking precedence over `action`.
    pub fn discriminator(&self) -> Option<&str> {
        self.format_type.as_deref().or(self.action.as_deref())
    }

    /// Turn the document into an executable plan.
    ///
    /// An unknown discriminator resolves to [`Plan::Unsupported`]; a known one
    /// whose parameters have the wrong shape is an error.
    pub fn resolve(&self) -> PlanResult<Plan> {
        if let Some(format) = self.format_type.as_deref() {
            return match format {
                FORMAT_LONG => Ok(Plan::Long(decode(format, self.mapping_plan.as_ref())?)),
                FORMAT_WIDE => {
                    let wide: WideMappingPlan = decode(format, self.mapping_plan.as_ref())?;
                    Ok(Plan::Wide(WidePlan::new(
                        wide.key_column_mappings,
                        wide.product_quantity_columns,
                    )))
                }
                other => Ok(Plan::Unsupported(other.to_string())),
            };
        }

        match self.action.as_deref() {
            Some(ACTION_DIRECT_MAPPING) => {
                let params: DirectMappingParameters =
                    decode(ACTION_DIRECT_MAPPING, self.parameters.as_ref())?;
                Ok(Plan::Long(params.mapping))
            }
            Some(ACTION_UNPIVOT) => {
                let params: UnpivotParameters = decode(ACTION_UNPIVOT, self.parameters.as_ref())?;
                let id_columns = params
                    .id_vars
                    .unwrap_or_else(|| params.key_mappings.iter().map(|m| m.source.clone()).collect());
                Ok(Plan::Wide(WidePlan {
                    id_columns,
                    key_mappings: params.key_mappings,
                    value_columns: params.value_vars,
                    var_name: params.var_name.unwrap_or_else(|| DEFAULT_VAR_NAME.to_string()),
                    value_name: params
                        .value_name
                        .unwrap_or_else(|| DEFAULT_VALUE_NAME.to_string()),
                }))
            }
            Some(other) => Ok(Plan::Unsupported(other.to_string())),
            None => Err(PlanError::MissingDiscriminator),
        }
    }
}

/// Example long-format plan for documentation and prompts.
pub fn example_long_plan() -> PlanDocument {
    let rules = vec![
        MappingRule::direct("OrderID", "PO Number"),
        MappingRule::date("OrderDate", "Order Date"),
        MappingRule::direct("Customer ID", "Store Code"),
        MappingRule::direct("Sku ID", "Article"),
        MappingRule::direct("Quantity", "Qty"),
        MappingRule {
            target_column: None,
            source_column: Some("Remarks".to_string()),
            transformation_rule: None,
        },
    ];
    PlanDocument {
        format_type: Some(FORMAT_LONG.to_string()),
        mapping_plan: serde_json::to_value(rules).ok(),
        ..Default::default()
    }
}

/// Example wide-format plan for documentation and prompts.
pub fn example_wide_plan() -> PlanDocument {
    PlanDocument {
        action: Some(ACTION_UNPIVOT.to_string()),
        parameters: Some(serde_json::json!({
            "id_vars": ["Store Code", "Delivery Date"],
            "value_vars": ["SKU-1001", "SKU-1002", "SKU-1003"],
            "var_name": DEFAULT_VAR_NAME,
            "value_name": DEFAULT_VALUE_NAME,
            "key_mappings": [
                {"target": "Customer ID", "source": "Store Code"},
                {"target": "OrderDate", "source": "Delivery Date"}
            ]
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transformation_kind_from_name() {
        let rule: MappingRule = serde_json::from_value(json!({
            "target_column": "OrderDate",
            "source_column": "Date",
            "transformation_rule": "convert_to_DD/MM/YYYY"
        }))
        .unwrap();
        assert_eq!(rule.transformation_rule, Some(TransformationKind::DateFormat));

        let rule: MappingRule =
            serde_json::from_value(json!({"target_column": "A", "transformation_rule": "uppercase"}))
                .unwrap();
        assert_eq!(
            rule.transformation_rule,
            Some(TransformationKind::Unsupported("uppercase".to_string()))
        );
        assert_eq!(rule.source_column, None);
    }

    #[test]
    fn test_resolve_long() {
        let doc = PlanDocument::from_value(&json!({
            "format_type": "long",
            "mapping_plan": [
                {"target_column": "OrderID", "source_column": "Order", "transformation_rule": "direct_map"}
            ]
        }))
        .unwrap();
        assert_eq!(
            doc.resolve().unwrap(),
            Plan::Long(vec![MappingRule::direct("OrderID", "Order")])
        );
    }

    #[test]
    fn test_resolve_wide_uses_defaults() {
        let doc = PlanDocument::from_value(&json!({
            "format_type": "wide",
            "mapping_plan": {
                "key_column_mappings": [{"target": "Customer ID", "source": "Customer"}],
                "product_quantity_columns": ["SkuA", "SkuB"]
            }
        }))
        .unwrap();

        let Plan::Wide(wide) = doc.resolve().unwrap() else {
            panic!("expected a wide plan");
        };
        assert_eq!(wide.id_columns, vec!["Customer"]);
        assert_eq!(wide.value_columns, vec!["SkuA", "SkuB"]);
        assert_eq!(wide.var_name, "Sku ID");
        assert_eq!(wide.value_name, "Quantity");
    }

    #[test]
    fn test_resolve_unpivot_action() {
        let Plan::Wide(wide) = example_wide_plan().resolve().unwrap() else {
            panic!("expected a wide plan");
        };
        assert_eq!(wide.id_columns, vec!["Store Code", "Delivery Date"]);
        assert_eq!(wide.key_mappings.len(), 2);
    }

    #[test]
    fn test_unpivot_id_vars_default_to_key_sources() {
        let doc = PlanDocument {
            action: Some("unpivot_wide_to_long".into()),
            parameters: Some(json!({
                "value_vars": ["A"],
                "key_mappings": [{"target": "OrderID", "source": "PO"}]
            })),
            ..Default::default()
        };
        let Plan::Wide(wide) = doc.resolve().unwrap() else {
            panic!("expected a wide plan");
        };
        assert_eq!(wide.id_columns, vec!["PO"]);
    }

    #[test]
    fn test_resolve_direct_mapping_action() {
        let doc = PlanDocument {
            action: Some("apply_direct_mapping".into()),
            parameters: Some(json!({"mapping": [
                {"target_column": "Sku ID", "source_column": "Article", "transformation_rule": "direct_map"}
            ]})),
            ..Default::default()
        };
        assert_eq!(doc.resolve().unwrap().format_name(), "long");
    }

    #[test]
    fn test_unknown_discriminator_is_unsupported() {
        let doc = PlanDocument {
            format_type: Some("diagonal".into()),
            ..Default::default()
        };
        assert_eq!(doc.resolve().unwrap(), Plan::Unsupported("diagonal".into()));
    }

    #[test]
    fn test_malformed_parameters() {
        let doc = PlanDocument {
            format_type: Some("wide".into()),
            mapping_plan: Some(json!("not an object")),
            ..Default::default()
        };
        assert!(matches!(doc.resolve(), Err(PlanError::Malformed { .. })));

        let doc = PlanDocument {
            format_type: Some("long".into()),
            ..Default::default()
        };
        assert!(matches!(doc.resolve(), Err(PlanError::Malformed { .. })));

        assert!(matches!(
            PlanDocument::default().resolve(),
            Err(PlanError::MissingDiscriminator)
        ));
    }

    #[test]
    fn test_source_and_missing_columns() {
        let plan = example_long_plan().resolve().unwrap();
        assert_eq!(
            plan.source_columns(),
            vec!["PO Number", "Order Date", "Store Code", "Article", "Qty", "Remarks"]
        );

        let headers = vec!["PO Number".to_string(), "Article".to_string()];
        assert_eq!(
            plan.missing_columns(&headers),
            vec!["Order Date", "Store Code", "Qty", "Remarks"]
        );
    }

    #[test]
    fn test_examples_pass_validation() {
        for doc in [example_long_plan(), example_wide_plan()] {
            let value = serde_json::to_value(&doc).unwrap();
            assert!(PlanDocument::from_value(&value).is_ok());
        }
    }
}
