//! Long-format execution: one output row per input row.

use serde_json::Value;

use super::operations::{format_date, is_missing};
use super::plan::{MappingRule, TransformationKind};
use crate::api::logs::log_warning;
use crate::models::{Table, TargetSchema};

/// Targets whose sources identify an order line. A row with none of these
/// sources filled carries no order data.
pub const KEY_TARGET_COLUMNS: &[&str] = &[
    "OrderID",
    "Sku ID",
    "Customer ID",
    "Shipment Number",
    "Material",
];

/// Rows to keep: those with at least one identifier value present.
pub(crate) fn rows_with_any_value(table: &Table, columns: &[String]) -> Vec<bool> {
    let sources: Vec<&[Value]> = columns.iter().filter_map(|c| table.values(c)).collect();
    (0..table.height())
        .map(|row| sources.iter().any(|values| !is_missing(&values[row])))
        .collect()
}

fn key_source_columns(table: &Table, rules: &[MappingRule]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for rule in rules {
        let (Some(target), Some(source)) = (&rule.target_column, &rule.source_column) else {
            continue;
        };
        if KEY_TARGET_COLUMNS.contains(&target.as_str())
            && table.has_column(source)
            && !sources.contains(source)
        {
            sources.push(source.clone());
        }
    }
    sources
}

/// Apply column-mapping rules to `table`.
///
/// The result has exactly the schema's columns, in schema order. Columns no
/// rule filled are null; when no rule filled anything the result has no rows.
/// Problems with a single rule are logged and the rule is skipped.
pub fn apply_long_format(table: &Table, rules: &[MappingRule], schema: &TargetSchema) -> Table {
    let key_sources = key_source_columns(table, rules);
    let mut input = table.clone();
    if !key_sources.is_empty() {
        let keep = rows_with_any_value(&input, &key_sources);
        input.retain_rows(&keep);
    }

    let targets = schema.field_names();
    let mut filled: Vec<Option<Vec<Value>>> = vec![None; targets.len()];

    for rule in rules {
        let (Some(target), Some(kind)) = (&rule.target_column, &rule.transformation_rule) else {
            continue;
        };
        let Some(slot) = targets.iter().position(|t| t == target) else {
            continue;
        };

        let source = rule.source_column.as_deref().unwrap_or_default();
        let Some(values) = input.values(source) else {
            log_warning(format!(
                "Source column '{}' for '{}' not found, leaving it empty",
                source, target
            ));
            continue;
        };

        filled[slot] = match kind {
            TransformationKind::DirectMap => Some(values.to_vec()),
            TransformationKind::DateFormat => Some(values.iter().map(format_date).collect()),
            TransformationKind::Unsupported(name) => {
                log_warning(format!(
                    "Unsupported transformation '{}' for '{}', skipping",
                    name, target
                ));
                continue;
            }
        };
    }

    if filled.iter().all(Option::is_none) {
        return Table::from_rows(targets, Vec::new());
    }

    let mut output = Table::with_height(input.height());
    for (name, values) in targets.into_iter().zip(filled) {
        let values = values.unwrap_or_else(|| vec![Value::Null; input.height()]);
        output.push_column(name, values);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldSpec;
    use serde_json::json;

    fn schema(names: &[&str]) -> TargetSchema {
        TargetSchema::new(names.iter().map(|n| FieldSpec::new(*n)).collect())
    }

    fn orders() -> Table {
        Table::from_rows(
            vec!["Order".into(), "SKU".into(), "Date".into()],
            vec![
                vec![json!("A1"), json!("X1"), json!("2024-03-15")],
                vec![Value::Null, Value::Null, json!("2024-03-16")],
                vec![json!("A2"), json!("X2"), json!("garbage")],
            ],
        )
    }

    #[test]
    fn test_drops_rows_without_identifiers() {
        let rules = vec![
            MappingRule::direct("OrderID", "Order"),
            MappingRule::direct("Sku ID", "SKU"),
        ];
        let out = apply_long_format(&orders(), &rules, &schema(&["OrderID", "Sku ID"]));

        assert_eq!(out.height(), 2);
        assert_eq!(out.values("OrderID").unwrap(), &[json!("A1"), json!("A2")]);
        assert_eq!(out.values("Sku ID").unwrap(), &[json!("X1"), json!("X2")]);
    }

    #[test]
    fn test_schema_order_and_null_fill() {
        let rules = vec![MappingRule::direct("Sku ID", "SKU")];
        let out = apply_long_format(
            &orders(),
            &rules,
            &schema(&["OrderID", "Quantity", "Sku ID"]),
        );

        assert_eq!(out.column_names(), vec!["OrderID", "Quantity", "Sku ID"]);
        assert!(out.values("OrderID").unwrap().iter().all(Value::is_null));
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn test_date_rule() {
        let rules = vec![
            MappingRule::direct("OrderID", "Order"),
            MappingRule::date("OrderDate", "Date"),
        ];
        let out = apply_long_format(&orders(), &rules, &schema(&["OrderID", "OrderDate"]));
        assert_eq!(
            out.values("OrderDate").unwrap(),
            &[json!("15/03/2024"), Value::Null]
        );
    }

    #[test]
    fn test_inert_and_unknown_rules_are_skipped() {
        let rules = vec![
            MappingRule {
                target_column: None,
                source_column: Some("Order".into()),
                transformation_rule: Some(TransformationKind::DirectMap),
            },
            MappingRule {
                target_column: Some("OrderID".into()),
                source_column: Some("Order".into()),
                transformation_rule: None,
            },
            MappingRule::direct("NotInSchema", "Order"),
            MappingRule::new(
                "Sku ID",
                "SKU",
                TransformationKind::Unsupported("uppercase".into()),
            ),
        ];
        let out = apply_long_format(&orders(), &rules, &schema(&["OrderID", "Sku ID"]));
        assert_eq!(out.height(), 0);
        assert_eq!(out.column_names(), vec!["OrderID", "Sku ID"]);
    }

    #[test]
    fn test_missing_source_leaves_target_empty() {
        let rules = vec![
            MappingRule::direct("OrderID", "Order"),
            MappingRule::direct("Sku ID", "Product"),
        ];
        let out = apply_long_format(&orders(), &rules, &schema(&["OrderID", "Sku ID"]));
        assert_eq!(out.height(), 2);
        assert!(out.values("Sku ID").unwrap().iter().all(Value::is_null));
    }

    #[test]
    fn test_later_rule_wins() {
        let rules = vec![
            MappingRule::direct("OrderID", "Order"),
            MappingRule::direct("OrderID", "SKU"),
        ];
        let out = apply_long_format(&orders(), &rules, &schema(&["OrderID"]));
        assert_eq!(out.values("OrderID").unwrap(), &[json!("X1"), json!("X2")]);
    }

    #[test]
    fn test_no_key_sources_keeps_every_row() {
        let rules = vec![MappingRule::date("OrderDate", "Date")];
        let out = apply_long_format(&orders(), &rules, &schema(&["OrderDate"]));
        assert_eq!(out.height(), 3);
    }

    #[test]
    fn test_whitespace_counts_as_missing() {
        let table = Table::from_rows(
            vec!["Order".into()],
            vec![vec![json!("  ")], vec![json!("A1")]],
        );
        let rules = vec![MappingRule::direct("OrderID", "Order")];
        let out = apply_long_format(&table, &rules, &schema(&["OrderID"]));
        assert_eq!(out.values("OrderID").unwrap(), &[json!("A1")]);
    }
}
