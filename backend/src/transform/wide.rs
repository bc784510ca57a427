//! Wide-format execution: unpivot one-column-per-product tables into order
//! lines.

use serde_json::Value;

use super::long::rows_with_any_value;
use super::operations::{format_date, is_missing, to_quantity};
use super::plan::WidePlan;
use crate::api::logs::log_warning;
use crate::models::{Table, TargetSchema};

/// Carry the last present value down over missing cells.
fn forward_fill(values: &mut [Value]) {
    let mut last: Option<Value> = None;
    for cell in values.iter_mut() {
        if is_missing(cell) {
            if let Some(previous) = &last {
                *cell = previous.clone();
            }
        } else {
            last = Some(cell.clone());
        }
    }
}

fn present_columns(table: &Table, names: &[String]) -> Vec<String> {
    let mut present: Vec<String> = Vec::new();
    for name in names {
        if table.has_column(name) && !present.contains(name) {
            present.push(name.clone());
        }
    }
    present
}

/// Unpivot `table` according to `plan`.
///
/// Melting is value-column-major: every row of the first value column, then
/// every row of the second, and so on. Rows whose quantity is not a positive
/// finite number are dropped and the rest are truncated to integers. Returns
/// an empty table (no columns) when none of the value columns exist.
pub fn apply_wide_format(table: &Table, plan: &WidePlan, schema: &TargetSchema) -> Table {
    let id_columns = present_columns(table, &plan.id_columns);

    let mut input = table.clone();
    if !id_columns.is_empty() {
        let keep = rows_with_any_value(&input, &id_columns);
        input.retain_rows(&keep);
    }
    for column in &id_columns {
        if let Some(values) = input.values_mut(column) {
            forward_fill(values);
        }
    }

    let value_columns = present_columns(&input, &plan.value_columns);
    if value_columns.is_empty() {
        log_warning("No valid product columns found for unpivoting, nothing to output");
        return Table::new();
    }

    // (input row, item name, quantity) in melt order
    let mut melted: Vec<(usize, &str, i64)> = Vec::new();
    for item in &value_columns {
        let Some(values) = input.values(item) else {
            continue;
        };
        for (row, cell) in values.iter().enumerate() {
            if let Some(quantity) = to_quantity(cell) {
                melted.push((row, item.as_str(), quantity));
            }
        }
    }

    let mut unpivoted = Table::with_height(melted.len());
    for mapping in &plan.key_mappings {
        if !id_columns.contains(&mapping.source) {
            continue;
        }
        let Some(source) = input.values(&mapping.source) else {
            continue;
        };
        let is_date = mapping.target.contains("Date");
        let values = melted
            .iter()
            .map(|(row, _, _)| {
                let cell = &source[*row];
                if is_date {
                    format_date(cell)
                } else {
                    cell.clone()
                }
            })
            .collect();
        unpivoted.set_column(&mapping.target, values);
    }

    let items = melted
        .iter()
        .map(|(_, item, _)| Value::String(item.to_string()))
        .collect();
    let quantities = melted
        .iter()
        .map(|(_, _, quantity)| Value::from(*quantity))
        .collect();
    unpivoted.set_column(&plan.var_name, items);
    unpivoted.set_column(&plan.value_name, quantities);

    unpivoted.select(&schema.field_names())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_order_schema, FieldSpec};
    use crate::transform::plan::KeyColumnMapping;
    use serde_json::json;

    fn schema() -> TargetSchema {
        TargetSchema::new(vec![
            FieldSpec::new("Customer ID"),
            FieldSpec::new("Sku ID"),
            FieldSpec::new("Quantity"),
        ])
    }

    fn plan(value_columns: &[&str]) -> WidePlan {
        WidePlan::new(
            vec![KeyColumnMapping::new("Customer ID", "Customer")],
            value_columns.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[test]
    fn test_unpivot_filters_quantities() {
        let table = Table::from_rows(
            vec!["Customer".into(), "SkuA".into(), "SkuB".into()],
            vec![
                vec![json!("C1"), json!(3), json!(0)],
                vec![Value::Null, json!(2), json!(-1)],
            ],
        );
        let out = apply_wide_format(&table, &plan(&["SkuA", "SkuB"]), &schema());

        assert_eq!(out.height(), 1);
        assert_eq!(
            out.row(0).unwrap(),
            vec![&json!("C1"), &json!("SkuA"), &json!(3)]
        );
    }

    #[test]
    fn test_fractions_below_one_are_dropped() {
        let table = Table::from_rows(
            vec!["Customer".into(), "SkuA".into(), "SkuB".into()],
            vec![vec![json!("C1"), json!("0.5"), json!(1.9)]],
        );
        let out = apply_wide_format(&table, &plan(&["SkuA", "SkuB"]), &schema());

        assert_eq!(out.height(), 1);
        assert_eq!(
            out.row(0).unwrap(),
            vec![&json!("C1"), &json!("SkuB"), &json!(1)]
        );
    }

    #[test]
    fn test_forward_fill_and_value_major_order() {
        let table = Table::from_rows(
            vec!["Customer".into(), "Order".into(), "SkuA".into(), "SkuB".into()],
            vec![
                vec![json!("C1"), json!("O1"), json!("1"), json!(4)],
                vec![json!(" "), json!("O2"), json!("2.7"), json!("x")],
                vec![json!("C2"), json!("O3"), json!(3), json!(5.0)],
            ],
        );
        let wide = WidePlan::new(
            vec![
                KeyColumnMapping::new("Customer ID", "Customer"),
                KeyColumnMapping::new("OrderID", "Order"),
            ],
            vec!["SkuA".into(), "Missing".into(), "SkuB".into()],
        );
        let schema = TargetSchema::new(vec![
            FieldSpec::new("OrderID"),
            FieldSpec::new("Customer ID"),
            FieldSpec::new("Sku ID"),
            FieldSpec::new("Quantity"),
        ]);
        let out = apply_wide_format(&table, &wide, &schema);

        assert_eq!(
            out.values("Customer ID").unwrap(),
            &[json!("C1"), json!("C1"), json!("C2"), json!("C1"), json!("C2")]
        );
        assert_eq!(
            out.values("OrderID").unwrap(),
            &[json!("O1"), json!("O2"), json!("O3"), json!("O1"), json!("O3")]
        );
        assert_eq!(
            out.values("Sku ID").unwrap(),
            &[json!("SkuA"), json!("SkuA"), json!("SkuA"), json!("SkuB"), json!("SkuB")]
        );
        assert_eq!(
            out.values("Quantity").unwrap(),
            &[json!(1), json!(2), json!(3), json!(4), json!(5)]
        );
    }

    #[test]
    fn test_no_value_columns_returns_empty_table() {
        let table = Table::from_rows(vec!["Customer".into()], vec![vec![json!("C1")]]);
        let out = apply_wide_format(&table, &plan(&["SkuZ"]), &schema());
        assert_eq!(out, Table::new());
    }

    #[test]
    fn test_date_targets_and_schema_reindex() {
        let table = Table::from_rows(
            vec!["Store".into(), "Delivery".into(), "P1".into()],
            vec![vec![json!("S1"), json!("2024-03-15"), json!(6)]],
        );
        let wide = WidePlan {
            id_columns: vec!["Store".into(), "Delivery".into()],
            key_mappings: vec![
                KeyColumnMapping::new("Customer ID", "Store"),
                KeyColumnMapping::new("OrderDate", "Delivery"),
            ],
            value_columns: vec!["P1".into()],
            var_name: "Sku ID".into(),
            value_name: "Quantity".into(),
        };
        let out = apply_wide_format(&table, &wide, &default_order_schema());

        assert_eq!(
            out.column_names(),
            vec!["OrderID", "OrderDate", "Customer ID", "Sku ID", "Quantity"]
        );
        assert_eq!(
            out.row(0).unwrap(),
            vec![&Value::Null, &json!("15/03/2024"), &json!("S1"), &json!("P1"), &json!(6)]
        );
    }

    #[test]
    fn test_custom_var_and_value_names() {
        let table = Table::from_rows(
            vec!["Customer".into(), "M1".into()],
            vec![vec![json!("C1"), json!(2)]],
        );
        let mut wide = plan(&["M1"]);
        wide.var_name = "Material".into();
        wide.value_name = "Units".into();
        let schema = TargetSchema::new(vec![
            FieldSpec::new("Material"),
            FieldSpec::new("Units"),
        ]);

        let out = apply_wide_format(&table, &wide, &schema);
        assert_eq!(out.row(0).unwrap(), vec![&json!("M1"), &json!(2)]);
    }
}
