//! Prompt generation for header discovery and plan selection.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::models::{Table, TargetSchema};
use crate::transform::plan::{example_long_plan, example_wide_plan};
use crate::validation::plan_schema;

/// Distinct values listed per column before switching to a sample.
const MAX_LISTED_VALUES: usize = 30;

/// System prompt shared by both requests.
pub fn system_prompt() -> &'static str {
    "You are a data analyst specialised in client order exports. You only ever answer with a single valid JSON object, no explanations and no markdown."
}

/// Ask where the real data table starts.
pub fn header_prompt(preview: &str) -> String {
    format!(
        r#"Below are the first rows of a spreadsheet export, one row per line, prefixed with the zero-based row index. Empty cells are shown as NaN.

The export may begin with titles, addresses, notes or blank lines before the actual data table. Find the row that holds the column headers of the main data table (order numbers, products, customers, quantities, dates...).

```text
{preview}
```

Answer with exactly this JSON object:

{{"header_row_index": <row index as an integer>}}"#
    )
}

/// Ask for a transformation plan for `table` towards `schema`.
pub fn plan_prompt(table: &Table, schema: &TargetSchema, sample_rows: usize) -> String {
    let target: serde_json::Map<String, Value> = schema
        .fields()
        .iter()
        .filter(|f| !f.name.is_empty())
        .map(|f| {
            (
                f.name.clone(),
                Value::String(f.description.clone().unwrap_or_default()),
            )
        })
        .collect();
    let target_json = serde_json::to_string_pretty(&target).unwrap_or_default();

    let sample = sample_records(table, sample_rows);
    let sample_json = serde_json::to_string_pretty(&sample).unwrap_or_default();
    let columns = serde_json::to_string(&table.column_names()).unwrap_or_default();
    let profile = column_profile(table);

    let long_example = example_long_plan().to_json().unwrap_or_default();
    let wide_example = example_wide_plan().to_json().unwrap_or_default();
    let plan_schema = plan_schema();

    format!(
        r#"## Target Schema (column name: meaning)

```json
{target_json}
```

## Client Columns

{columns}

## Sample Rows ({shown} of {total})

```json
{sample_json}
```

## Values per Column

{profile}

## Task

Decide how this client table maps onto the target schema.

- If every row is already one order line, answer with a **long** plan: one mapping rule per client column. Use `"direct_map"` to copy a column and `"convert_to_DD/MM/YYYY"` for dates. Set `target_column` to null for client columns that match nothing.
- If quantities are spread over one column per product (the product codes are the column names), answer with a **wide** plan: list the identifier columns and the product quantity columns.

Only use target names from the schema and client column names exactly as listed.

Long example:

```json
{long_example}
```

Wide example:

```json
{wide_example}
```

Your answer must validate against this JSON Schema:

```json
{plan_schema}
```"#,
        shown = sample.len(),
        total = table.height(),
    )
}

/// The first rows as `{column: value}` objects.
fn sample_records(table: &Table, n: usize) -> Vec<Value> {
    let names = table.column_names();
    table
        .head(n)
        .rows()
        .map(|row| {
            let record: serde_json::Map<String, Value> = names
                .iter()
                .zip(row)
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect();
            Value::Object(record)
        })
        .collect()
}

/// One line per column with its distinct values, or a sample of them when
/// there are many.
fn column_profile(table: &Table) -> String {
    let mut result = String::new();
    for column in table.columns() {
        let values: BTreeSet<String> = column
            .values
            .iter()
            .filter_map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        let listed: Vec<&str> = values.iter().map(String::as_str).collect();

        let display = if listed.len() <= MAX_LISTED_VALUES {
            listed.join(", ")
        } else {
            format!(
                "{}, ... ({} distinct values)",
                listed[..15].join(", "),
                listed.len()
            )
        };
        result.push_str(&format!("- **{}**: {}\n", column.name, display));
    }
    result
}

/// Wrap a user prompt as a single-message conversation.
pub fn build_messages(content: String) -> Vec<Value> {
    vec![json!({
        "role": "user",
        "content": content
    })]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_order_schema;

    fn table() -> Table {
        Table::from_rows(
            vec!["PO".into(), "Article".into()],
            vec![
                vec![json!("A1"), json!("X1")],
                vec![json!("A2"), Value::Null],
            ],
        )
    }

    #[test]
    fn test_header_prompt_includes_preview() {
        let prompt = header_prompt("  0  Report\n  1  PO | Article");
        assert!(prompt.contains("PO | Article"));
        assert!(prompt.contains("header_row_index"));
    }

    #[test]
    fn test_plan_prompt_includes_schema_and_sample() {
        let prompt = plan_prompt(&table(), &default_order_schema(), 1);
        assert!(prompt.contains("\"OrderID\""));
        assert!(prompt.contains("[\"PO\",\"Article\"]"));
        assert!(prompt.contains("Sample Rows (1 of 2)"));
        assert!(prompt.contains("unpivot_wide_to_long"));
        assert!(prompt.contains("\"$schema\""));
    }

    #[test]
    fn test_column_profile() {
        let profile = column_profile(&table());
        assert!(profile.contains("- **PO**: A1, A2"));
        assert!(profile.contains("- **Article**: X1\n"));
    }
}
