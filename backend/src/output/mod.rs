//! Output sink: render the final table as CSV or JSON.

use serde_json::{json, Value};
use std::path::Path;

use crate::error::OutputError;
use crate::models::Table;

/// Text form of a cell in CSV output. Null is an empty field.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Write `table` as CSV, header row first.
pub fn write_csv<W: std::io::Write>(table: &Table, writer: W) -> Result<(), OutputError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(table.column_names())?;
    for row in table.rows() {
        csv_writer.write_record(row.into_iter().map(render_cell))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write `table` as CSV to `path`, creating parent directories.
pub fn write_csv_file(table: &Table, path: impl AsRef<Path>) -> Result<(), OutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    write_csv(table, file)
}

/// Render `table` as CSV text.
pub fn to_csv_string(table: &Table) -> Result<String, OutputError> {
    let mut buffer = Vec::new();
    write_csv(table, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

/// `{"columns": [...], "rows": [[...], ...]}`, order preserved.
pub fn to_json(table: &Table) -> Value {
    let rows: Vec<Value> = table
        .rows()
        .map(|row| Value::Array(row.into_iter().cloned().collect()))
        .collect();
    json!({
        "columns": table.column_names(),
        "rows": rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table() -> Table {
        Table::from_rows(
            vec!["OrderID".into(), "Quantity".into(), "Note".into()],
            vec![
                vec![json!("A1"), json!(3), Value::Null],
                vec![json!("A,2"), json!(4.0), json!("x")],
            ],
        )
    }

    #[test]
    fn test_csv_rendering() {
        let csv = to_csv_string(&table()).unwrap();
        assert_eq!(csv, "OrderID,Quantity,Note\nA1,3,\n\"A,2\",4,x\n");
    }

    #[test]
    fn test_write_csv_file_creates_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/orders.csv");
        write_csv_file(&table(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("OrderID,Quantity,Note\n"));
    }

    #[test]
    fn test_json_rendering() {
        let value = to_json(&table());
        assert_eq!(value["columns"], json!(["OrderID", "Quantity", "Note"]));
        assert_eq!(value["rows"][0], json!(["A1", 3, null]));
    }
}
