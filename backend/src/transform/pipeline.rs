//! High-level pipeline API: client export in, canonical order table out.
//!
//! Combines every stage: parsing, header discovery, table extraction, plan
//! selection, lookup loading and plan execution.
//!
//! # Example
//!
//! ```rust,ignore
//! use orderload::transform::pipeline::{transform_file, TransformOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let result = transform_file(
//!         Path::new("weekly-orders.csv"),
//!         TransformOptions::default(),
//!     ).await?;
//!
//!     println!("Produced {} order lines", result.table.height());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::executor::PlanExecutor;
use super::mapping::STATUS_SUFFIX;
use super::plan::{Plan, PlanDocument};
use crate::ai::AiClient;
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::cache::PlanRegistry;
use crate::error::PipelineError;
use crate::models::{default_order_schema, Table, TargetSchema};
use crate::parser::{extract_main_table, parse_bytes_auto, parse_file_auto, RawSheet};
use crate::store::{load_lookups, LookupSnapshot};

/// Narrower tables are not taken for an orders table.
pub const MIN_TABLE_COLUMNS: usize = 3;

/// Options for the transformation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Target schema file, the built-in order schema otherwise
    pub schema_path: Option<PathBuf>,

    /// Inline target schema, takes precedence over `schema_path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TargetSchema>,

    /// Zero-based header row, skips AI header discovery
    pub header_row: Option<usize>,

    /// Use a specific plan file instead of registry/AI
    pub plan_path: Option<PathBuf>,

    /// Inline plan document, takes precedence over `plan_path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanDocument>,

    /// Lookup snapshot file, skips the database
    pub lookups_path: Option<PathBuf>,

    /// Don't use stored plans
    pub no_cache: bool,

    /// Don't save AI plans to the registry
    pub no_save: bool,

    /// Number of rows to send to AI for plan selection
    pub preview_rows: usize,

    /// Registry location, `.orderload/plans` otherwise
    pub registry_dir: Option<PathBuf>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            schema_path: None,
            schema: None,
            header_row: None,
            plan_path: None,
            plan: None,
            lookups_path: None,
            no_cache: false,
            no_save: false,
            preview_rows: 20,
            registry_dir: None,
        }
    }
}

impl TransformOptions {
    fn registry(&self) -> PlanRegistry {
        match &self.registry_dir {
            Some(dir) => PlanRegistry::with_dir(dir),
            None => PlanRegistry::new(),
        }
    }
}

/// Result of a complete pipeline run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Output table: schema columns then status columns
    pub table: Table,

    /// Plan document that produced the table
    pub plan: PlanDocument,

    /// Registry id of the plan, if stored
    pub template_id: Option<String>,

    /// Raw file metadata
    pub csv_info: CsvInfo,

    /// Status column name to status text to row count
    pub status_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

/// Raw file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    /// Headers of the extracted table
    pub headers: Vec<String>,
    /// Data rows in the extracted table
    pub row_count: usize,
}

/// Transform a client export file.
///
/// Runs every stage:
/// 1. Load the target schema
/// 2. Parse the file with encoding and delimiter detection
/// 3. Locate the header row (option or AI)
/// 4. Extract the main table
/// 5. Fetch code lookups
/// 6. Obtain a plan (file, then stored plans, then AI) and execute it
pub async fn transform_file(
    path: &Path,
    options: TransformOptions,
) -> Result<PipelineResult, PipelineError> {
    log_info(format!("Reading {}...", path.display()));
    let sheet = parse_file_auto(path)?;
    let name = path.file_stem().and_then(|s| s.to_str());
    transform_sheet(sheet, options, name).await
}

/// Transform raw file bytes.
///
/// Same as [`transform_file`] for uploads that never touch the disk.
pub async fn transform_bytes(
    bytes: &[u8],
    options: TransformOptions,
) -> Result<PipelineResult, PipelineError> {
    let sheet = parse_bytes_auto(bytes)?;
    transform_sheet(sheet, options, None).await
}

/// Locate and cut out the main table of a sheet.
pub async fn locate_table(
    sheet: &RawSheet,
    header_row: Option<usize>,
) -> Result<(usize, Table), PipelineError> {
    let header_row = match header_row {
        Some(index) => index,
        None => AiClient::from_env()?
            .find_header_row(sheet)
            .await?
            .ok_or_else(|| PipelineError::NoTable("no header row was identified".into()))?,
    };
    log_success(format!("Header row: {}", header_row));

    let table = extract_main_table(sheet, header_row).ok_or_else(|| {
        PipelineError::NoTable(format!(
            "header row {} is past the end of the sheet ({} rows)",
            header_row,
            sheet.len()
        ))
    })?;

    if table.width() < MIN_TABLE_COLUMNS {
        return Err(PipelineError::NoTable(format!(
            "extracted table has only {} column(s)",
            table.width()
        )));
    }

    Ok((header_row, table))
}

async fn transform_sheet(
    sheet: RawSheet,
    options: TransformOptions,
    source_name: Option<&str>,
) -> Result<PipelineResult, PipelineError> {
    let schema = match (&options.schema, &options.schema_path) {
        (Some(schema), _) => schema.clone(),
        (None, Some(path)) => TargetSchema::from_file(path)?,
        (None, None) => default_order_schema(),
    };

    log_success(format!("Detected encoding: {}", sheet.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(sheet.delimiter)));
    log_success(format!("Read {} raw rows", sheet.len()));

    let (_, table) = locate_table(&sheet, options.header_row).await?;
    let headers = table.headers();

    log_info(format!("Table has {} columns:", headers.len()));
    for (i, col) in headers.iter().enumerate() {
        log_info(format!("[{:2}] {}", i + 1, col));
    }

    let csv_info = CsvInfo {
        encoding: sheet.encoding.clone(),
        delimiter: sheet.delimiter,
        headers: headers.clone(),
        row_count: table.height(),
    };

    let lookups = load_lookups(options.lookups_path.as_deref()).await?;
    let (plan, template_id, output) =
        plan_and_execute(&table, &schema, &lookups, &options, source_name).await?;

    let status_counts = count_statuses(&output, &schema);
    for (column, counts) in &status_counts {
        let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{}: {}", s, n)).collect();
        log_info(format!("{}: {}", column, summary.join(", ")));
    }
    log_success(format!("Produced {} rows", output.height()));

    Ok(PipelineResult {
        table: output,
        plan,
        template_id,
        csv_info,
        status_counts,
    })
}

/// Obtain a plan and run it.
///
/// An explicit plan file is used as is. Otherwise stored plans compatible
/// with the table are tried best first, and the AI is asked when none of them
/// produces rows.
async fn plan_and_execute(
    table: &Table,
    schema: &TargetSchema,
    lookups: &LookupSnapshot,
    options: &TransformOptions,
    source_name: Option<&str>,
) -> Result<(PlanDocument, Option<String>, Table), PipelineError> {
    let executor = PlanExecutor::new(lookups);

    let provided = match (&options.plan, &options.plan_path) {
        (Some(document), _) => Some(document.clone()),
        (None, Some(path)) => {
            log_info(format!("Using provided plan file: {}", path.display()));
            Some(PlanDocument::from_file(path)?)
        }
        (None, None) => None,
    };

    if let Some(document) = provided {
        let plan = document.resolve()?;
        let output = run(&executor, table, &plan, schema)?;
        return Ok((document, None, output));
    }

    let headers = table.headers();

    if !options.no_cache {
        log_info("Looking for compatible stored plans...");
        let mut registry = options.registry();
        let candidates: Vec<(String, String, PlanDocument, f64)> = registry
            .find_compatible(&headers)
            .into_iter()
            .map(|(p, score)| (p.id.clone(), p.name.clone(), p.plan.clone(), score))
            .collect();

        if candidates.is_empty() {
            log_warning("No compatible plans found");
        }

        let total = candidates.len();
        for (i, (id, name, document, score)) in candidates.into_iter().enumerate() {
            log_info(format!(
                "Trying plan {}/{}: {} (score: {:.0}%)",
                i + 1,
                total,
                name,
                score * 100.0
            ));

            let output = match document.resolve() {
                Ok(plan) => executor.execute(table, &plan, schema),
                Err(e) => {
                    log_warning(format!("Stored plan \"{}\" no longer resolves: {}", name, e));
                    None
                }
            };

            registry.update_stats(&id, output.is_some())?;
            if let Some(output) = output {
                log_success(format!("Plan \"{}\" worked", name));
                return Ok((document, Some(id), output));
            }
            log_warning(format!("Plan \"{}\" produced no rows", name));
        }

        if total > 0 {
            log_warning(format!("All {} stored plans failed", total));
        }
    }

    log_info("Asking the AI for a new plan...");
    let client = AiClient::from_env()?;
    let document = client.select_plan(table, schema, options.preview_rows).await?;
    let plan = document.resolve()?;
    let output = run(&executor, table, &plan, schema)?;

    let template_id = if options.no_save {
        None
    } else {
        let mut registry = options.registry();
        let id = registry.save(document.clone(), source_name.unwrap_or("auto-generated"))?;
        registry.update_stats(&id, true)?;
        log_success(format!("Saved plan as: {}", id));
        Some(id)
    };

    Ok((document, template_id, output))
}

fn run(
    executor: &PlanExecutor<'_, LookupSnapshot>,
    table: &Table,
    plan: &Plan,
    schema: &TargetSchema,
) -> Result<Table, PipelineError> {
    let missing = plan.missing_columns(&table.headers());
    if !missing.is_empty() {
        log_warning(format!("Plan reads absent columns: {}", missing.join(", ")));
    }

    executor.execute(table, plan, schema).ok_or_else(|| {
        log_error("No data to output");
        PipelineError::NothingToOutput
    })
}

/// Tally the values of every status column added by code mapping.
/// Schema fields are never status columns, whatever their name.
pub fn count_statuses(
    table: &Table,
    schema: &TargetSchema,
) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for column in table.columns() {
        if !column.name.ends_with(STATUS_SUFFIX) || schema.contains(&column.name) {
            continue;
        }
        let mut tally: BTreeMap<String, usize> = BTreeMap::new();
        for value in &column.values {
            let status = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            *tally.entry(status).or_default() += 1;
        }
        counts.insert(column.name.clone(), tally);
    }
    counts
}

/// Format delimiter for display
pub fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldSpec;
    use crate::transform::plan::example_long_plan;
    use serde_json::json;
    use tempfile::tempdir;

    const EXPORT: &str = "ACME weekly orders;;;;;\n\
                          ;;;;;\n\
                          PO Number;Order Date;Store Code;Article;Qty;Remarks\n\
                          A1;2024-03-15;L1;X1;3;\n\
                          A2;2024-03-16;L2;X2;0;late\n\
                          ;;;;;\n";

    #[test]
    fn test_default_options() {
        let opts = TransformOptions::default();
        assert_eq!(opts.preview_rows, 20);
        assert!(opts.header_row.is_none());
        assert!(!opts.no_cache);
        assert!(!opts.no_save);
    }

    #[tokio::test]
    async fn test_transform_with_plan_and_lookups() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("acme.csv");
        std::fs::write(&input, EXPORT).unwrap();

        let plan_path = dir.path().join("plan.json");
        std::fs::write(&plan_path, example_long_plan().to_json().unwrap()).unwrap();

        let lookups_path = dir.path().join("lookups.json");
        std::fs::write(
            &lookups_path,
            json!({
                "sku": {"X1": "F100"},
                "locations": {"L1": ["FD-1"], "L2": ["FD-2", "FD-3"]}
            })
            .to_string(),
        )
        .unwrap();

        let options = TransformOptions {
            header_row: Some(2),
            plan_path: Some(plan_path),
            lookups_path: Some(lookups_path),
            no_cache: true,
            no_save: true,
            registry_dir: Some(dir.path().join("plans")),
            ..TransformOptions::default()
        };

        let result = transform_file(&input, options).await.unwrap();
        assert_eq!(result.csv_info.delimiter, ';');
        assert_eq!(result.csv_info.row_count, 2);
        assert!(result.template_id.is_none());

        let table = result.table;
        assert_eq!(table.height(), 2);
        assert_eq!(table.values("OrderID").unwrap(), &[json!("A1"), json!("A2")]);
        assert_eq!(
            table.values("OrderDate").unwrap(),
            &[json!("15/03/2024"), json!("16/03/2024")]
        );
        assert_eq!(table.values("Sku ID").unwrap(), &[json!("F100"), json!("X2")]);
        assert_eq!(table.values("Customer ID").unwrap(), &[json!("FD-1"), json!("L2")]);

        let sku_counts = &result.status_counts["Sku ID Mapping Status"];
        assert_eq!(sku_counts["Mapped"], 1);
        assert_eq!(sku_counts["Missing Mapping"], 1);
        let location_counts = &result.status_counts["Customer ID Mapping Status"];
        assert_eq!(location_counts["Ambiguous(FD-2, FD-3)"], 1);
    }

    #[tokio::test]
    async fn test_stored_plan_is_reused() {
        let dir = tempdir().unwrap();
        let registry_dir = dir.path().join("plans");
        let id = PlanRegistry::with_dir(&registry_dir)
            .save(example_long_plan(), "acme")
            .unwrap();

        let options = TransformOptions {
            header_row: Some(2),
            lookups_path: Some({
                let path = dir.path().join("empty.json");
                std::fs::write(&path, "{}").unwrap();
                path
            }),
            no_save: true,
            registry_dir: Some(registry_dir.clone()),
            ..TransformOptions::default()
        };

        let result = transform_bytes(EXPORT.as_bytes(), options).await.unwrap();
        assert_eq!(result.template_id.as_deref(), Some(id.as_str()));
        assert!(result.status_counts.is_empty());

        let registry = PlanRegistry::with_dir(&registry_dir);
        assert_eq!(registry.get(&id).unwrap().use_count, 1);
    }

    #[tokio::test]
    async fn test_narrow_table_is_rejected() {
        let options = TransformOptions {
            header_row: Some(0),
            ..TransformOptions::default()
        };
        let result = transform_bytes(b"PO;Qty\nA1;3\n", options).await;
        assert!(matches!(result, Err(PipelineError::NoTable(_))));
    }

    #[test]
    fn test_count_statuses_ignores_other_columns() {
        let table = Table::from_rows(
            vec!["Sku ID".into(), "Sku ID Mapping Status".into()],
            vec![
                vec![json!("F1"), json!("Mapped")],
                vec![json!("F2"), json!("Mapped")],
                vec![json!("X"), json!("Missing Mapping")],
            ],
        );
        let schema = TargetSchema::new(vec![FieldSpec::new("Sku ID")]);
        let counts = count_statuses(&table, &schema);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["Sku ID Mapping Status"]["Mapped"], 2);
    }

    #[test]
    fn test_count_statuses_skips_schema_fields() {
        let table = Table::from_rows(
            vec!["Sku ID".into(), "Sku ID Mapping Status".into()],
            vec![vec![json!("F1"), json!("checked")]],
        );
        let schema = TargetSchema::new(vec![
            FieldSpec::new("Sku ID"),
            FieldSpec::new("Sku ID Mapping Status"),
        ]);
        assert!(count_statuses(&table, &schema).is_empty());
    }
}
