//! REST API response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::output;
use crate::transform::pipeline::PipelineResult;

/// Response sent after an upload is transformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ready" when every code resolved, "warning" otherwise
    pub status: String,

    /// `{"columns": [...], "rows": [[...]]}`
    pub table: Value,

    /// Output rendered as CSV text
    pub csv: String,

    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub row_count: usize,

    /// Plan document that was executed
    pub plan: Value,

    /// Registry id of the plan (if stored)
    pub plan_id: Option<String>,

    pub csv_info: CsvMetadata,

    /// Status column to status to count
    pub status_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl TransformResponse {
    pub fn from_result(result: PipelineResult) -> Result<Self, String> {
        let csv = output::to_csv_string(&result.table).map_err(|e| e.to_string())?;
        let plan = serde_json::to_value(&result.plan).map_err(|e| e.to_string())?;

        let all_mapped = result
            .status_counts
            .values()
            .all(|counts| counts.keys().all(|status| status == "Mapped"));

        Ok(Self {
            job_id: Uuid::new_v4().to_string(),
            status: if all_mapped { "ready" } else { "warning" }.to_string(),
            table: output::to_json(&result.table),
            csv,
            metadata: ResponseMetadata {
                row_count: result.table.height(),
                plan,
                plan_id: result.template_id,
                csv_info: CsvMetadata {
                    encoding: result.csv_info.encoding,
                    delimiter: result.csv_info.delimiter.to_string(),
                    row_count: result.csv_info.row_count,
                    columns: result.csv_info.headers,
                },
                status_counts: result.status_counts,
            },
        })
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldSpec, Table, TargetSchema};
    use crate::transform::pipeline::CsvInfo;
    use crate::transform::plan::example_long_plan;

    fn result(statuses: &[&str]) -> PipelineResult {
        let table = Table::from_rows(
            vec!["Sku ID".into(), "Sku ID Mapping Status".into()],
            statuses
                .iter()
                .map(|s| vec![json!("F1"), json!(s)])
                .collect(),
        );
        let schema = TargetSchema::new(vec![FieldSpec::new("Sku ID")]);
        let status_counts = crate::transform::pipeline::count_statuses(&table, &schema);
        PipelineResult {
            table,
            plan: example_long_plan(),
            template_id: Some("acme-1".into()),
            csv_info: CsvInfo {
                encoding: "utf-8".into(),
                delimiter: ';',
                headers: vec!["Article".into()],
                row_count: statuses.len(),
            },
            status_counts,
        }
    }

    #[test]
    fn test_response_from_result() {
        let response = TransformResponse::from_result(result(&["Mapped", "Mapped"])).unwrap();
        assert_eq!(response.status, "ready");
        assert_eq!(response.metadata.row_count, 2);
        assert_eq!(response.metadata.plan_id.as_deref(), Some("acme-1"));
        assert_eq!(response.metadata.plan["format_type"], "long");
        assert!(response.csv.starts_with("Sku ID,Sku ID Mapping Status\n"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["metadata"]["csvInfo"]["delimiter"], ";");
    }

    #[test]
    fn test_unresolved_codes_give_warning() {
        let response =
            TransformResponse::from_result(result(&["Mapped", "Missing Mapping"])).unwrap();
        assert_eq!(response.status, "warning");
    }
}
