//! Error types for the Orderload pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - Raw file parsing errors
//! - [`PlanError`] - Malformed plan documents
//! - [`SchemaError`] - Target schema loading errors
//! - [`AiError`] - AI client errors
//! - [`RegistryError`] - Plan registry errors
//! - [`OutputError`] - Output sink errors
//! - [`StoreError`] - Code lookup store errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Data-shape problems inside the execution engine are not errors: the engine
//! logs them and returns `None`. Only the glue around it raises.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while reading a raw client export.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("File is empty")]
    EmptyFile,
}

// =============================================================================
// Plan Errors
// =============================================================================

/// Errors turning a plan document into an executable plan.
///
/// Any of these is terminal for the file being processed.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Neither `format_type` nor `action` is present.
    #[error("Plan declares neither 'format_type' nor 'action'")]
    MissingDiscriminator,

    /// The discriminator is known but its parameters have the wrong shape.
    #[error("Malformed '{kind}' plan: {message}")]
    Malformed { kind: String, message: String },

    /// The document failed JSON Schema validation.
    #[error("Plan failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// JSON serialization/deserialization error.
    #[error("Plan JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Target Schema Errors
// =============================================================================

/// Errors loading a target schema definition.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Failed to read the schema file.
    #[error("Failed to read schema: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid JSON.
    #[error("Schema JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The document does not describe a target schema.
    #[error("Invalid target schema: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Two fields share a name.
    #[error("Duplicate field name in target schema: {0}")]
    DuplicateField(String),
}

// =============================================================================
// AI Client Errors
// =============================================================================

/// Errors from the AI client.
#[derive(Debug, Error)]
pub enum AiError {
    /// Missing API key. This is a configuration error and always fatal.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Non-success answer from the API.
    #[error("API error: {0}")]
    ApiError(String),

    /// The response could not be parsed.
    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::RequestFailed(_) | AiError::ApiError(_))
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the plan registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Plan not found.
    #[error("Plan not found: {0}")]
    NotFound(String),

    /// Invalid plan data.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing the final table.
#[derive(Debug, Error)]
pub enum OutputError {
    /// IO error.
    #[error("Output IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV writer error.
    #[error("CSV write error: {0}")]
    CsvError(#[from] csv::Error),
}

// =============================================================================
// Lookup Store Errors
// =============================================================================

/// Errors from the code lookup store.
///
/// Database failures never reach the engine: the store logs them and serves
/// empty lookups. Only snapshot files and configuration raise.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database settings are incomplete or invalid.
    #[error("Invalid database configuration: {0}")]
    Config(String),

    /// PostgreSQL error.
    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Timed out while connecting.
    #[error("Database connection timed out")]
    Timeout,

    /// IO error.
    #[error("Snapshot IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Snapshot JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::transform::pipeline::transform_file`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raw file error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Target schema error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Plan error.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// AI client error.
    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Lookup store error.
    #[error("Lookup store error: {0}")]
    Store(#[from] StoreError),

    /// Output error.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable table was found in the input.
    #[error("No data table found: {0}")]
    NoTable(String),

    /// The plan ran but produced no rows.
    #[error("Transformation produced no data to output")]
    NothingToOutput,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for raw file parsing.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for plan resolution.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let plan_err = PlanError::Malformed {
            kind: "wide".into(),
            message: "mapping_plan must be an object".into(),
        };
        let pipeline_err: PipelineError = plan_err.into();
        assert!(pipeline_err.to_string().contains("wide"));
    }

    #[test]
    fn test_invalid_plan_lists_every_problem() {
        let err = PlanError::Invalid(vec!["first".into(), "second".into()]);
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_transient_ai_errors() {
        assert!(AiError::RequestFailed("timeout".into()).is_transient());
        assert!(!AiError::InvalidResponse("not json".into()).is_transient());
        assert!(!AiError::MissingApiKey("ANTHROPIC_API_KEY".into()).is_transient());
    }
}
