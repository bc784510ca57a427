//! # Orderload - normalize client order exports
//!
//! Orderload converts client-supplied order spreadsheets, whose layout is
//! unknown in advance, into a fixed target schema. A language model decides
//! where the data table starts and how its columns map; execution of that
//! decision is deterministic.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Client file │────▶│   Parser    │────▶│  Plan (AI / │────▶│  Executor   │────▶ CSV
//! │  (any enc)  │     │ header + tbl│     │  registry)  │     │ + code map  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orderload::{transform_file, TransformOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = transform_file("orders.csv".as_ref(), TransformOptions::default())
//!         .await
//!         .unwrap();
//!     println!("{} order lines", result.table.height());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Table and target schema
//! - [`parser`] - Raw file reading and table extraction
//! - [`transform`] - Plans, executors, code mapping and pipeline
//! - [`validation`] - JSON Schema validation of plans and schemas
//! - [`cache`] - Plan registry
//! - [`store`] - Code lookups
//! - [`output`] - CSV and JSON rendering
//! - [`ai`] - Header discovery and plan selection
//! - [`api`] - HTTP API server and log channel

// Core modules
pub mod error;
pub mod models;

pub mod parser;
pub mod transform;
pub mod validation;

pub mod cache;
pub mod store;
pub mod output;

pub mod ai;
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{
    AiError, CsvError, OutputError, PipelineError, PlanError, RegistryError, SchemaError,
    ServerError, StoreError,
};

pub use models::{default_order_schema, Column, FieldSpec, Table, TargetSchema};

pub use parser::{extract_main_table, parse_bytes_auto, parse_file_auto, RawSheet};

pub use transform::{
    apply_long_format, apply_wide_format, CodeColumn, CodeLookup, CodeLookupProvider,
    LookupKind, MappingRule, MappingStatus, Plan, PlanDocument, PlanExecutor, WidePlan,
};

pub use transform::pipeline::{
    transform_bytes, transform_file, CsvInfo, PipelineResult, TransformOptions,
};

pub use ai::AiClient;
pub use cache::{PlanRegistry, StoredPlan};
pub use store::{load_lookups, LookupSnapshot, PgLookupStore};
