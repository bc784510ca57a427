//! Transformation module.
//!
//! This module turns raw client tables into the target schema:
//! - Plan: plan documents and the typed plans they resolve to
//! - Long / Wide: the two format executors
//! - Mapping: code resolution with per-row status
//! - Executor: dispatch, constant fill and code mapping
//! - Pipeline: file in, table out

pub mod executor;
pub mod long;
pub mod mapping;
pub mod operations;
pub mod pipeline;
pub mod plan;
pub mod wide;

pub use executor::PlanExecutor;
pub use long::apply_long_format;
pub use mapping::{
    default_code_columns, map_column, resolve, status_column_name, CodeColumn, CodeLookup,
    CodeLookupProvider, LookupKind, MappingStatus,
};
pub use plan::{
    example_long_plan, example_wide_plan, KeyColumnMapping, MappingRule, Plan, PlanDocument,
    TransformationKind, WidePlan,
};
pub use pipeline::*;
pub use wide::apply_wide_format;
