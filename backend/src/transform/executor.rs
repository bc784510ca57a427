//! Plan execution: dispatch, constant fill and code mapping.
//!
//! ```text
//! raw table ──► Long | Wide executor ──► constant fill ──► code mapping ──► output
//! ```

use serde_json::Value;

use super::long::apply_long_format;
use super::mapping::{
    default_code_columns, map_column, status_column_name, CodeColumn, CodeLookupProvider,
};
use super::plan::Plan;
use super::wide::apply_wide_format;
use crate::api::logs::{log_error, log_info, log_warning};
use crate::models::{Table, TargetSchema};

/// Runs plans against tables with lookups from a [`CodeLookupProvider`].
pub struct PlanExecutor<'a, P: CodeLookupProvider + ?Sized> {
    lookups: &'a P,
    code_columns: Vec<CodeColumn>,
}

impl<'a, P: CodeLookupProvider + ?Sized> PlanExecutor<'a, P> {
    /// Executor mapping `Sku ID` and then `Customer ID`.
    pub fn new(lookups: &'a P) -> Self {
        Self {
            lookups,
            code_columns: default_code_columns(),
        }
    }

    /// Replace the code columns, processed in the given order.
    pub fn with_code_columns(mut self, code_columns: Vec<CodeColumn>) -> Self {
        self.code_columns = code_columns;
        self
    }

    pub fn code_columns(&self) -> &[CodeColumn] {
        &self.code_columns
    }

    /// Execute `plan` on `table`.
    ///
    /// Returns `None` for an unsupported plan or when nothing is left to
    /// output. Otherwise the result holds the schema columns in order,
    /// followed by one status column per mapped code column. Code columns
    /// carrying a schema constant keep the constant and get no status column.
    /// A status column whose name is already a schema field is not added.
    pub fn execute(&self, table: &Table, plan: &Plan, schema: &TargetSchema) -> Option<Table> {
        log_info(format!("Applying '{}' transformation...", plan.format_name()));

        let mut output = match plan {
            Plan::Long(rules) => apply_long_format(table, rules, schema),
            Plan::Wide(wide) => apply_wide_format(table, wide, schema),
            Plan::Unsupported(name) => {
                log_error(format!("Unknown format type received from plan: '{}'", name));
                return None;
            }
        };

        if output.is_empty() {
            log_warning("Transformation produced no rows");
            return None;
        }

        let mut constant_fields = Vec::new();
        for (field, literal) in schema.constants() {
            let values = vec![Value::String(literal.to_string()); output.height()];
            output.set_column(field, values);
            constant_fields.push(field);
        }

        for code in &self.code_columns {
            if constant_fields.contains(&code.column.as_str()) {
                log_info(format!(
                    "'{}' is a schema constant, skipping code mapping",
                    code.column
                ));
                continue;
            }
            let Some(raw) = output.values(&code.column) else {
                continue;
            };
            let lookup = self.lookups.lookup(code.lookup);
            if lookup.is_empty() {
                log_warning(format!(
                    "No lookup entries for '{}', skipping code mapping",
                    code.column
                ));
                continue;
            }

            let (resolved, statuses) = map_column(raw, &lookup);
            output.set_column(&code.column, resolved);

            let status_name = status_column_name(&code.column);
            if output.has_column(&status_name) {
                log_warning(format!(
                    "'{}' is a schema field, keeping it instead of mapping statuses",
                    status_name
                ));
                continue;
            }
            output.push_column(status_name, statuses);
        }

        Some(output)
    }
}
