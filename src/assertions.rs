//! Assertion Runner — component H.
//!
//! Translates a [`TestDirective`] into a `SELECT COUNT(*)` query that must
//! return zero (spec.md §4.H). Building the SQL text is pure and unit
//! tested here; `scheduler.rs` owns actually sending it to the database.

use crate::task::{TaskId, TestDirective};

/// Build the assertion query for `directive` against `target`.
///
/// `target` should already be schema-rewritten for dev-stage runs; when the
/// directive is a `Relationship`, its own foreign table is rewritten
/// separately by the caller (spec.md §4.G step 3) and passed via
/// `foreign_override`.
pub fn build_assertion_sql(directive: &TestDirective, target: &TaskId, foreign_override: Option<&TaskId>) -> String {
    match directive {
        TestDirective::Granularity { columns } => {
            let cols = columns.join(", ");
            format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM {target} GROUP BY {cols} HAVING COUNT(*) > 1) s"
            )
        }
        TestDirective::NotNull { columns } => {
            let clauses = columns
                .iter()
                .map(|c| format!("({c} IS NULL)"))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("SELECT COUNT(*) FROM {target} WHERE {clauses}")
        }
        TestDirective::Relationship {
            local_column,
            foreign_schema,
            foreign_table,
            foreign_column,
        } => {
            let foreign = match foreign_override {
                Some(id) => id.clone(),
                None => TaskId::new(foreign_schema.clone(), foreign_table.clone()),
            };
            format!(
                "SELECT COUNT(*) FROM {target} WHERE {local_column} IS NOT NULL AND {local_column} NOT IN (SELECT {foreign_column} FROM {foreign})"
            )
        }
    }
}
