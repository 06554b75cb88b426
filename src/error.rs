//! Error types for the scheduler.
//!
//! All errors that can occur while loading, validating, or executing a
//! suite are represented by [`SchedulerError`]. Errors are propagated via
//! `Result<T, SchedulerError>` throughout the core crate.
//!
//! # Error Classification
//!
//! Errors fall into two phases, matching the fail-fast policy in spec.md §7:
//! - **Load-time** — [`SchedulerError::Load`], [`SchedulerError::Cycle`],
//!   [`SchedulerError::Config`]. These abort the run before any SQL
//!   executes.
//! - **Execution-time** — [`SchedulerError::Ddl`], [`SchedulerError::Insert`],
//!   [`SchedulerError::Test`], [`SchedulerError::Cancelled`]. These are
//!   task-local: they fail one task and prune its downstream subtree, but
//!   never abort sibling tasks.

use crate::task::TaskId;

/// Primary error type for the scheduler core.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Suite discovery or parsing failed before any task could run.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// The dependency DAG contains one or more cycles.
    #[error("dependency cycle(s) detected: {}", format_cycles(.0))]
    Cycle(Vec<Vec<TaskId>>),

    /// The supplied configuration is invalid or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// Acquiring a pooled connection failed.
    #[error("[{task}] could not acquire a connection: {message}")]
    Pool { task: TaskId, message: String },

    /// A DDL statement failed against the database.
    #[error("[{task}] DDL failed: {source}")]
    Ddl {
        task: TaskId,
        #[source]
        source: tokio_postgres::Error,
    },

    /// An INSERT statement failed against the database.
    #[error("[{task}] INSERT failed: {source}")]
    Insert {
        task: TaskId,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A test directive's assertion query returned a non-zero count.
    #[error("[{task}] test failed: {directive} (count={count})")]
    Test {
        task: TaskId,
        directive: String,
        count: i64,
    },

    /// A test directive's assertion query failed to execute against the
    /// database (e.g. a malformed column name) — distinct from `Test`,
    /// which is a successful query returning a non-zero count.
    #[error("[{task}] test query failed: {directive}: {source}")]
    TestQuery {
        task: TaskId,
        directive: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// The run was cancelled by an external signal before completion.
    #[error("[{task}] cancelled")]
    Cancelled { task: TaskId },
}

impl SchedulerError {
    /// Whether this error is task-local (fails one task, prunes its
    /// downstream subtree) rather than aborting the whole run up front.
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            SchedulerError::Pool { .. }
                | SchedulerError::Ddl { .. }
                | SchedulerError::Insert { .. }
                | SchedulerError::Test { .. }
                | SchedulerError::TestQuery { .. }
                | SchedulerError::Cancelled { .. }
        )
    }

    /// The task this error is attributed to, if it is task-local.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            SchedulerError::Pool { task, .. }
            | SchedulerError::Ddl { task, .. }
            | SchedulerError::Insert { task, .. }
            | SchedulerError::Cancelled { task } => Some(task),
            SchedulerError::Test { task, .. } | SchedulerError::TestQuery { task, .. } => {
                Some(task)
            }
            _ => None,
        }
    }

    /// A short phase label for user-facing messages ("DDL", "INSERT", or a
    /// test directive name), per spec.md §7's requirement that messages
    /// carry the phase.
    pub fn phase(&self) -> &'static str {
        match self {
            SchedulerError::Pool { .. } => "pool",
            SchedulerError::Ddl { .. } => "DDL",
            SchedulerError::Insert { .. } => "INSERT",
            SchedulerError::Test { .. } => "test",
            SchedulerError::TestQuery { .. } => "test",
            SchedulerError::Cancelled { .. } => "cancelled",
            SchedulerError::Load(_) => "load",
            SchedulerError::Cycle(_) => "dag",
            SchedulerError::Config(_) => "config",
        }
    }
}

fn format_cycles(cycles: &[Vec<TaskId>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            cycle
                .iter()
                .map(TaskId::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while discovering and parsing the suite on disk, before
/// any task runs. These always abort the process (spec.md §7).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("DDL directory has no INSERT partner for '{0}'")]
    MissingInsertPartner(String),

    #[error("INSERT directory has no DDL partner for '{0}'")]
    MissingDdlPartner(String),

    #[error("duplicate task id '{0}' found while scanning the suite")]
    DuplicateTask(TaskId),

    #[error("filename '{0}' is not of the form <schema>.<table>.sql")]
    MalformedFilename(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("INSERT script for '{expected}' writes to '{actual}' instead of its own table")]
    WriteTargetMismatch { expected: TaskId, actual: TaskId },

    #[error("INSERT script for '{task}' has no recognizable write target")]
    NoWriteTarget { task: TaskId },

    #[error("malformed test directive in '{task}': {line}")]
    MalformedDirective { task: TaskId, line: String },

    #[error("unknown target '{0}' passed on the command line")]
    UnknownTarget(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_formatting_joins_with_arrows() {
        let a = TaskId::new("s", "a");
        let b = TaskId::new("s", "b");
        let msg = format_cycles(&[vec![a.clone(), b.clone(), a]]);
        assert_eq!(msg, "s.a -> s.b -> s.a");
    }

    #[test]
    fn task_local_classification() {
        let err = SchedulerError::Config("missing dev_schema".into());
        assert!(!err.is_task_local());
        let err = SchedulerError::Cancelled {
            task: TaskId::new("s", "a"),
        };
        assert!(err.is_task_local());
    }
}
