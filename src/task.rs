//! Core data model: table identity, tasks, test directives, and runtime state.
//!
//! See spec.md §3 (DATA MODEL) for the authoritative description.

use std::fmt;

/// Identifies a table by its schema-qualified name. Compared case-sensitively
/// — the filename stem `schema.table` is the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub schema: String,
    pub table: String,
}

impl TaskId {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// A single assertion declared in a `/* ... */` comment inside an INSERT
/// script (spec.md §4.D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestDirective {
    /// `granularity: col1, col2` — no two rows may share these column values.
    Granularity { columns: Vec<String> },
    /// `not_null: col1, col2` — none of these columns may be NULL.
    NotNull { columns: Vec<String> },
    /// `relationship: local_col = schema.table.col` — every non-null
    /// `local_col` value must exist in the foreign column.
    Relationship {
        local_column: String,
        foreign_schema: String,
        foreign_table: String,
        foreign_column: String,
    },
}

impl fmt::Display for TestDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestDirective::Granularity { columns } => {
                write!(f, "granularity: {}", columns.join(", "))
            }
            TestDirective::NotNull { columns } => write!(f, "not_null: {}", columns.join(", ")),
            TestDirective::Relationship {
                local_column,
                foreign_schema,
                foreign_table,
                foreign_column,
            } => write!(
                f,
                "relationship: {local_column} = {foreign_schema}.{foreign_table}.{foreign_column}"
            ),
        }
    }
}

/// Runtime lifecycle state of a [`Task`]. Transitions are monotonic along
/// `Pending -> Ready -> Running_* -> (Success | Failed | Skipped)`
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    RunningDdl,
    RunningInsert,
    RunningTests,
    Success,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::RunningDdl => "running_ddl",
            TaskState::RunningInsert => "running_insert",
            TaskState::RunningTests => "running_tests",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// One managed unit of work: a DDL/INSERT pair plus its derived metadata.
///
/// The `reads`/`writes`/`tests`/`is_incremental`/`params` fields are
/// immutable identity data, populated once by the Suite Loader (spec.md
/// §4.E) and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub ddl_sql: String,
    pub insert_sql: String,
    /// Tables read by the INSERT script, whether or not they are part of
    /// this suite (edges are only materialized for ones that are).
    pub reads: Vec<TaskId>,
    pub tests: Vec<TestDirective>,
    pub is_incremental: bool,
    pub params: Vec<String>,
}

impl Task {
    pub fn reads_set(&self) -> std::collections::HashSet<&TaskId> {
        self.reads.iter().collect()
    }
}
