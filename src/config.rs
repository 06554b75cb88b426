//! Immutable run configuration (spec.md §6).
//!
//! The CLI collaborator is responsible for turning argv/env/`.env` into a
//! fully-populated [`Config`]; the core never reads the environment or
//! argv itself (spec.md §9 "Global configuration").

use crate::task::TaskId;

/// Which stage a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prod,
    Dev,
}

/// A fully-resolved, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub ddl_directory: std::path::PathBuf,
    pub insert_directory: std::path::PathBuf,
    pub dsn: String,
    pub stage: Stage,
    /// Required when `stage == Stage::Dev`.
    pub dev_schema: Option<String>,
    /// Empty means "whole suite".
    pub targets: Vec<TaskId>,
    /// Include the transitive upstream closure of `targets`.
    pub dependencies: bool,
    /// Build and validate the DAG, then exit without executing.
    pub check: bool,
    /// Connection pool size. Defaults to the number of tasks in the
    /// execution set when `None` (spec.md §4.G).
    pub pool_size: Option<usize>,
    /// Positional parameters bound onto every incremental task's DDL-free
    /// DELETE/INSERT statements (spec.md §6 "incremental", scenario S6).
    /// Semantics of the values themselves are the caller's concern — the
    /// core only binds them positionally as `$1`, `$2`, ….
    pub incremental_params: Vec<String>,
}

impl Config {
    /// Validate cross-field invariants the CLI can't catch by construction
    /// (e.g. `clap`'s mutually-exclusive flag groups already rule out
    /// `--dev`+`--prod` together; this catches the rest per spec.md §7).
    pub fn validate(&self) -> Result<(), String> {
        if self.stage == Stage::Dev && self.dev_schema.as_deref().unwrap_or("").is_empty() {
            return Err("dev_schema is required when stage = dev".to_string());
        }
        Ok(())
    }
}
