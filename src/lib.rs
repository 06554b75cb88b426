//! sqlsched — a dependency-aware SQL task scheduler for PostgreSQL.
//!
//! A suite of paired DDL/INSERT scripts describes a set of tables; this
//! crate discovers them, links them into a dependency DAG by the tables
//! each INSERT script reads and writes, and executes them in dependency
//! order against a database, running any declared tests along the way.
//!
//! The pipeline is: [`loader`] discovers and parses the suite, [`dag`]
//! links it into a graph and validates it, and [`scheduler`] executes it.
//! [`tokenizer`], [`extractor`], [`rewriter`], [`directives`], and
//! [`assertions`] are the building blocks those three stages are built
//! from.

#![deny(unsafe_op_in_unsafe_fn)]

use std::collections::HashSet;

use tokio::sync::watch;

pub mod assertions;
pub mod config;
pub mod dag;
pub mod directives;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod rewriter;
pub mod scheduler;
pub mod task;
pub mod tokenizer;

pub use config::{Config, Stage};
pub use dag::{Dag, DagReport};
pub use error::{LoadError, SchedulerError};
pub use scheduler::{RunReport, TaskResult};
pub use task::{Task, TaskId, TaskState, TestDirective};

/// What a run produced: either a dry-run plan (`--check`) or an executed
/// report (spec.md §6).
#[derive(Debug)]
pub enum Outcome {
    Plan(DagReport),
    Executed(RunReport),
}

/// Load, validate, and (unless `config.check`) execute a suite. `cancel`
/// is watched by the scheduler for cooperative shutdown; pass a receiver
/// that never fires if the caller has no cancellation source.
pub async fn run_suite(
    config: &Config,
    cancel: watch::Receiver<bool>,
) -> Result<Outcome, SchedulerError> {
    config
        .validate()
        .map_err(SchedulerError::Config)?;

    let mut tasks = loader::load_suite(&config.ddl_directory, &config.insert_directory)?;
    for task in &mut tasks {
        if task.is_incremental {
            task.params = config.incremental_params.clone();
        }
    }
    let dag = Dag::build(tasks)?;
    let execution_set = resolve_execution_set(&dag, config)?;

    if config.check {
        return Ok(Outcome::Plan(dag.report()));
    }

    let pool = connect(config, execution_set.len()).await?;
    let report = scheduler::run(&dag, &execution_set, pool, config, cancel).await?;
    Ok(Outcome::Executed(report))
}

/// Resolve `--target`/`--dependencies` into the concrete set of tasks a
/// run will touch (spec.md §6). Empty targets means "the whole suite".
fn resolve_execution_set(
    dag: &Dag,
    config: &Config,
) -> Result<HashSet<TaskId>, SchedulerError> {
    if config.targets.is_empty() {
        return Ok(dag.ids().cloned().collect());
    }
    for target in &config.targets {
        if !dag.contains(target) {
            return Err(SchedulerError::Load(LoadError::UnknownTarget(
                target.clone(),
            )));
        }
    }
    if config.dependencies {
        Ok(dag.upstream_closure(&config.targets))
    } else {
        Ok(config.targets.iter().cloned().collect())
    }
}

/// Build a connection pool for `config.dsn`, sized to `execution_set_len`
/// unless `config.pool_size` overrides it. The computed default is further
/// capped by the server's own `max_connections` setting (spec.md §4.G); an
/// explicit `config.pool_size` is trusted as the caller's own choice and is
/// never second-guessed against the server.
async fn connect(
    config: &Config,
    execution_set_len: usize,
) -> Result<deadpool_postgres::Pool, SchedulerError> {
    let pg_config: tokio_postgres::Config = config
        .dsn
        .parse()
        .map_err(|e| SchedulerError::Config(format!("invalid dsn: {e}")))?;
    let manager = deadpool_postgres::Manager::new(pg_config, tokio_postgres::NoTls);
    let requested = config.pool_size.unwrap_or_else(|| execution_set_len.max(1));
    let pool = deadpool_postgres::Pool::builder(manager)
        .max_size(requested)
        .build()
        .map_err(|e| SchedulerError::Config(format!("failed to build connection pool: {e}")))?;

    if config.pool_size.is_none()
        && let Some(server_max) = server_max_connections(&pool).await
    {
        let capped = requested.min(server_max.max(1));
        if capped < requested {
            tracing::debug!(requested, capped, server_max, "capping pool size to server max_connections");
            pool.resize(capped);
        }
    }

    Ok(pool)
}

/// Query the server's configured `max_connections` GUC. Returns `None` if
/// the query can't be run (e.g. the DSN is unreachable) — in that case the
/// pool keeps its requested size and the actual connection attempt surfaces
/// whatever error applies.
async fn server_max_connections(pool: &deadpool_postgres::Pool) -> Option<usize> {
    let client = pool.get().await.ok()?;
    let row = client
        .query_one(
            "SELECT setting::int FROM pg_settings WHERE name = 'max_connections'",
            &[],
        )
        .await
        .ok()?;
    let max: i32 = row.get(0);
    usize::try_from(max).ok()
}
