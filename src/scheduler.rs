//! Scheduler / Executor — component G.
//!
//! Drives task state transitions, dispatches work across a pooled set of
//! connections, propagates upstream failures downstream, and runs tests
//! between insert and release of dependents (spec.md §4.G). The scheduler
//! itself is a single event loop consuming task-completion events and
//! producing newly-ready work; the concurrency comes from how many tasks
//! have connections checked out at once, bounded by the pool (spec.md §5).

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use deadpool_postgres::Pool;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio_postgres::tls::NoTls;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::CancelToken;

use crate::assertions::build_assertion_sql;
use crate::config::{Config, Stage};
use crate::dag::Dag;
use crate::error::SchedulerError;
use crate::rewriter::rewrite_schema;
use crate::task::{Task, TaskId, TaskState, TestDirective};
use crate::tokenizer::split_statements;

/// Final outcome recorded for one task in a [`RunReport`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub id: TaskId,
    pub state: TaskState,
    pub cause: Option<String>,
    pub duration: Duration,
}

/// Summary returned once every task in the execution set has reached a
/// terminal state (spec.md §4.G "Termination").
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<TaskResult>,
}

impl RunReport {
    /// `true` iff every task reached `Success` (spec.md §6 exit code 0).
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.state == TaskState::Success)
    }

    /// `true` if any task's failure was attributed to cancellation — the
    /// CLI maps this to exit code 130 rather than 2 (spec.md §6).
    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.cause.as_deref() == Some("cancelled"))
    }
}

type RunningTask = (TaskId, Instant, Result<(), SchedulerError>);

/// Run every task in `execution_set` against `pool`, respecting `dag`'s
/// edges. `cancel` fires once to request cooperative shutdown (spec.md
/// §4.G "Cancellation").
pub async fn run(
    dag: &Dag,
    execution_set: &HashSet<TaskId>,
    pool: Pool,
    config: &Config,
    mut cancel: watch::Receiver<bool>,
) -> Result<RunReport, SchedulerError> {
    let mut waiting: HashMap<TaskId, usize> = HashMap::new();
    for id in execution_set {
        let count = dag
            .upstream_of(id)
            .iter()
            .filter(|u| execution_set.contains(*u))
            .count();
        waiting.insert(id.clone(), count);
    }

    let mut ready: Vec<TaskId> = waiting
        .iter()
        .filter(|(_, c)| **c == 0)
        .map(|(id, _)| id.clone())
        .collect();
    ready.sort_by(|a, b| b.cmp(a));

    let mut results: HashMap<TaskId, TaskResult> = HashMap::new();
    let mut join_set: JoinSet<RunningTask> = JoinSet::new();
    let cancel_tokens: std::sync::Arc<Mutex<HashMap<TaskId, CancelToken>>> =
        std::sync::Arc::new(Mutex::new(HashMap::new()));
    let mut cancelled = false;

    loop {
        if !cancelled {
            while let Some(id) = ready.pop() {
                let task = dag
                    .task(&id)
                    .unwrap_or_else(|| panic!("task {id} must exist in its own DAG"))
                    .clone();
                let pool = pool.clone();
                let config = config.clone();
                let execution_set = execution_set.clone();
                let cancel_tokens = cancel_tokens.clone();
                let start = Instant::now();
                join_set.spawn(async move {
                    let outcome =
                        run_one_task(&task, &pool, &config, &execution_set, &cancel_tokens).await;
                    (task.id, start, outcome)
                });
            }
        }

        if join_set.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            changed = cancel.changed(), if !cancelled => {
                if changed.is_ok() && *cancel.borrow() {
                    cancelled = true;
                    let tokens = cancel_tokens.lock().await;
                    for token in tokens.values() {
                        let _ = token.cancel_query(NoTls).await;
                    }
                }
            }
            joined = join_set.join_next() => {
                let Some(joined) = joined else { continue };
                let (id, start, outcome) = joined.expect("task future must not panic");
                let duration = start.elapsed();
                record_outcome(dag, execution_set, &id, outcome, duration, cancelled, &mut results, &mut waiting, &mut ready);
                ready.sort_by(|a, b| b.cmp(a));
            }
        }
    }

    let mut results: Vec<TaskResult> = results.into_values().collect();
    results.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(RunReport { results })
}

#[allow(clippy::too_many_arguments)]
fn record_outcome(
    dag: &Dag,
    execution_set: &HashSet<TaskId>,
    id: &TaskId,
    outcome: Result<(), SchedulerError>,
    duration: Duration,
    cancelled: bool,
    results: &mut HashMap<TaskId, TaskResult>,
    waiting: &mut HashMap<TaskId, usize>,
    ready: &mut Vec<TaskId>,
) {
    match outcome {
        Ok(()) => {
            tracing::info!(task = %id, "task succeeded");
            results.insert(
                id.clone(),
                TaskResult {
                    id: id.clone(),
                    state: TaskState::Success,
                    cause: None,
                    duration,
                },
            );
            for downstream in dag.downstream_of(id) {
                if !execution_set.contains(downstream) {
                    continue;
                }
                if let Some(count) = waiting.get_mut(downstream) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(downstream.clone());
                    }
                }
            }
        }
        Err(err) => {
            let cause = if cancelled {
                "cancelled".to_string()
            } else {
                err.to_string()
            };
            tracing::error!(task = %id, phase = err.phase(), error = %err, "task failed");
            results.insert(
                id.clone(),
                TaskResult {
                    id: id.clone(),
                    state: TaskState::Failed,
                    cause: Some(cause),
                    duration,
                },
            );

            for downstream in dag.downstream_closure(id) {
                if !execution_set.contains(&downstream) || results.contains_key(&downstream) {
                    continue;
                }
                waiting.remove(&downstream);
                ready.retain(|r| *r != downstream);
                tracing::warn!(task = %downstream, upstream = %id, "task skipped");
                results.insert(
                    downstream.clone(),
                    TaskResult {
                        id: downstream,
                        state: TaskState::Skipped,
                        cause: Some(format!("upstream {id} failed")),
                        duration: Duration::ZERO,
                    },
                );
            }
        }
    }
}

/// Binds an incremental task's CLI-supplied parameter by Postgres text
/// format instead of by declared Rust type. `task.params` are plain
/// strings standing in for whatever type the script's own `$1::date`-style
/// cast resolves to; `String::accepts` only recognizes text-ish column
/// types, so binding through it would reject a cast to `date` or `int`.
/// Sending the value as text and letting the server's input function for
/// the resolved type parse it sidesteps that (same shape as `SqlParam` in
/// dibs, generalized to "accept anything, the SQL's cast decides").
#[derive(Debug)]
struct TextParam<'a>(&'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Run one task's DDL, INSERT, and tests, strictly serially on one pooled
/// connection (spec.md §4.G "Ordering guarantees").
async fn run_one_task(
    task: &Task,
    pool: &Pool,
    config: &Config,
    execution_set: &HashSet<TaskId>,
    cancel_tokens: &Mutex<HashMap<TaskId, CancelToken>>,
) -> Result<(), SchedulerError> {
    let client = pool.get().await.map_err(|source| SchedulerError::Pool {
        task: task.id.clone(),
        message: source.to_string(),
    })?;

    cancel_tokens
        .lock()
        .await
        .insert(task.id.clone(), client.cancel_token());

    let replace = if config.stage == Stage::Dev {
        execution_set.clone()
    } else {
        HashSet::new()
    };
    let dev_schema = config.dev_schema.as_deref().unwrap_or("");

    tracing::debug!(task = %task.id, phase = "DDL", "running");
    let ddl_sql = rewrite_schema(&task.ddl_sql, &replace, dev_schema);
    client
        .batch_execute(&ddl_sql)
        .await
        .map_err(|source| SchedulerError::Ddl {
            task: task.id.clone(),
            source,
        })?;

    tracing::debug!(task = %task.id, phase = "INSERT", "running");
    let insert_sql = rewrite_schema(&task.insert_sql, &replace, dev_schema);
    if task.is_incremental {
        // An incremental script is a DELETE followed by an INSERT, both
        // referencing the same `$1`/`$2` ... parameters (spec.md §4.B,
        // scenario S6). The extended query protocol `execute` prepares
        // exactly one command, so each statement is bound and sent
        // separately rather than as one multi-statement batch.
        let values: Vec<TextParam> = task.params.iter().map(|p| TextParam(p)).collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        for stmt in split_statements(&insert_sql) {
            client
                .execute(stmt, &params)
                .await
                .map_err(|source| SchedulerError::Insert {
                    task: task.id.clone(),
                    source,
                })?;
        }
    } else {
        client
            .batch_execute(&insert_sql)
            .await
            .map_err(|source| SchedulerError::Insert {
                task: task.id.clone(),
                source,
            })?;
    }

    tracing::debug!(task = %task.id, phase = "tests", count = task.tests.len(), "running");
    run_tests(task, &client, config, execution_set, dev_schema).await?;

    cancel_tokens.lock().await.remove(&task.id);
    Ok(())
}

async fn run_tests(
    task: &Task,
    client: &deadpool_postgres::Client,
    config: &Config,
    execution_set: &HashSet<TaskId>,
    dev_schema: &str,
) -> Result<(), SchedulerError> {
    for directive in &task.tests {
        let foreign_override = match directive {
            TestDirective::Relationship {
                foreign_schema,
                foreign_table,
                ..
            } if config.stage == Stage::Dev => {
                let foreign_id = TaskId::new(foreign_schema.clone(), foreign_table.clone());
                if execution_set.contains(&foreign_id) {
                    Some(TaskId::new(dev_schema.to_string(), foreign_table.clone()))
                } else {
                    None
                }
            }
            _ => None,
        };
        let sql = build_assertion_sql(directive, &task.id, foreign_override.as_ref());
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|source| SchedulerError::TestQuery {
                task: task.id.clone(),
                directive: directive.to_string(),
                source,
            })?;
        let count: i64 = row.get(0);
        if count != 0 {
            return Err(SchedulerError::Test {
                task: task.id.clone(),
                directive: directive.to_string(),
                count,
            });
        }
    }
    Ok(())
}
