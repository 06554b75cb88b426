//! Suite loading and DAG building against real filesystem fixtures, no
//! database required. Covers the literal scenarios from the task brief
//! that are purely structural: S1 (linear chain), S2/S5 (diamond), S3
//! (cycle).

use std::fs;
use std::path::Path;

use sqlsched::{Dag, LoadError, SchedulerError, TaskId};
use tempfile::tempdir;

fn write_pair(ddl_dir: &Path, insert_dir: &Path, stem: &str, ddl: &str, insert: &str) {
    fs::write(ddl_dir.join(format!("{stem}.sql")), ddl).unwrap();
    fs::write(insert_dir.join(format!("{stem}.sql")), insert).unwrap();
}

/// S1 — linear chain `s.a -> s.b -> s.c`.
#[test]
fn linear_chain_has_a_total_order() {
    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.a",
        "CREATE TABLE s.a (id int);",
        "INSERT INTO s.a SELECT 1;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.b",
        "CREATE TABLE s.b (id int);",
        "INSERT INTO s.b SELECT * FROM s.a;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.c",
        "CREATE TABLE s.c (id int);",
        "INSERT INTO s.c SELECT * FROM s.b;",
    );

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let dag = Dag::build(tasks).unwrap();
    let order = dag.topological_order().unwrap();
    let pos = |id: &TaskId| order.iter().position(|o| o == id).unwrap();

    assert!(pos(&TaskId::new("s", "a")) < pos(&TaskId::new("s", "b")));
    assert!(pos(&TaskId::new("s", "b")) < pos(&TaskId::new("s", "c")));
}

fn setup_diamond(ddl_dir: &Path, insert_dir: &Path) {
    write_pair(
        ddl_dir,
        insert_dir,
        "s.a",
        "CREATE TABLE s.a (id int);",
        "INSERT INTO s.a SELECT * FROM raw.x;",
    );
    write_pair(
        ddl_dir,
        insert_dir,
        "s.b",
        "CREATE TABLE s.b (id int);",
        "INSERT INTO s.b SELECT * FROM raw.x;",
    );
    write_pair(
        ddl_dir,
        insert_dir,
        "s.c",
        "CREATE TABLE s.c (id int);",
        "INSERT INTO s.c SELECT * FROM s.a;",
    );
    write_pair(
        ddl_dir,
        insert_dir,
        "s.d",
        "CREATE TABLE s.d (id int);",
        "INSERT INTO s.d SELECT * FROM s.c JOIN s.b ON true JOIN raw.z ON true;",
    );
}

/// S2 — diamond, `targets=[s.d]`, `dependencies=true` pulls in the whole
/// closure but not `raw.*` tables outside the suite.
#[test]
fn diamond_targets_with_dependencies_pulls_in_full_closure() {
    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    setup_diamond(ddl_dir.path(), insert_dir.path());

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let dag = Dag::build(tasks).unwrap();
    let closure = dag.upstream_closure(&[TaskId::new("s", "d")]);

    assert_eq!(closure.len(), 4);
    assert!(!closure.contains(&TaskId::new("raw", "x")));
    assert!(!closure.contains(&TaskId::new("raw", "z")));
}

/// S5 — diamond, `targets=[s.c]`, `dependencies=false`: the execution set
/// is exactly `{s.c}`, so `s.a` is not pulled in even though `s.c` reads it.
#[test]
fn diamond_target_without_dependencies_is_exact() {
    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    setup_diamond(ddl_dir.path(), insert_dir.path());

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let dag = Dag::build(tasks).unwrap();
    assert_eq!(dag.upstream_of(&TaskId::new("s", "c")), &[TaskId::new("s", "a")]);
}

/// S3 — a two-task cycle is reported as `[s.a, s.b, s.a]` and blocks the
/// DAG from being built at all.
#[test]
fn mutual_cycle_is_reported_and_blocks_the_dag() {
    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.a",
        "CREATE TABLE s.a (id int);",
        "INSERT INTO s.a SELECT * FROM s.b;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.b",
        "CREATE TABLE s.b (id int);",
        "INSERT INTO s.b SELECT * FROM s.a;",
    );

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let err = Dag::build(tasks).unwrap_err();
    match err {
        SchedulerError::Cycle(cycles) => {
            assert_eq!(cycles.len(), 1);
            let cycle = &cycles[0];
            assert_eq!(cycle.first(), cycle.last());
            assert_eq!(cycle.len(), 3);
        }
        other => panic!("expected Cycle, got {other:?}"),
    }
}

/// A suite with no matching DDL partner fails to load rather than silently
/// dropping the orphaned INSERT script.
#[test]
fn orphaned_insert_script_fails_to_load() {
    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    fs::write(insert_dir.path().join("s.a.sql"), "INSERT INTO s.a SELECT 1;").unwrap();

    let err = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::MissingDdlPartner(_)));
}
