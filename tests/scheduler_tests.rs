//! End-to-end scheduler tests against a real PostgreSQL instance.

mod common;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use common::TestDb;
use sqlsched::{Config, Dag, Stage, TaskId, TaskState};
use tempfile::tempdir;
use tokio::sync::watch;

fn write_pair(ddl_dir: &Path, insert_dir: &Path, stem: &str, ddl: &str, insert: &str) {
    fs::write(ddl_dir.join(format!("{stem}.sql")), ddl).unwrap();
    fs::write(insert_dir.join(format!("{stem}.sql")), insert).unwrap();
}

fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// S1 — a linear chain executes in full and every task succeeds.
#[tokio::test]
async fn linear_chain_all_succeed() {
    let db = TestDb::new().await;
    db.execute("CREATE SCHEMA s").await;
    db.execute("CREATE TABLE s.src (id int)").await;
    db.execute("INSERT INTO s.src VALUES (1), (2)").await;

    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.a",
        "DROP TABLE IF EXISTS s.a; CREATE TABLE s.a (id int);",
        "INSERT INTO s.a SELECT * FROM s.src;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.b",
        "DROP TABLE IF EXISTS s.b; CREATE TABLE s.b (id int);",
        "INSERT INTO s.b SELECT * FROM s.a;",
    );

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let dag = Dag::build(tasks).unwrap();
    let execution_set: HashSet<TaskId> = dag.ids().cloned().collect();

    let config = Config {
        ddl_directory: ddl_dir.path().into(),
        insert_directory: insert_dir.path().into(),
        dsn: db.dsn.clone(),
        stage: Stage::Prod,
        dev_schema: None,
        targets: Vec::new(),
        dependencies: false,
        check: false,
        pool_size: None,
        incremental_params: Vec::new(),
    };

    let report = sqlsched::scheduler::run(&dag, &execution_set, db.pool.clone(), &config, no_cancel())
        .await
        .unwrap();
    assert!(report.all_succeeded(), "{report:?}");
    assert_eq!(db.count("s.b").await, 2);
}

/// S2 — dev-stage diamond: `s.d`'s insert reads the dev-rewritten `s.c`
/// and `s.b`, but an untouched `raw.z` left outside the suite.
#[tokio::test]
async fn dev_stage_diamond_rewrites_only_in_execution_set() {
    let db = TestDb::new().await;
    db.execute("CREATE SCHEMA s; CREATE SCHEMA dv; CREATE SCHEMA raw;")
        .await;
    db.execute("CREATE TABLE raw.x (id int); INSERT INTO raw.x VALUES (1), (2);")
        .await;
    db.execute("CREATE TABLE raw.z (id int); INSERT INTO raw.z VALUES (9);")
        .await;

    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.a",
        "DROP TABLE IF EXISTS dv.a; CREATE TABLE dv.a (id int);",
        "INSERT INTO s.a SELECT * FROM raw.x;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.b",
        "DROP TABLE IF EXISTS dv.b; CREATE TABLE dv.b (id int);",
        "INSERT INTO s.b SELECT * FROM raw.x;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.c",
        "DROP TABLE IF EXISTS dv.c; CREATE TABLE dv.c (id int);",
        "INSERT INTO s.c SELECT * FROM s.a;",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.d",
        "DROP TABLE IF EXISTS dv.d; CREATE TABLE dv.d (id int);",
        "INSERT INTO s.d SELECT c.id FROM s.c c JOIN s.b b ON b.id = c.id JOIN raw.z z ON true;",
    );

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let dag = Dag::build(tasks).unwrap();
    let execution_set = dag.upstream_closure(&[TaskId::new("s", "d")]);

    let config = Config {
        ddl_directory: ddl_dir.path().into(),
        insert_directory: insert_dir.path().into(),
        dsn: db.dsn.clone(),
        stage: Stage::Dev,
        dev_schema: Some("dv".to_string()),
        targets: vec![TaskId::new("s", "d")],
        dependencies: true,
        check: false,
        pool_size: None,
        incremental_params: Vec::new(),
    };

    let report = sqlsched::scheduler::run(&dag, &execution_set, db.pool.clone(), &config, no_cancel())
        .await
        .unwrap();
    assert!(report.all_succeeded(), "{report:?}");
    assert_eq!(db.count("dv.d").await, 4);
}

/// S4 — a failing granularity test marks its task `Failed` and skips the
/// downstream task, leaving the overall run unsuccessful.
#[tokio::test]
async fn failing_test_gates_downstream_task() {
    let db = TestDb::new().await;
    db.execute("CREATE SCHEMA s").await;

    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.a",
        "DROP TABLE IF EXISTS s.a; CREATE TABLE s.a (id int);",
        "/* granularity: id */\nINSERT INTO s.a VALUES (1), (1);",
    );
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.b",
        "DROP TABLE IF EXISTS s.b; CREATE TABLE s.b (id int);",
        "INSERT INTO s.b SELECT * FROM s.a;",
    );

    let tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    let dag = Dag::build(tasks).unwrap();
    let execution_set: HashSet<TaskId> = dag.ids().cloned().collect();

    let config = Config {
        ddl_directory: ddl_dir.path().into(),
        insert_directory: insert_dir.path().into(),
        dsn: db.dsn.clone(),
        stage: Stage::Prod,
        dev_schema: None,
        targets: Vec::new(),
        dependencies: false,
        check: false,
        pool_size: None,
        incremental_params: Vec::new(),
    };

    let report = sqlsched::scheduler::run(&dag, &execution_set, db.pool.clone(), &config, no_cancel())
        .await
        .unwrap();
    assert!(!report.all_succeeded());

    let a = report
        .results
        .iter()
        .find(|r| r.id == TaskId::new("s", "a"))
        .unwrap();
    let b = report
        .results
        .iter()
        .find(|r| r.id == TaskId::new("s", "b"))
        .unwrap();
    assert_eq!(a.state, TaskState::Failed);
    assert_eq!(b.state, TaskState::Skipped);
    assert!(b.cause.as_ref().unwrap().contains("s.a"));
}

/// S6 — an incremental task binds its positional parameters on both the
/// DELETE and the INSERT of its script.
#[tokio::test]
async fn incremental_task_binds_positional_parameters() {
    let db = TestDb::new().await;
    db.execute("CREATE SCHEMA s; CREATE SCHEMA raw;").await;
    db.execute("CREATE TABLE raw.src (d date, v int);").await;
    db.execute("INSERT INTO raw.src VALUES ('2023-06-01', 1), ('2024-01-15', 2);")
        .await;
    db.execute("CREATE TABLE s.d (d date, v int);").await;
    db.execute("INSERT INTO s.d VALUES ('2023-06-01', 1), ('2024-01-15', 99);")
        .await;

    let ddl_dir = tempdir().unwrap();
    let insert_dir = tempdir().unwrap();
    write_pair(
        ddl_dir.path(),
        insert_dir.path(),
        "s.d",
        "CREATE TABLE IF NOT EXISTS s.d (d date, v int);",
        "--sql-scheduler-incremental\n\
         DELETE FROM s.d WHERE d BETWEEN $1::date AND $2::date;\n\
         INSERT INTO s.d SELECT d, v FROM raw.src WHERE d BETWEEN $1::date AND $2::date;",
    );

    let mut tasks = sqlsched::loader::load_suite(ddl_dir.path(), insert_dir.path()).unwrap();
    tasks[0].params = vec!["2024-01-01".to_string(), "2024-01-31".to_string()];
    let dag = Dag::build(tasks).unwrap();
    let execution_set: HashSet<TaskId> = dag.ids().cloned().collect();

    let config = Config {
        ddl_directory: ddl_dir.path().into(),
        insert_directory: insert_dir.path().into(),
        dsn: db.dsn.clone(),
        stage: Stage::Prod,
        dev_schema: None,
        targets: Vec::new(),
        dependencies: false,
        check: false,
        pool_size: None,
        incremental_params: Vec::new(),
    };

    let report = sqlsched::scheduler::run(&dag, &execution_set, db.pool.clone(), &config, no_cancel())
        .await
        .unwrap();
    assert!(report.all_succeeded(), "{report:?}");
    assert_eq!(db.count("s.d").await, 2);

    let client = db.pool.get().await.unwrap();
    let refreshed: i32 = client
        .query_one("SELECT v FROM s.d WHERE d = '2024-01-15'", &[])
        .await
        .unwrap()
        .get(0);
    // The stale value (99) is only replaced if the DELETE/INSERT pair
    // actually bound $1/$2 to the January 2024 window.
    assert_eq!(refreshed, 2);
}
