//! Argument parsing: turns argv/env/`.env` into a [`sqlsched::Config`]
//! (spec.md §6 "Global configuration"). The core crate never touches
//! `std::env` or argv itself — this module is the only place that does.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use sqlsched::{Config, Stage, TaskId};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StageArg {
    Prod,
    Dev,
}

/// Run a suite of paired DDL/INSERT scripts against PostgreSQL, in
/// dependency order, running their declared tests along the way.
#[derive(Debug, Parser)]
#[command(name = "sqlsched", version, about)]
#[command(group(ArgGroup::new("stage_override").args(["dev", "prod"]).multiple(false)))]
pub struct Cli {
    /// Directory of `<schema>.<table>.sql` DDL scripts.
    #[arg(long, env = "SQLSCHED_DDL_DIR")]
    pub ddl_directory: PathBuf,

    /// Directory of `<schema>.<table>.sql` INSERT scripts.
    #[arg(long, env = "SQLSCHED_INSERT_DIR")]
    pub insert_directory: PathBuf,

    /// PostgreSQL connection string.
    #[arg(long, env = "SQLSCHED_DSN")]
    pub dsn: String,

    /// Run against the production schema or a scratch dev schema.
    #[arg(long, value_enum, default_value = "prod")]
    pub stage: StageArg,

    /// Shorthand for `--stage dev`; mutually exclusive with `--prod`.
    #[arg(long)]
    pub dev: bool,

    /// Shorthand for `--stage prod`; mutually exclusive with `--dev`.
    #[arg(long)]
    pub prod: bool,

    /// Scratch schema every suite table is rewritten into. Required when
    /// `--stage dev`.
    #[arg(long, env = "SQLSCHED_DEV_SCHEMA")]
    pub dev_schema: Option<String>,

    /// Restrict the run to `<schema>.<table>`. Repeatable. Defaults to
    /// the whole suite.
    #[arg(short = 't', long = "target", value_parser = parse_task_id)]
    pub targets: Vec<TaskId>,

    /// With `--target`, also include the transitive upstream closure.
    #[arg(long)]
    pub dependencies: bool,

    /// Build and validate the dependency graph, then exit without
    /// running anything.
    #[arg(long)]
    pub check: bool,

    /// Connection pool size. Defaults to the number of tasks being run.
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Positional parameter bound onto every incremental task's DELETE and
    /// INSERT statements (`$1`, `$2`, ... in source order). Repeatable.
    #[arg(short = 'p', long = "param")]
    pub incremental_params: Vec<String>,
}

fn parse_task_id(s: &str) -> Result<TaskId, String> {
    let (schema, table) = s
        .split_once('.')
        .ok_or_else(|| format!("'{s}' is not of the form <schema>.<table>"))?;
    if schema.is_empty() || table.is_empty() {
        return Err(format!("'{s}' is not of the form <schema>.<table>"));
    }
    Ok(TaskId::new(schema, table))
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let stage = if cli.dev {
            Stage::Dev
        } else if cli.prod {
            Stage::Prod
        } else {
            match cli.stage {
                StageArg::Prod => Stage::Prod,
                StageArg::Dev => Stage::Dev,
            }
        };
        Config {
            ddl_directory: cli.ddl_directory,
            insert_directory: cli.insert_directory,
            dsn: cli.dsn,
            stage,
            dev_schema: cli.dev_schema,
            targets: cli.targets,
            dependencies: cli.dependencies,
            check: cli.check,
            pool_size: cli.pool_size,
            incremental_params: cli.incremental_params,
        }
    }
}
