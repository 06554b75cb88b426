mod cli;
mod render;

use clap::Parser;
use sqlsched::{Config, Outcome, SchedulerError};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();
    let config: Config = cli.into();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let exit_code = match sqlsched::run_suite(&config, cancel_rx).await {
        Ok(Outcome::Plan(report)) => {
            println!("{}", render::render_dag_report(&report));
            if report.cycles.is_empty() {
                0
            } else {
                1
            }
        }
        Ok(Outcome::Executed(report)) => {
            println!("{}", render::render_run_report(&report));
            if report.all_succeeded() {
                0
            } else if report.was_cancelled() {
                130
            } else {
                2
            }
        }
        Err(err @ (SchedulerError::Load(_) | SchedulerError::Cycle(_) | SchedulerError::Config(_))) => {
            eprintln!("{err}");
            1
        }
        Err(err) => {
            eprintln!("{err}");
            2
        }
    };

    std::process::exit(exit_code);
}
