//! qtm — phased rollout and rollback of application suites.
//!
//! Two subcommands:
//!
//! ```text
//! qtm rollout  <suiteName> [flags]   deploy a suite phase by phase
//! qtm rollback <suiteName> [flags]   reverse a recorded session
//! ```
//!
//! SIGINT/SIGTERM cancel the shared token; an interrupted rollout
//! still rolls back the in-flight phase before exiting.

mod commands;
mod prompt;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use commands::{RollbackArgs, RolloutArgs};

#[derive(Parser)]
#[command(
    name = "qtm",
    about = "qtm is a tool to manage, deploy, and rollback distributed systems",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rollout a suite of deployments
    Rollout(RolloutArgs),
    /// Rollback suites from a session
    Rollback(RollbackArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let success = match cli.command {
        Commands::Rollout(args) => commands::rollout::run(cancel, args).await?,
        Commands::Rollback(args) => commands::rollback::run(cancel, args).await?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Cancel the token on SIGINT or SIGTERM.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("received an interrupt, cancelling deployments");
        cancel.cancel();
    });
}
