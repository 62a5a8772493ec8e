//! ferrodock — homology modelling and batched docking pipeline.
//! Entry point for the command-line binary.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::commands::Outcome;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ferrodock=debug,info")),
        )
        .init();

    let cli = Cli::parse();
    info!("ferrodock {} starting: {:?}", env!("CARGO_PKG_VERSION"), cli.command);

    match commands::dispatch(cli).await? {
        Outcome::Success => Ok(ExitCode::SUCCESS),
        Outcome::StageFailed(stage) => {
            error!("Stage {} produced nothing", stage);
            Ok(ExitCode::FAILURE)
        }
    }
}
