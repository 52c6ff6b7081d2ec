//! cdrive - Azure Blob Storage as a path-addressable drive

mod commands;
mod exit_code;
mod output;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.debug) {
        eprintln!("Failed to initialize logging: {e:#}");
    }

    let code = commands::execute(cli).await;
    std::process::exit(code.as_i32());
}

/// Logs go to stderr so stdout stays clean for JSON. `RUST_LOG` refines the
/// default level.
fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}
