mod cli;
mod config;
mod input;
mod push;
mod report;

use std::process::ExitCode;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    // Load `.env` before the filter is built so RUST_LOG can come from it.
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => debug!(?path, "loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("ignoring unreadable .env file: {err}"),
    }

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let code = match cli.command {
        cli::Command::Push(args) => exit_code(push::run(&args, &config).await?),
        cli::Command::Config(ConfigCommand::Init) => {
            init_config(&config)?;
            ExitCode::SUCCESS
        }
        cli::Command::Version => {
            print_version();
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

// Records are dropped (and their values wiped) before the process exits.
fn exit_code(all_ok: bool) -> ExitCode {
    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so
    // stdout carries only the report.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("ghsm {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
