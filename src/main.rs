//! pgstamp - Template database cache for PostgreSQL
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use pgstamp::cli::{Cli, Commands};
use pgstamp::config::ConfigManager;
use pgstamp::error::PgstampResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PgstampResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;

    init_logging(cli.verbose, cli.log_json || config.general.log_format == "json");
    pgstamp::ui::init_theme();
    debug!("Using config {}", config_manager.path().display());

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command {
        Commands::Init(args) => pgstamp::cli::commands::init(args, &config).await,
        Commands::Copy(args) => pgstamp::cli::commands::copy(args, &config).await,
        Commands::Cache(args) => pgstamp::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            pgstamp::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "pgstamp=warn",
        1 => "pgstamp=info",
        _ => "pgstamp=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
