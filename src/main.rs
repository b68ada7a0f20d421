use anyhow::Result;
use clap::Parser;

use pageguard::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        cli::configured_log_level(cli.config.as_deref()).unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config(args) => cli::config::run(args, config_path),
        Commands::Rules(args) => cli::rules::run(args, &cli::load_config(config_path)?),
        Commands::Ledger(args) => cli::ledger::run(args),
        Commands::Simulate(args) => {
            cli::simulate::run(args, &cli::load_config(config_path)?).await
        }
        Commands::Paths => cli::paths::run(),
    }
}
