pub mod config;
pub mod ledger;
pub mod paths;
pub mod rules;
pub mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::paths::Paths;

#[derive(Parser)]
#[command(name = "pageguard")]
#[command(author, version, about = "Client-side content-integrity monitor")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "PAGEGUARD_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management
    Config(config::ConfigArgs),

    /// Inspect and try out the rule table
    Rules(rules::RulesArgs),

    /// Inspect exported incident ledgers
    Ledger(ledger::LedgerArgs),

    /// Run the monitor against a built-in sample page
    Simulate(simulate::SimulateArgs),

    /// Show resolved XDG directory paths
    Paths,
}

/// Load the config named on the command line, or the default one.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(raw) => {
            let path = PathBuf::from(shellexpand::tilde(raw).as_ref());
            let mut config = Config::load_from(&path)?;
            config.paths = Paths::resolve()?;
            Ok(config)
        }
        None => Config::load(),
    }
}

/// Log level from an existing config file, without creating one.
pub fn configured_log_level(path: Option<&str>) -> Option<String> {
    let path = match path {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
        None => Config::config_path().ok()?,
    };
    if !path.exists() {
        return None;
    }
    Config::load_from(&path).ok().map(|c| c.logging.level)
}
