//! CLI subcommand: `pageguard ledger`
//!
//! Reads exported session ledgers and checks their hash chain.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::security::{read_ledger_export, verify_ledger_chain};

#[derive(Args)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommands,
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Show the incidents of an exported ledger
    Show {
        /// Path to a JSONL ledger export
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Filter by incident kind (e.g., dangerous-href, dom-clobbering)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Verify the hash chain of an exported ledger
    Verify {
        /// Path to a JSONL ledger export
        path: PathBuf,
    },
}

pub fn run(args: LedgerArgs) -> Result<()> {
    match args.command {
        LedgerCommands::Show { path, json, kind } => show_ledger(&path, json, kind),
        LedgerCommands::Verify { path } => verify_ledger(&path),
    }
}

fn show_ledger(path: &Path, json_output: bool, kind: Option<String>) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("No ledger export at {}", path.display());
    }

    let mut records = read_ledger_export(path)?;
    if let Some(ref kind) = kind {
        records.retain(|r| r.incident.kind.as_str() == kind);
    }

    if records.is_empty() {
        if kind.is_some() {
            println!("No incidents matching filter.");
        } else {
            println!("No incidents.");
        }
        return Ok(());
    }

    // Chain status is computed on the full file, not the filtered view.
    let broken = verify_ledger_chain(path)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!(
        "Incident Ledger ({} incidents, session {}):",
        records.len(),
        records[0].session_id
    );
    println!();
    for record in &records {
        let incident = &record.incident;
        println!(
            "  #{:<4} {} {:<28} {}",
            incident.seq,
            incident.timestamp,
            incident.kind.as_str(),
            incident.details
        );
    }

    println!();
    if broken.is_empty() {
        println!("Chain integrity: INTACT");
    } else {
        println!("Chain integrity: BROKEN at {} position(s)", broken.len());
    }
    Ok(())
}

fn verify_ledger(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("No ledger export at {}", path.display());
    }

    let broken = verify_ledger_chain(path)?;
    if broken.is_empty() {
        println!("Chain integrity: INTACT");
        return Ok(());
    }

    println!("Chain integrity: BROKEN");
    for line in &broken {
        println!("  line {}", line + 1);
    }
    anyhow::bail!("ledger chain broken at {} position(s)", broken.len())
}
