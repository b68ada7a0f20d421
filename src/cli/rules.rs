//! CLI subcommand: `pageguard rules`
//!
//! Lists the compiled rule table and evaluates ad-hoc input against it.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use url::Url;

use crate::config::Config;
use crate::security::{AllowListEntry, Candidate, RuleSet};

#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommands,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// List deny rules and allow-list entries
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate text the way inline scripts and form fields are evaluated
    Check {
        /// Text to evaluate
        text: String,
    },

    /// Check whether a link target would be blocked
    Href {
        /// Link target (e.g., "javascript:alert(1)")
        value: String,
    },

    /// Check whether a script source would be flagged
    Script {
        /// Script src, resolved against page.url
        src: String,
    },
}

pub fn run(args: RulesArgs, config: &Config) -> Result<()> {
    let rules = RuleSet::from_config(&config.guard)?;

    match args.command {
        RulesCommands::List { json } => list_rules(&rules, config, json),
        RulesCommands::Check { text } => check_text(&rules, &text),
        RulesCommands::Href { value } => check_href(&rules, &value),
        RulesCommands::Script { src } => check_script(&rules, config, &src),
    }
}

fn list_rules(rules: &RuleSet, config: &Config, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.guard.dangerous_patterns)?);
        return Ok(());
    }

    println!("Deny rules ({}):", rules.rules().len());
    for rule in rules.rules() {
        println!(
            "  {:<24} {:<18} {:<9} {}",
            rule.id,
            rule.category.to_string(),
            format!("{:?}", rule.severity).to_lowercase(),
            rule.pattern.as_str()
        );
    }

    println!();
    println!("Allow-list ({}):", rules.allow_list().len());
    for entry in rules.allow_list() {
        match entry {
            AllowListEntry::Domain(domain) => println!("  domain     {}", domain),
            AllowListEntry::Signature(re) => println!("  signature  {}", re.as_str()),
        }
    }

    println!();
    println!("Blocked link schemes: {}", config.guard.blocked_link_schemes.join(", "));
    println!("Lockdown after {} incident(s)", config.guard.max_violations);
    Ok(())
}

fn check_text(rules: &RuleSet, text: &str) -> Result<()> {
    let evaluation = rules.evaluate(text);
    match evaluation.rule {
        Some(rule) => println!(
            "BLOCKED by {} ({}, {:?})",
            rule.id, rule.category, rule.severity
        ),
        None if rules.is_allowed(Candidate::Inline(text)) => {
            println!("ALLOWED (matches an allow-listed signature)")
        }
        None => println!("CLEAN"),
    }
    Ok(())
}

fn check_href(rules: &RuleSet, value: &str) -> Result<()> {
    if rules.is_executable_uri(value) {
        println!("BLOCKED (executable link scheme)");
    } else {
        println!("ALLOWED");
    }
    Ok(())
}

fn check_script(rules: &RuleSet, config: &Config, src: &str) -> Result<()> {
    let page = Url::parse(&config.page.url)
        .with_context(|| format!("Invalid page.url `{}`", config.page.url))?;

    let Ok(url) = page.join(src) else {
        println!("FLAGGED (unparseable source)");
        return Ok(());
    };

    if url.origin() == page.origin() {
        println!("ALLOWED (same origin as {})", page);
    } else if rules.is_allowed(Candidate::ScriptSource(&url)) {
        println!("ALLOWED (allow-listed domain)");
    } else {
        println!("FLAGGED (foreign origin {})", url.origin().ascii_serialization());
    }
    Ok(())
}
