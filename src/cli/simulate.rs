//! CLI subcommand: `pageguard simulate`
//!
//! Runs the monitor against a sample page carrying the usual injection
//! payloads and prints what it recorded. Useful for trying out a rule table
//! or a lockdown threshold before deploying it.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use crate::config::Config;
use crate::detectors::CspViolation;
use crate::document::{Document, NodeId};
use crate::host::StaticProbe;
use crate::monitor::{Monitor, MonitorHooks};

#[derive(Args)]
pub struct SimulateArgs {
    /// Inline event handlers to inject after startup
    #[arg(short, long, default_value_t = 3)]
    pub inject: u32,

    /// Submit the sample form with a dangerous comment
    #[arg(long)]
    pub submit: bool,

    /// Make `eval` report a non-native source
    #[arg(long)]
    pub tamper: bool,

    /// Write the ledger to the state directory
    #[arg(long)]
    pub export: bool,

    /// Output the final snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: SimulateArgs, config: &Config) -> Result<()> {
    let mut config = config.clone();
    if args.export && config.ledger.export_path.is_none() {
        let path = config.paths.ledger_export("{session}");
        config.ledger.export_path = Some(path.to_string_lossy().into_owned());
    }

    let (document, form) = sample_page()?;

    let mut hooks = MonitorHooks::from_config(&config);
    if args.tamper {
        let probe = StaticProbe::native(&config.guard.monitored_primitives)
            .with_source("eval", "function eval(code) { report(code); }");
        hooks.probe = Arc::new(probe);
    }

    let monitor = Monitor::start(&config, document, hooks)?;
    let handle = monitor.handle();

    for i in 0..args.inject {
        handle.mutate(move |doc| {
            let body = doc.body();
            if let Ok(widget) = doc.append_element(body, "div", &[("class", "promo")]) {
                let _ = doc.set_attribute(widget, "onmouseover", &format!("track({})", i));
            }
        })?;
    }

    if args.submit {
        let outcome = handle.submit_form(form).await?;
        println!("Form submission: {:?}", outcome);
    }

    handle.report_csp_violation(CspViolation {
        directive: "script-src".to_string(),
        blocked_uri: "https://cdn.unknown-tracker.io/t.js".to_string(),
        line_number: None,
        source_file: None,
    })?;
    handle.run_health_check()?;

    let snapshot = monitor.shutdown().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Session:     {}", snapshot.session_id);
    println!("Policy:      {}", snapshot.state);
    println!("Interactive: {}", snapshot.interactive);
    println!("Incidents:   {}", snapshot.count);
    println!();
    for incident in &snapshot.incidents {
        println!(
            "  #{:<4} {:<28} {}",
            incident.seq,
            incident.kind.as_str(),
            incident.details
        );
    }
    if let Some(path) = config.ledger_export_path(&snapshot.session_id) {
        println!();
        println!("Ledger exported to {}", path.display());
    }
    Ok(())
}

/// A page with one of each startup finding and a contact form.
fn sample_page() -> Result<(Document, NodeId)> {
    let mut doc = Document::new();
    let body = doc.body();

    doc.append_element(body, "a", &[("href", "javascript:alert(document.cookie)")])?;
    doc.append_element(body, "a", &[("href", "/about")])?;
    doc.append_element(body, "img", &[("src", "/logo.png"), ("onerror", "steal()")])?;
    doc.append_element(body, "script", &[("src", "https://fonts.googleapis.com/css.js")])?;
    doc.append_element(body, "script", &[("src", "https://cdn.unknown-tracker.io/t.js")])?;
    let inline = doc.append_element(body, "script", &[])?;
    doc.append_text(inline, "document.write('<iframe src=//evil>')")?;
    let analytics = doc.append_element(body, "script", &[])?;
    doc.append_text(analytics, "window.dataLayer = window.dataLayer || [];")?;

    let form = doc.append_element(body, "form", &[("action", "/contact")])?;
    doc.append_element(form, "input", &[("name", "email"), ("value", "visitor@example.com")])?;
    let comment = doc.append_element(form, "textarea", &[("name", "comment")])?;
    doc.append_text(comment, "<img src=x onerror=alert(1)>")?;

    Ok((doc, form))
}
