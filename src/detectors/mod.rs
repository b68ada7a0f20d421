//! Detectors that feed the incident ledger.
//!
//! The static audit and the change watcher apply the same element checks,
//! defined here, so content injected after startup gets no exemption.

pub mod csp;
pub mod form_guard;
pub mod health;
pub mod static_audit;
pub mod watcher;

pub use csp::{CspViolation, record_csp_violation};
pub use form_guard::{FormGuard, SubmissionOutcome};
pub use health::{HealthCheck, HealthReport};
pub use static_audit::{AuditReport, audit_document};
pub use watcher::{ChangeWatcher, WatchReport};

use tracing::warn;

use crate::document::{Document, NodeId};
use crate::error::DetectorError;
use crate::monitor::MonitorContext;
use crate::security::{Candidate, IncidentKind};

const LINK_TAGS: &[&str] = &["a", "area"];

/// Declarations appended to a neutralized link's inline style.
const INERT_LINK_STYLE: &str = "cursor: not-allowed; pointer-events: none";

pub(crate) fn is_link(doc: &Document, id: NodeId) -> bool {
    doc.tag(id).is_some_and(|t| LINK_TAGS.contains(&t))
}

/// Strip an executable `href` from a link and make it inert.
///
/// Returns `true` if the link was neutralized.
pub(crate) fn neutralize_link(
    doc: &mut Document,
    ctx: &mut MonitorContext,
    id: NodeId,
) -> Result<bool, DetectorError> {
    if !is_link(doc, id) {
        return Ok(false);
    }
    let Some(href) = doc.attribute(id, "href").map(str::to_string) else {
        return Ok(false);
    };
    if !ctx.rules().is_executable_uri(&href) {
        return Ok(false);
    }

    warn!("Blocked dangerous link target on {}: {}", id, href);
    doc.remove_attribute(id, "href")?;
    doc.set_attribute(id, "aria-disabled", "true")?;
    doc.set_attribute(id, "title", "Link blocked for security")?;
    let style = match doc.attribute(id, "style").map(str::trim) {
        Some(existing) if !existing.is_empty() => {
            format!("{}; {}", existing.trim_end_matches(';'), INERT_LINK_STYLE)
        }
        _ => INERT_LINK_STYLE.to_string(),
    };
    doc.set_attribute(id, "style", &style)?;
    ctx.record(doc, IncidentKind::DangerousHref, &href);
    Ok(true)
}

/// Remove every inline event-binding attribute from an element and return
/// the removed names. Recording is left to the caller.
pub(crate) fn strip_event_attributes(
    doc: &mut Document,
    ctx: &MonitorContext,
    id: NodeId,
) -> Result<Vec<String>, DetectorError> {
    let names: Vec<String> = doc
        .attributes(id)
        .iter()
        .filter(|a| ctx.rules().is_event_attribute(&a.name))
        .map(|a| a.name.clone())
        .collect();
    for name in &names {
        doc.remove_attribute(id, name)?;
    }
    Ok(names)
}

/// What [`inspect_script`] did with a script element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScriptVerdict {
    pub flagged_external: bool,
    pub removed_inline: bool,
}

/// Check a script's source origin and inline content.
///
/// A foreign, non-allow-listed `src` is recorded once per element and left
/// in place. Inline content matching a deny rule without an allow-listed
/// signature removes the element. Nothing is touched once that first
/// record has locked the page down.
pub(crate) fn inspect_script(
    doc: &mut Document,
    ctx: &mut MonitorContext,
    id: NodeId,
) -> Result<ScriptVerdict, DetectorError> {
    let mut verdict = ScriptVerdict::default();
    if doc.tag(id) != Some("script") {
        return Ok(verdict);
    }

    if let Some(src) = doc
        .attribute(id, "src")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
    {
        let trusted = match ctx.page_url().join(&src) {
            Ok(url) => {
                url.origin() == ctx.page_url().origin()
                    || ctx.rules().is_allowed(Candidate::ScriptSource(&url))
            }
            Err(_) => false,
        };
        if !trusted && ctx.mark_reported(id, IncidentKind::SuspiciousExternalScript) {
            warn!("Suspicious external script detected: {}", src);
            ctx.record(doc, IncidentKind::SuspiciousExternalScript, &src);
            verdict.flagged_external = true;
            if ctx.is_locked_down() {
                return Ok(verdict);
            }
        }
    }

    let content = doc.text_content(id);
    if !content.trim().is_empty() {
        let matched = ctx.rules().evaluate(&content).rule.map(|r| r.id.clone());
        if let Some(rule_id) = matched {
            warn!(
                "Blocked suspicious inline script (rule {}): {}...",
                rule_id,
                crate::security::truncate_details(&content, 100)
            );
            doc.remove_node(id)?;
            ctx.record(doc, IncidentKind::DangerousInlineScript, &content);
            verdict.removed_inline = true;
        }
    }

    Ok(verdict)
}
