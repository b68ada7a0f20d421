//! One-shot audit of the document as it stands at startup.

use tracing::{debug, warn};

use super::{inspect_script, neutralize_link, strip_event_attributes};
use crate::document::Document;
use crate::error::DetectorError;
use crate::monitor::MonitorContext;
use crate::security::IncidentKind;

/// Counts of what a pass changed or flagged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub links_blocked: usize,
    pub handlers_stripped: usize,
    pub scripts_flagged: usize,
    pub scripts_removed: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Audit every connected element: links, inline event bindings, scripts.
///
/// Running it again without intervening changes records nothing new:
/// offending attributes and scripts are gone, and flagged external scripts
/// are remembered by the context.
pub fn audit_document(
    doc: &mut Document,
    ctx: &mut MonitorContext,
) -> Result<AuditReport, DetectorError> {
    let mut report = AuditReport::default();

    for id in doc.elements() {
        if ctx.is_locked_down() {
            return Ok(report);
        }
        if neutralize_link(doc, ctx, id)? {
            report.links_blocked += 1;
        }
    }

    for id in doc.elements() {
        if ctx.is_locked_down() {
            return Ok(report);
        }
        let stripped = strip_event_attributes(doc, ctx, id)?;
        if !stripped.is_empty() {
            let names = stripped.join(",");
            warn!("Blocked inline event handler(s) {} on {}", names, id);
            ctx.record(doc, IncidentKind::InlineHandler, &names);
            report.handlers_stripped += stripped.len();
        }
    }

    for id in doc.elements_by_tag("script") {
        if ctx.is_locked_down() {
            return Ok(report);
        }
        let verdict = inspect_script(doc, ctx, id)?;
        report.scripts_flagged += usize::from(verdict.flagged_external);
        report.scripts_removed += usize::from(verdict.removed_inline);
    }

    debug!("Static audit finished: {:?}", report);
    Ok(report)
}
