//! Screening of content introduced after startup.
//!
//! The watcher consumes batches of [`MutationRecord`]s drained from the
//! document and re-applies the startup checks to whatever they introduced.
//! A batch is processed synchronously and in bounded time: no I/O, no
//! waiting.

use tracing::{debug, warn};

use super::{inspect_script, is_link, neutralize_link, strip_event_attributes};
use crate::document::{Document, MutationRecord, NodeId};
use crate::error::DetectorError;
use crate::monitor::MonitorContext;
use crate::security::IncidentKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub elements_scanned: usize,
    pub handlers_stripped: usize,
    pub links_blocked: usize,
    pub scripts_flagged: usize,
    pub scripts_removed: usize,
}

#[derive(Debug, Default)]
pub struct ChangeWatcher {
    batches: u64,
    records: u64,
}

impl ChangeWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches processed so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Number of mutation records processed so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn process_batch(
        &mut self,
        doc: &mut Document,
        ctx: &mut MonitorContext,
        batch: &[MutationRecord],
    ) -> Result<WatchReport, DetectorError> {
        self.batches += 1;
        let mut report = WatchReport::default();

        for record in batch {
            if ctx.is_locked_down() {
                break;
            }
            self.records += 1;
            match record {
                MutationRecord::ChildList { added, .. } => {
                    for &node in added {
                        if doc.is_connected(node) && doc.is_element(node) {
                            self.scan_subtree(doc, ctx, node, &mut report)?;
                        }
                    }
                }
                MutationRecord::Attributes { target, name, .. } => {
                    self.check_attribute(doc, ctx, *target, name, &mut report)?;
                }
            }
        }

        debug!("Processed mutation batch {}: {:?}", self.batches, report);
        Ok(report)
    }

    fn scan_subtree(
        &self,
        doc: &mut Document,
        ctx: &mut MonitorContext,
        root: NodeId,
        report: &mut WatchReport,
    ) -> Result<(), DetectorError> {
        for id in doc.subtree_elements(root) {
            if ctx.is_locked_down() {
                return Ok(());
            }
            // An earlier check in this subtree may have removed an ancestor.
            if !doc.is_connected(id) {
                continue;
            }
            report.elements_scanned += 1;

            for name in strip_event_attributes(doc, ctx, id)? {
                warn!("Removed inline event handler {} on {}", name, id);
                ctx.record(doc, IncidentKind::DynamicInlineHandler, &name);
                report.handlers_stripped += 1;
                if ctx.is_locked_down() {
                    return Ok(());
                }
            }
            if neutralize_link(doc, ctx, id)? {
                report.links_blocked += 1;
            }
            if ctx.is_locked_down() {
                return Ok(());
            }
            let verdict = inspect_script(doc, ctx, id)?;
            report.scripts_flagged += usize::from(verdict.flagged_external);
            report.scripts_removed += usize::from(verdict.removed_inline);
        }
        Ok(())
    }

    fn check_attribute(
        &self,
        doc: &mut Document,
        ctx: &mut MonitorContext,
        target: NodeId,
        name: &str,
        report: &mut WatchReport,
    ) -> Result<(), DetectorError> {
        // Removals, including the monitor's own, leave nothing to check.
        if !doc.is_connected(target) || !doc.has_attribute(target, name) {
            return Ok(());
        }

        if ctx.rules().is_event_attribute(name) {
            warn!("Inline event handler {} set on {}", name, target);
            doc.remove_attribute(target, name)?;
            ctx.record(doc, IncidentKind::DynamicInlineHandler, name);
            report.handlers_stripped += 1;
        } else if name == "href" && is_link(doc, target) {
            if neutralize_link(doc, ctx, target)? {
                report.links_blocked += 1;
            }
        } else if name == "src" {
            let verdict = inspect_script(doc, ctx, target)?;
            report.scripts_flagged += usize::from(verdict.flagged_external);
        }
        Ok(())
    }
}
