//! Screening of outgoing form submissions.
//!
//! Only forms present when the guard is attached are intercepted. A
//! submission is cancelled on the first field whose value matches a deny
//! rule; the remaining fields are not scanned.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::document::{Document, NodeId};
use crate::error::DetectorError;
use crate::host::Notifier;
use crate::monitor::MonitorContext;
use crate::security::IncidentKind;

/// Input types that never contribute a value to a submission.
const SKIPPED_INPUT_TYPES: &[&str] = &["submit", "button", "reset", "image", "file"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Default submission proceeds.
    Allowed,
    /// Cancelled because of the named field.
    Blocked { field: String },
    /// Cancelled because the page is locked down.
    LockedDown,
}

impl SubmissionOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SubmissionOutcome::Allowed)
    }
}

#[derive(Debug, Default, Clone)]
pub struct FormGuard {
    guarded: HashSet<NodeId>,
}

impl FormGuard {
    /// Attach to every form currently in the document.
    pub fn attach(doc: &Document) -> Self {
        let guarded: HashSet<NodeId> = doc.elements_by_tag("form").into_iter().collect();
        info!("Form guard attached to {} form(s)", guarded.len());
        Self { guarded }
    }

    pub fn is_guarded(&self, form: NodeId) -> bool {
        self.guarded.contains(&form)
    }

    pub fn guarded_count(&self) -> usize {
        self.guarded.len()
    }

    /// Screen a submission attempt of `form`.
    pub fn intercept(
        &self,
        doc: &mut Document,
        ctx: &mut MonitorContext,
        notifier: &dyn Notifier,
        form: NodeId,
    ) -> Result<SubmissionOutcome, DetectorError> {
        if ctx.is_locked_down() {
            return Ok(SubmissionOutcome::LockedDown);
        }
        if !self.is_guarded(form) {
            debug!("Form {} not guarded, submission passes through", form);
            return Ok(SubmissionOutcome::Allowed);
        }

        for (name, value) in form_fields(doc, form) {
            let matched = ctx.rules().evaluate(&value).rule.map(|r| r.id.clone());
            if let Some(rule_id) = matched {
                warn!(
                    "Blocked dangerous form submission: field {} matched rule {}",
                    name, rule_id
                );
                ctx.record(doc, IncidentKind::DangerousFormData, &name);
                notifier.alert(ctx.form_block_notice());
                return Ok(SubmissionOutcome::Blocked { field: name });
            }
        }

        Ok(SubmissionOutcome::Allowed)
    }
}

/// Named, enabled fields of a form in document order with the values a
/// browser would submit.
pub fn form_fields(doc: &Document, form: NodeId) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for id in doc.subtree_elements(form) {
        let Some(name) = doc.attribute(id, "name").filter(|n| !n.is_empty()) else {
            continue;
        };
        if doc.has_attribute(id, "disabled") {
            continue;
        }

        let value = match doc.tag(id) {
            Some("input") => {
                let kind = doc
                    .attribute(id, "type")
                    .unwrap_or("text")
                    .to_ascii_lowercase();
                if SKIPPED_INPUT_TYPES.contains(&kind.as_str()) {
                    continue;
                }
                if (kind == "checkbox" || kind == "radio") && !doc.has_attribute(id, "checked") {
                    continue;
                }
                doc.attribute(id, "value").unwrap_or_default().to_string()
            }
            Some("textarea") => doc.text_content(id),
            Some("select") => match selected_option(doc, id) {
                Some(value) => value,
                None => continue,
            },
            _ => continue,
        };
        fields.push((name.to_string(), value));
    }
    fields
}

fn selected_option(doc: &Document, select: NodeId) -> Option<String> {
    let options = doc
        .subtree_elements(select)
        .into_iter()
        .filter(|id| doc.tag(*id) == Some("option"))
        .collect::<Vec<_>>();
    let chosen = options
        .iter()
        .copied()
        .find(|id| doc.has_attribute(*id, "selected"))
        .or_else(|| options.first().copied())?;
    Some(
        doc.attribute(chosen, "value")
            .map(str::to_string)
            .unwrap_or_else(|| doc.text_content(chosen)),
    )
}
