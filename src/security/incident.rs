//! Incident records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of violation an [`Incident`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentKind {
    /// Link target uses a script-executable URI scheme.
    DangerousHref,
    /// Inline event binding present at startup.
    InlineHandler,
    /// Script loaded from a foreign origin outside the domain allow-list.
    SuspiciousExternalScript,
    /// Inline script matching a deny rule; the element was removed.
    DangerousInlineScript,
    /// Inline event binding introduced after startup.
    DynamicInlineHandler,
    /// Form field value matching a deny rule; the submission was cancelled.
    DangerousFormData,
    /// A runtime primitive no longer reports as native.
    GlobalTampering,
    /// An element shadows a reserved global identifier.
    DomClobbering,
    /// Content-security-policy violation reported by the host.
    CspViolation,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::DangerousHref => "dangerous-href",
            IncidentKind::InlineHandler => "inline-handler",
            IncidentKind::SuspiciousExternalScript => "suspicious-external-script",
            IncidentKind::DangerousInlineScript => "dangerous-inline-script",
            IncidentKind::DynamicInlineHandler => "dynamic-inline-handler",
            IncidentKind::DangerousFormData => "dangerous-form-data",
            IncidentKind::GlobalTampering => "global-tampering",
            IncidentKind::DomClobbering => "dom-clobbering",
            IncidentKind::CspViolation => "csp-violation",
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded detection. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// 1-based position in the session ledger.
    pub seq: u64,
    pub kind: IncidentKind,
    /// Offending value, truncated to the configured length.
    pub details: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub origin_url: String,
    pub agent_fingerprint: String,
}

/// Truncate on a character boundary.
pub fn truncate_details(details: &str, max_chars: usize) -> String {
    match details.char_indices().nth(max_chars) {
        Some((idx, _)) => details[..idx].to_string(),
        None => details.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_kebab_case() {
        let json = serde_json::to_string(&IncidentKind::SuspiciousExternalScript).unwrap();
        assert_eq!(json, "\"suspicious-external-script\"");
        assert_eq!(
            IncidentKind::DynamicInlineHandler.to_string(),
            "dynamic-inline-handler"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_details("abcdef", 3), "abc");
        assert_eq!(truncate_details("ab", 3), "ab");
        assert_eq!(truncate_details("ééé", 2), "éé");
    }
}
