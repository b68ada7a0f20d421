//! Intake of content-security-policy violation reports forwarded by the host.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::Document;
use crate::monitor::MonitorContext;
use crate::security::IncidentKind;

/// The subset of a browser's violation report the monitor keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CspViolation {
    #[serde(alias = "violatedDirective")]
    pub directive: String,
    #[serde(alias = "blockedURI", default)]
    pub blocked_uri: String,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub source_file: Option<String>,
}

/// Record a violation report. Returns the incident sequence number, or
/// `None` once the session is locked down.
pub fn record_csp_violation(
    doc: &mut Document,
    ctx: &mut MonitorContext,
    violation: &CspViolation,
) -> Option<u64> {
    warn!(
        "CSP violation: {} blocked {} ({}:{})",
        violation.directive,
        violation.blocked_uri,
        violation.source_file.as_deref().unwrap_or("-"),
        violation.line_number.unwrap_or_default()
    );
    ctx.record(doc, IncidentKind::CspViolation, &violation.directive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{setup, setup_with};

    #[test]
    fn violation_is_recorded_with_directive() {
        let (mut doc, mut ctx) = setup();
        let violation = CspViolation {
            directive: "script-src".to_string(),
            blocked_uri: "https://evil.io/x.js".to_string(),
            line_number: Some(12),
            source_file: None,
        };

        assert_eq!(record_csp_violation(&mut doc, &mut ctx, &violation), Some(1));
        let incident = &ctx.ledger().incidents()[0];
        assert_eq!(incident.kind, IncidentKind::CspViolation);
        assert_eq!(incident.details, "script-src");
    }

    #[test]
    fn parses_browser_report_fields() {
        let json = r#"{"violatedDirective":"img-src","blockedURI":"data:","lineNumber":3}"#;
        let violation: CspViolation = serde_json::from_str(json).unwrap();
        assert_eq!(violation.directive, "img-src");
        assert_eq!(violation.blocked_uri, "data:");
        assert_eq!(violation.line_number, Some(3));
        assert_eq!(violation.source_file, None);
    }

    #[test]
    fn ignored_after_lockdown() {
        let (mut doc, mut ctx) = setup_with(0);
        let violation = CspViolation {
            directive: "script-src".to_string(),
            blocked_uri: "inline".to_string(),
            line_number: None,
            source_file: None,
        };
        record_csp_violation(&mut doc, &mut ctx, &violation);
        assert!(ctx.is_locked_down());
        assert_eq!(record_csp_violation(&mut doc, &mut ctx, &violation), None);
    }
}
