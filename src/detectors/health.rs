//! Periodic probe for tampered runtime primitives and identifier clobbering.

use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::document::Document;
use crate::error::{DetectorError, GuardError};
use crate::host::RuntimeProbe;
use crate::monitor::MonitorContext;
use crate::security::IncidentKind;

/// Marker present in the source rendering of a platform-provided callable.
const NATIVE_MARKER: &str = "native code";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Primitives whose source no longer reports as native.
    pub tampered: Vec<String>,
    /// Reserved identifiers shadowed by page elements.
    pub clobbered: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.tampered.is_empty() && self.clobbered.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    interval: Duration,
    primitives: Vec<String>,
    reserved: Vec<String>,
}

impl HealthCheck {
    pub fn from_config(config: &GuardConfig) -> Result<Self, GuardError> {
        if config.health_check_interval_ms == 0 {
            return Err(GuardError::InvalidConfig(
                "health_check_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            interval: Duration::from_millis(config.health_check_interval_ms),
            primitives: config.monitored_primitives.clone(),
            reserved: config.reserved_identifiers.clone(),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one check. Findings are advisory and re-reported on every run
    /// for as long as they persist.
    pub fn run(
        &self,
        doc: &mut Document,
        ctx: &mut MonitorContext,
        probe: &dyn RuntimeProbe,
    ) -> Result<HealthReport, DetectorError> {
        let mut report = HealthReport::default();

        for name in &self.primitives {
            if ctx.is_locked_down() {
                return Ok(report);
            }
            // An absent primitive is not evidence of tampering.
            let Some(source) = probe.source_of(name) else {
                debug!("Runtime primitive {} not available", name);
                continue;
            };
            if !source.contains(NATIVE_MARKER) {
                warn!("Global function tampering detected: {}", name);
                ctx.record(doc, IncidentKind::GlobalTampering, name);
                report.tampered.push(name.clone());
            }
        }

        for name in &self.reserved {
            if ctx.is_locked_down() {
                return Ok(report);
            }
            let shadows = doc.elements_named(name);
            if !shadows.is_empty() {
                warn!(
                    "DOM clobbering detected: {} element(s) named {}",
                    shadows.len(),
                    name
                );
                ctx.record(doc, IncidentKind::DomClobbering, name);
                report.clobbered.push(name.clone());
            }
        }

        debug!("Health check finished: {:?}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::detectors::test_support::{setup, setup_with};
    use crate::host::{MockRuntimeProbe, StaticProbe};

    fn check() -> HealthCheck {
        HealthCheck::from_config(&Config::default().guard).unwrap()
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = Config::default();
        config.guard.health_check_interval_ms = 0;
        let err = HealthCheck::from_config(&config.guard).unwrap_err();
        assert!(matches!(err, GuardError::InvalidConfig(_)));
    }

    #[test]
    fn native_primitives_and_clean_document_are_healthy() {
        let (mut doc, mut ctx) = setup();
        let health = check();
        let probe = StaticProbe::native(&Config::default().guard.monitored_primitives);

        let report = health.run(&mut doc, &mut ctx, &probe).unwrap();

        assert!(report.is_healthy());
        assert!(ctx.ledger().is_empty());
        assert_eq!(health.interval(), Duration::from_secs(30));
    }

    #[test]
    fn overridden_primitive_is_reported() {
        let (mut doc, mut ctx) = setup();
        let probe = StaticProbe::native(&Config::default().guard.monitored_primitives)
            .with_source("eval", "function(code) { send(code); }");

        let report = check().run(&mut doc, &mut ctx, &probe).unwrap();

        assert_eq!(report.tampered, vec!["eval".to_string()]);
        let incident = &ctx.ledger().incidents()[0];
        assert_eq!(incident.kind, IncidentKind::GlobalTampering);
        assert_eq!(incident.details, "eval");
    }

    #[test]
    fn missing_primitive_is_not_tampering() {
        let (mut doc, mut ctx) = setup();
        let mut probe = MockRuntimeProbe::new();
        probe.expect_source_of().times(4).returning(|_| None);

        let report = check().run(&mut doc, &mut ctx, &probe).unwrap();
        assert!(report.tampered.is_empty());
    }

    #[test]
    fn clobbering_elements_are_reported_every_run() {
        let (mut doc, mut ctx) = setup();
        doc.append_element(doc.body(), "form", &[("name", "location")])
            .unwrap();
        doc.append_element(doc.body(), "img", &[("id", "document")])
            .unwrap();
        let probe = StaticProbe::native(&Config::default().guard.monitored_primitives);
        let health = check();

        let first = health.run(&mut doc, &mut ctx, &probe).unwrap();
        assert_eq!(first.clobbered, vec!["document".to_string(), "location".to_string()]);

        health.run(&mut doc, &mut ctx, &probe).unwrap();
        assert_eq!(ctx.ledger().count_of(IncidentKind::DomClobbering), 4);
    }

    #[test]
    fn stops_once_locked_down() {
        let (mut doc, mut ctx) = setup_with(0);
        let mut probe = MockRuntimeProbe::new();
        probe
            .expect_source_of()
            .times(1)
            .returning(|_| Some("function() {}".to_string()));

        let report = check().run(&mut doc, &mut ctx, &probe).unwrap();

        assert!(ctx.is_locked_down());
        assert_eq!(report.tampered.len(), 1);
        assert_eq!(ctx.ledger().count(), 1);
    }
}
