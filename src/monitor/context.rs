//! The explicit per-page context every detector works against.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::document::{Document, NodeId};
use crate::error::{DetectorError, GuardError};
use crate::security::{
    IncidentKind, IncidentLedger, LedgerOrigin, LedgerSink, PolicyEnforcer, PolicyState, RuleSet,
    SessionStorage, Transition,
};

/// Owns the rule table, the incident ledger and the response policy for one
/// page view.
///
/// Detectors borrow it mutably for the duration of a pass. All ledger
/// appends and policy transitions go through [`MonitorContext::record`].
#[derive(Debug)]
pub struct MonitorContext {
    rules: RuleSet,
    ledger: IncidentLedger,
    enforcer: PolicyEnforcer,
    page_url: Url,
    lockdown_notice: String,
    form_block_notice: String,
    flagged: HashSet<(NodeId, IncidentKind)>,
}

impl MonitorContext {
    pub fn new(config: &Config) -> Result<Self, GuardError> {
        Self::with_sink(config, Box::new(SessionStorage::default()))
    }

    pub fn with_sink(config: &Config, sink: Box<dyn LedgerSink>) -> Result<Self, GuardError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        Self::with_session(config, session_id, sink)
    }

    pub fn with_session(
        config: &Config,
        session_id: String,
        sink: Box<dyn LedgerSink>,
    ) -> Result<Self, GuardError> {
        let rules = RuleSet::from_config(&config.guard)?;
        let page_url =
            Url::parse(&config.page.url).map_err(|source| GuardError::InvalidPageUrl {
                url: config.page.url.clone(),
                source,
            })?;

        let origin = LedgerOrigin {
            session_id,
            origin_url: page_url.to_string(),
            agent_fingerprint: config.page.user_agent.clone(),
        };

        Ok(Self {
            rules,
            ledger: IncidentLedger::with_sink(origin, config.ledger.details_max_chars, sink),
            enforcer: PolicyEnforcer::new(config.guard.max_violations),
            page_url,
            lockdown_notice: config.guard.lockdown_notice.clone(),
            form_block_notice: config.guard.form_block_notice.clone(),
            flagged: HashSet::new(),
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Read-only view of the ledger.
    pub fn ledger(&self) -> &IncidentLedger {
        &self.ledger
    }

    pub fn state(&self) -> PolicyState {
        self.enforcer.state()
    }

    pub fn is_locked_down(&self) -> bool {
        self.enforcer.is_locked_down()
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }

    pub fn form_block_notice(&self) -> &str {
        &self.form_block_notice
    }

    /// Remember that `node` was reported for `kind`. Returns `false` if it
    /// already was, so findings that leave the element in place are only
    /// recorded once.
    pub fn mark_reported(&mut self, node: NodeId, kind: IncidentKind) -> bool {
        self.flagged.insert((node, kind))
    }

    /// Append an incident and let the policy react to it.
    ///
    /// Returns the incident's sequence number, or `None` once the session is
    /// locked down.
    pub fn record(&mut self, doc: &mut Document, kind: IncidentKind, details: &str) -> Option<u64> {
        if self.enforcer.is_locked_down() {
            debug!("Ignoring {} after lockdown", kind);
            return None;
        }

        let seq = self.ledger.append(kind, details).seq;
        match self.enforcer.on_incident(self.ledger.count()) {
            Transition::Lockdown => {
                if let Err(e) = doc.lock_down(&self.lockdown_notice) {
                    error!("Failed to apply lockdown to document: {}", e);
                }
            }
            Transition::Elevated | Transition::Unchanged => {}
        }
        Some(seq)
    }

    /// Run one detector pass behind an isolation boundary.
    ///
    /// Errors and panics are logged and swallowed so that one failing
    /// detector never disables the others. Nothing runs after lockdown.
    pub fn run_detector<T, F>(&mut self, doc: &mut Document, name: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut Document, &mut MonitorContext) -> Result<T, DetectorError>,
    {
        if self.is_locked_down() {
            debug!("Skipping detector {} during lockdown", name);
            return None;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| f(doc, self))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Detector {} failed: {}", name, e);
                None
            }
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Detector {} panicked: {}", name, msg);
                None
            }
        }
    }
}
