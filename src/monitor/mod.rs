//! The running monitor: one tokio task that owns the document and the
//! [`MonitorContext`], fed by message passing.
//!
//! Architecture: host (any task) ←mpsc→ owning task ←interval→ health ticks
//!
//! Every ledger append and policy transition happens on the owning task, so
//! incidents are recorded in the order events arrive. The host never holds
//! the document directly; it sends changes and queries as closures.

mod context;

pub use context::MonitorContext;

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::detectors::{
    ChangeWatcher, CspViolation, FormGuard, HealthCheck, SubmissionOutcome, audit_document,
    record_csp_violation,
};
use crate::document::{Document, NodeId};
use crate::error::{GuardError, MonitorError};
use crate::host::{LogNotifier, Notifier, RuntimeProbe, StaticProbe};
use crate::security::{Incident, JsonlSink, LedgerSink, PolicyState, SessionStorage};

/// A change the host applies to the monitored document.
pub type HostChange = Box<dyn FnOnce(&mut Document) + Send>;

/// Read-only host access to the monitored document.
pub type HostQuery = Box<dyn FnOnce(&Document) + Send>;

/// Inputs to the owning task.
pub enum MonitorEvent {
    /// Apply a host change, then screen the mutation records it produced.
    Mutations(HostChange),
    Query(HostQuery),
    SubmitForm {
        form: NodeId,
        reply: oneshot::Sender<SubmissionOutcome>,
    },
    CspViolation(CspViolation),
    HealthTick,
    Snapshot(oneshot::Sender<MonitorSnapshot>),
    Shutdown,
}

/// Host collaborators handed to [`Monitor::start`].
pub struct MonitorHooks {
    pub notifier: Arc<dyn Notifier>,
    pub probe: Arc<dyn RuntimeProbe>,
    /// Overrides the configured ledger export.
    pub sink: Option<Box<dyn LedgerSink>>,
}

impl MonitorHooks {
    /// Log-only notices and a probe that reports every monitored primitive
    /// as native.
    pub fn from_config(config: &Config) -> Self {
        Self {
            notifier: Arc::new(LogNotifier),
            probe: Arc::new(StaticProbe::native(&config.guard.monitored_primitives)),
            sink: None,
        }
    }
}

/// Point-in-time view of a monitor's ledger and policy.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub session_id: String,
    pub state: PolicyState,
    pub count: u64,
    pub incidents: Vec<Incident>,
    pub interactive: bool,
}

/// Cloneable input side of a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl MonitorHandle {
    fn send(&self, event: MonitorEvent) -> Result<(), MonitorError> {
        self.tx.send(event).map_err(|_| MonitorError::Closed)
    }

    /// Apply a change to the document. Anything it introduces is screened
    /// before the next event is handled.
    pub fn mutate<F>(&self, change: F) -> Result<(), MonitorError>
    where
        F: FnOnce(&mut Document) + Send + 'static,
    {
        self.send(MonitorEvent::Mutations(Box::new(change)))
    }

    /// Read from the document on the owning task.
    pub async fn query<F, T>(&self, read: F) -> Result<T, MonitorError>
    where
        F: FnOnce(&Document) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorEvent::Query(Box::new(move |doc| {
            let _ = reply.send(read(doc));
        })))?;
        rx.await.map_err(|_| MonitorError::Closed)
    }

    /// Attempt to submit `form`. The returned outcome says whether the
    /// default submission may proceed.
    pub async fn submit_form(&self, form: NodeId) -> Result<SubmissionOutcome, MonitorError> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorEvent::SubmitForm { form, reply })?;
        rx.await.map_err(|_| MonitorError::Closed)
    }

    pub fn report_csp_violation(&self, violation: CspViolation) -> Result<(), MonitorError> {
        self.send(MonitorEvent::CspViolation(violation))
    }

    /// Run a health check now instead of waiting for the next tick.
    pub fn run_health_check(&self) -> Result<(), MonitorError> {
        self.send(MonitorEvent::HealthTick)
    }

    pub async fn snapshot(&self) -> Result<MonitorSnapshot, MonitorError> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorEvent::Snapshot(reply))?;
        rx.await.map_err(|_| MonitorError::Closed)
    }
}

/// A started monitor. Dropping it without [`Monitor::shutdown`] stops the
/// health-check ticker; the owning task keeps serving outstanding handles
/// and exits once the last one is dropped.
pub struct Monitor {
    handle: MonitorHandle,
    owner: JoinHandle<MonitorSnapshot>,
    ticker: JoinHandle<()>,
}

impl Monitor {
    /// Audit `document`, attach the form guard and start the owning task
    /// and the health-check ticker. Must be called inside a tokio runtime.
    pub fn start(
        config: &Config,
        mut document: Document,
        hooks: MonitorHooks,
    ) -> Result<Self, GuardError> {
        let health = HealthCheck::from_config(&config.guard)?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let sink: Box<dyn LedgerSink> = match hooks.sink {
            Some(sink) => sink,
            None => match config.ledger_export_path(&session_id) {
                Some(path) => Box::new(
                    JsonlSink::create(&path).map_err(|e| GuardError::LedgerExport(format!("{:#}", e)))?,
                ),
                None => Box::new(SessionStorage::default()),
            },
        };
        let mut ctx = MonitorContext::with_session(config, session_id, sink)?;

        // Records from building the page are not changes to screen.
        document.take_mutations();

        if let Some(report) = ctx.run_detector(&mut document, "static-audit", audit_document) {
            info!(
                "Startup audit: {} link(s) blocked, {} handler(s) stripped, {} script(s) flagged, {} removed",
                report.links_blocked,
                report.handlers_stripped,
                report.scripts_flagged,
                report.scripts_removed
            );
        }
        document.take_mutations();
        let forms = FormGuard::attach(&document);

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = MonitorHandle { tx };

        let period = health.interval();
        let tick_handle = handle.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tick_handle.run_health_check().is_err() {
                    break;
                }
            }
        });

        let task = OwnerTask {
            doc: document,
            ctx,
            watcher: ChangeWatcher::new(),
            forms,
            health,
            notifier: hooks.notifier,
            probe: hooks.probe,
        };
        let owner = tokio::spawn(task.run(rx));

        info!("Page monitor started (health check every {:?})", period);
        Ok(Self {
            handle,
            owner,
            ticker,
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Stop the ticker and the owning task and return the final snapshot.
    /// Events queued before the call are still handled.
    pub async fn shutdown(mut self) -> Result<MonitorSnapshot, MonitorError> {
        self.ticker.abort();
        // The owner may already be gone if every other sender was dropped.
        let _ = self.handle.send(MonitorEvent::Shutdown);
        let snapshot = (&mut self.owner).await?;
        info!(
            "Page monitor stopped with {} incident(s), state {}",
            snapshot.count, snapshot.state
        );
        Ok(snapshot)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

struct OwnerTask {
    doc: Document,
    ctx: MonitorContext,
    watcher: ChangeWatcher,
    forms: FormGuard,
    health: HealthCheck,
    notifier: Arc<dyn Notifier>,
    probe: Arc<dyn RuntimeProbe>,
}

impl OwnerTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<MonitorEvent>) -> MonitorSnapshot {
        while let Some(event) = rx.recv().await {
            if matches!(event, MonitorEvent::Shutdown) {
                break;
            }
            self.handle(event);
            // Whatever is still queued was caused by the monitor itself.
            self.doc.take_mutations();
        }
        self.snapshot()
    }

    fn handle(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Mutations(change) => {
                let doc = &mut self.doc;
                if panic::catch_unwind(AssertUnwindSafe(|| change(doc))).is_err() {
                    error!("Host change panicked; screening what it left behind");
                }
                let batch = self.doc.take_mutations();
                if batch.is_empty() {
                    return;
                }
                if self.ctx.is_locked_down() {
                    debug!("Dropping {} mutation record(s) during lockdown", batch.len());
                    return;
                }
                let watcher = &mut self.watcher;
                self.ctx
                    .run_detector(&mut self.doc, "change-watcher", |doc, ctx| {
                        watcher.process_batch(doc, ctx, &batch)
                    });
            }
            MonitorEvent::Query(read) => read(&self.doc),
            MonitorEvent::SubmitForm { form, reply } => {
                let forms = &self.forms;
                let notifier = self.notifier.as_ref();
                let outcome = self
                    .ctx
                    .run_detector(&mut self.doc, "form-guard", |doc, ctx| {
                        forms.intercept(doc, ctx, notifier, form)
                    })
                    .unwrap_or_else(|| {
                        if self.ctx.is_locked_down() {
                            SubmissionOutcome::LockedDown
                        } else {
                            SubmissionOutcome::Allowed
                        }
                    });
                let _ = reply.send(outcome);
            }
            MonitorEvent::CspViolation(violation) => {
                self.ctx.run_detector(&mut self.doc, "csp-intake", |doc, ctx| {
                    Ok(record_csp_violation(doc, ctx, &violation))
                });
            }
            MonitorEvent::HealthTick => {
                let health = &self.health;
                let probe = self.probe.as_ref();
                self.ctx
                    .run_detector(&mut self.doc, "health-check", |doc, ctx| {
                        health.run(doc, ctx, probe)
                    });
            }
            MonitorEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            MonitorEvent::Shutdown => {}
        }
    }

    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            session_id: self.ctx.ledger().session_id().to_string(),
            state: self.ctx.state(),
            count: self.ctx.ledger().count(),
            incidents: self.ctx.ledger().incidents().to_vec(),
            interactive: self.doc.is_interactive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MockNotifier, MockRuntimeProbe};
    use crate::security::{IncidentKind, read_ledger_export, verify_ledger_chain};
    use tempfile::TempDir;

    fn config(max_violations: u64) -> Config {
        let mut config = Config::default();
        config.page.url = "https://shop.example.com/".to_string();
        config.guard.max_violations = max_violations;
        config
    }

    fn quiet_hooks() -> MonitorHooks {
        let mut notifier = MockNotifier::new();
        notifier.expect_alert().return_const(());
        MonitorHooks {
            notifier: Arc::new(notifier),
            probe: Arc::new(StaticProbe::default()),
            sink: None,
        }
    }

    fn inject_handler(handle: &MonitorHandle) {
        handle
            .mutate(|doc| {
                let body = doc.body();
                doc.append_element(body, "div", &[("onclick", "x()")]).unwrap();
            })
            .unwrap();
    }

    #[tokio::test]
    async fn startup_audit_runs_before_first_event() {
        let mut doc = Document::new();
        let body = doc.body();
        let link = doc
            .append_element(body, "a", &[("href", "javascript:alert(1)")])
            .unwrap();

        let monitor = Monitor::start(&config(10), doc, quiet_hooks()).unwrap();
        let handle = monitor.handle();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.state, PolicyState::Elevated);
        assert!(!handle.query(move |doc| doc.is_activatable(link)).await.unwrap());

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn ten_incidents_stay_below_lockdown() {
        let monitor = Monitor::start(&config(10), Document::new(), quiet_hooks()).unwrap();
        let handle = monitor.handle();

        for _ in 0..10 {
            inject_handler(&handle);
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.count, 10);
        assert_eq!(snapshot.state, PolicyState::Elevated);
        assert!(snapshot.interactive);
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn eleventh_incident_locks_down() {
        let monitor = Monitor::start(&config(10), Document::new(), quiet_hooks()).unwrap();
        let handle = monitor.handle();

        for _ in 0..12 {
            inject_handler(&handle);
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PolicyState::Lockdown);
        assert_eq!(snapshot.count, 11);
        assert!(!snapshot.interactive);

        let notice = handle
            .query(|doc| doc.text_content(doc.body()))
            .await
            .unwrap();
        assert!(notice.contains("Security lockdown activated"));
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn dynamic_injection_is_stripped() {
        let monitor = Monitor::start(&config(10), Document::new(), quiet_hooks()).unwrap();
        let handle = monitor.handle();

        handle
            .mutate(|doc| {
                let body = doc.body();
                let widget = doc.append_element(body, "div", &[]).unwrap();
                doc.set_attribute(widget, "onmouseover", "steal()").unwrap();
            })
            .unwrap();

        let stripped = handle
            .query(|doc| {
                doc.elements_by_tag("div")
                    .iter()
                    .all(|id| !doc.has_attribute(*id, "onmouseover"))
            })
            .await
            .unwrap();
        assert!(stripped);

        let snapshot = monitor.shutdown().await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.incidents[0].kind, IncidentKind::DynamicInlineHandler);
    }

    #[tokio::test]
    async fn dangerous_form_submission_is_cancelled_once() {
        let mut doc = Document::new();
        let body = doc.body();
        let form = doc.append_element(body, "form", &[]).unwrap();
        doc.append_element(form, "input", &[("name", "comment"), ("value", "javascript:alert(1)")])
            .unwrap();

        let mut notifier = MockNotifier::new();
        notifier.expect_alert().times(1).return_const(());
        let hooks = MonitorHooks {
            notifier: Arc::new(notifier),
            probe: Arc::new(StaticProbe::default()),
            sink: None,
        };

        let monitor = Monitor::start(&config(10), doc, hooks).unwrap();
        let outcome = monitor.handle().submit_form(form).await.unwrap();
        assert_eq!(
            outcome,
            SubmissionOutcome::Blocked {
                field: "comment".to_string()
            }
        );

        let snapshot = monitor.shutdown().await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.incidents[0].kind, IncidentKind::DangerousFormData);
    }

    #[tokio::test]
    async fn health_tick_and_csp_reports_are_recorded_in_order() {
        let mut probe = MockRuntimeProbe::new();
        probe.expect_source_of().returning(|name| {
            if name == "setTimeout" {
                Some("function(f) { f(); }".to_string())
            } else {
                Some(format!("function {}() {{ [native code] }}", name))
            }
        });
        let hooks = MonitorHooks {
            notifier: Arc::new(LogNotifier),
            probe: Arc::new(probe),
            sink: None,
        };

        let monitor = Monitor::start(&config(10), Document::new(), hooks).unwrap();
        let handle = monitor.handle();
        handle
            .report_csp_violation(CspViolation {
                directive: "script-src".to_string(),
                blocked_uri: "inline".to_string(),
                line_number: None,
                source_file: None,
            })
            .unwrap();
        handle.run_health_check().unwrap();

        let snapshot = monitor.shutdown().await.unwrap();
        let kinds: Vec<_> = snapshot.incidents.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IncidentKind::CspViolation, IncidentKind::GlobalTampering]);
    }

    #[tokio::test]
    async fn shutdown_closes_every_handle() {
        let monitor = Monitor::start(&config(10), Document::new(), quiet_hooks()).unwrap();
        let handle = monitor.handle();

        monitor.shutdown().await.unwrap();

        assert!(matches!(handle.snapshot().await, Err(MonitorError::Closed)));
        assert!(matches!(handle.run_health_check(), Err(MonitorError::Closed)));
    }

    #[tokio::test]
    async fn zero_health_interval_is_rejected_at_start() {
        let mut config = config(10);
        config.guard.health_check_interval_ms = 0;

        let result = Monitor::start(&config, Document::new(), quiet_hooks());
        assert!(matches!(result, Err(GuardError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn dropping_monitor_stops_health_ticks() {
        let mut config = config(100);
        config.guard.health_check_interval_ms = 50;
        let hooks = || MonitorHooks {
            notifier: Arc::new(LogNotifier),
            probe: Arc::new(StaticProbe::default().with_source("eval", "function(c) {}")),
            sink: None,
        };

        let running = Monitor::start(&config, Document::new(), hooks()).unwrap();
        let dropped = Monitor::start(&config, Document::new(), hooks()).unwrap();
        let orphan = dropped.handle();
        drop(dropped);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let ticking = running.handle().snapshot().await.unwrap();
        assert!(ticking.count > 0);
        let stopped = orphan.snapshot().await.unwrap();
        assert_eq!(stopped.count, 0);

        running.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn configured_export_is_hash_chained() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(10);
        config.ledger.export_path = Some(
            tmp.path()
                .join("{session}.jsonl")
                .to_string_lossy()
                .into_owned(),
        );

        let monitor = Monitor::start(&config, Document::new(), quiet_hooks()).unwrap();
        let handle = monitor.handle();
        inject_handler(&handle);
        inject_handler(&handle);
        let snapshot = monitor.shutdown().await.unwrap();

        let path = tmp.path().join(format!("{}.jsonl", snapshot.session_id));
        let records = read_ledger_export(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].incident.seq, 2);
        assert!(verify_ledger_chain(&path).unwrap().is_empty());
    }
}
