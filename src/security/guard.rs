//! # PageGuard Security Module
//!
//! Front door for the detection core. Every rule, ledger and policy type is
//! re-exported here.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  guard.rs (you are here)                         │
//! │                  Public API facade                               │
//! ├──────────────────┬──────────────────────┬────────────────────────┤
//! │  rules.rs        │  ledger.rs           │  policy.rs             │
//! │  Deny table,     │  Append-only record, │  Normal → Elevated →   │
//! │  allow-list,     │  running count,      │  Lockdown state        │
//! │  URI + attribute │  hash-chained JSONL  │  machine               │
//! │  heuristics      │  export              │                        │
//! ├──────────────────┴──────────────────────┴────────────────────────┤
//! │  incident.rs: incident kinds and records                         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! 1. **Defense in depth**: the monitor runs inside the page it protects.
//!    It cannot stop an attacker who controls the delivery pipeline and
//!    does not rely on its rules being secret.
//!
//! 2. **Allow-list precedence**: an allow-list match always overrides a
//!    deny match for the same candidate.
//!
//! 3. **Append-only**: incidents are never edited or removed during a
//!    session; the counter never decreases.
//!
//! 4. **Fail-safe lockdown**: once the count exceeds the threshold the page
//!    is frozen and the monitor itself stops touching the document.
//!
//! ## Threat Model
//!
//! | Threat | Defense Layer |
//! |--------|--------------|
//! | `javascript:` link targets | Static audit + href attribute watch |
//! | Inline `on*` handlers | Static audit + change watcher |
//! | Third-party script from unknown host | Domain allow-list |
//! | Injected inline script | Deny rules, element removal |
//! | Payloads in form fields | Form guard |
//! | Patched `eval`/`setTimeout` | Health check (advisory) |
//! | `id="location"` shadowing globals | Health check clobbering scan |
//! | Sustained attack | Lockdown |

// ── Rules ───────────────────────────────────────────────────────────

pub use super::rules::{
    AllowListEntry, Candidate, Evaluation, RuleCategory, RuleSet, SecurityRule, Severity,
};

// ── Incidents & Ledger ──────────────────────────────────────────────

pub use super::incident::{Incident, IncidentKind, truncate_details};
pub use super::ledger::{
    GENESIS_HASH, IncidentLedger, JsonlSink, LedgerOrigin, LedgerRecord, LedgerSink,
    SessionStorage, read_ledger_export, verify_ledger_chain,
};

// ── Response Policy ─────────────────────────────────────────────────

pub use super::policy::{PolicyEnforcer, PolicyState, Transition};
