//! Graduated response policy.
//!
//! # States
//!
//! 1. [`Normal`](PolicyState::Normal): no incidents yet.
//! 2. [`Elevated`](PolicyState::Elevated): at least one incident. Logging
//!    only; behavior is unchanged.
//! 3. [`Lockdown`](PolicyState::Lockdown): the incident count exceeded
//!    `max_violations`. Terminal for the session: the page is made
//!    non-interactive and no detector runs again.
//!
//! The enforcer is owned by the monitor context and sees every append; it
//! is the only place the state changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyState {
    Normal,
    Elevated,
    Lockdown,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyState::Normal => "normal",
            PolicyState::Elevated => "elevated",
            PolicyState::Lockdown => "lockdown",
        };
        f.write_str(s)
    }
}

/// State change caused by a single incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Elevated,
    /// Entered lockdown. Returned exactly once per session.
    Lockdown,
}

#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    state: PolicyState,
    max_violations: u64,
}

impl PolicyEnforcer {
    pub fn new(max_violations: u64) -> Self {
        Self {
            state: PolicyState::Normal,
            max_violations,
        }
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn max_violations(&self) -> u64 {
        self.max_violations
    }

    pub fn is_locked_down(&self) -> bool {
        self.state == PolicyState::Lockdown
    }

    /// Feed the ledger's running count after an append.
    pub fn on_incident(&mut self, count: u64) -> Transition {
        match self.state {
            PolicyState::Lockdown => Transition::Unchanged,
            _ if count > self.max_violations => {
                error!(
                    "Too many violations detected ({} > {}), entering lockdown mode",
                    count, self.max_violations
                );
                self.state = PolicyState::Lockdown;
                Transition::Lockdown
            }
            PolicyState::Normal if count > 0 => {
                warn!("Security posture elevated after first violation");
                self.state = PolicyState::Elevated;
                Transition::Elevated
            }
            _ => Transition::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_incident_elevates() {
        let mut enforcer = PolicyEnforcer::new(10);
        assert_eq!(enforcer.state(), PolicyState::Normal);
        assert_eq!(enforcer.on_incident(1), Transition::Elevated);
        assert_eq!(enforcer.state(), PolicyState::Elevated);
        assert_eq!(enforcer.on_incident(2), Transition::Unchanged);
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut enforcer = PolicyEnforcer::new(10);
        for count in 1..=10 {
            enforcer.on_incident(count);
        }
        assert_eq!(enforcer.state(), PolicyState::Elevated);

        assert_eq!(enforcer.on_incident(11), Transition::Lockdown);
        assert!(enforcer.is_locked_down());
    }

    #[test]
    fn lockdown_happens_once_and_sticks() {
        let mut enforcer = PolicyEnforcer::new(0);
        assert_eq!(enforcer.on_incident(1), Transition::Lockdown);
        assert_eq!(enforcer.on_incident(2), Transition::Unchanged);
        assert_eq!(enforcer.on_incident(0), Transition::Unchanged);
        assert_eq!(enforcer.state(), PolicyState::Lockdown);
    }
}
