//! Detection rules, incident ledger and response policy.
//!
//! See [`guard`] for the module overview and the public API surface.

mod guard;
mod incident;
mod ledger;
mod policy;
mod rules;

// The guard.rs facade controls the entire public API surface.
pub use self::guard::*;
