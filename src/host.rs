//! Collaborators supplied by the embedding page.
//!
//! The monitor never talks to a real browser. Everything it needs from the
//! host beyond the [`Document`](crate::document::Document) goes through
//! these traits.

use std::collections::HashMap;
use tracing::warn;

/// Shows a single blocking, user-visible notice.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// Notifier that only logs. Used when the host supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        warn!("User notice: {}", message);
    }
}

/// Introspection of the page's global runtime primitives.
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeProbe: Send + Sync {
    /// Source rendering of a global callable, or `None` when the global is
    /// absent or not callable.
    fn source_of(&self, name: &str) -> Option<String>;
}

/// Probe backed by a fixed table of source renderings.
#[derive(Debug, Default, Clone)]
pub struct StaticProbe {
    sources: HashMap<String, String>,
}

impl StaticProbe {
    /// A probe where every listed primitive reports as a platform native.
    pub fn native(names: &[String]) -> Self {
        Self {
            sources: names
                .iter()
                .map(|n| (n.clone(), format!("function {}() {{ [native code] }}", n)))
                .collect(),
        }
    }

    pub fn with_source(mut self, name: &str, source: &str) -> Self {
        self.sources.insert(name.to_string(), source.to_string());
        self
    }
}

impl RuntimeProbe for StaticProbe {
    fn source_of(&self, name: &str) -> Option<String> {
        self.sources.get(name).cloned()
    }
}
