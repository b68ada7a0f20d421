//! Error types shared across the monitor.

use thiserror::Error;

use crate::document::NodeId;

/// Errors raised while constructing the monitor from configuration.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid pattern for rule `{id}`: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid page url `{url}`: {source}")]
    InvalidPageUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot open ledger export: {0}")]
    LedgerExport(String),
}

/// Errors raised by the document model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0} already has a parent")]
    AlreadyAttached(NodeId),

    #[error("cannot append {child} to its own descendant {parent}")]
    Cycle { parent: NodeId, child: NodeId },
}

/// A failure inside a single detector pass.
///
/// Caught at the detector boundary by
/// [`MonitorContext::run_detector`](crate::monitor::MonitorContext::run_detector);
/// it never disables other detectors.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("{0}")]
    Internal(String),
}

/// Errors surfaced to callers of a running [`Monitor`](crate::monitor::Monitor).
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor task has shut down")]
    Closed,

    #[error("monitor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
