//! PageGuard - a client-side content-integrity monitor
//!
//! This crate watches a page's document for injected or dangerous content
//! and responds in escalating stages:
//! - Static audit of the document at startup (links, inline handlers, scripts)
//! - Screening of every later change through mutation records
//! - Form submission guard against dangerous field values
//! - Periodic health check for tampered runtime primitives and clobbering
//! - Append-only incident ledger with optional hash-chained export
//! - Lockdown of the page once the incident count passes a threshold

pub mod cli;
pub mod config;
pub mod detectors;
pub mod document;
pub mod error;
pub mod host;
pub mod monitor;
pub mod paths;
pub mod security;

pub use config::Config;
pub use document::{Document, NodeId};
pub use error::{DetectorError, DocumentError, GuardError, MonitorError};
pub use monitor::{Monitor, MonitorContext, MonitorHandle, MonitorHooks, MonitorSnapshot};
