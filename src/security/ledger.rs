//! Append-only incident ledger.
//!
//! The ledger is the single record of every violation seen during one page
//! view. Incidents are kept in insertion order next to a running counter
//! that only ever grows. Nothing outside the monitor can mutate it; callers
//! get a read-only view.
//!
//! Every append is also serialized to a [`LedgerSink`], the ephemeral
//! per-session storage. The default [`SessionStorage`] keeps the lines in
//! memory; [`JsonlSink`] writes them to a file for post-hoc inspection.
//!
//! # Export format
//!
//! One JSON object per line (JSONL). Each line is an [`Incident`] plus:
//!
//! | Field | Description |
//! |-------|-------------|
//! | `session_id` | Page-view identifier (UUID v4) |
//! | `prev_entry_sha256` | SHA-256 of the previous JSONL line (chain link) |
//!
//! The first line links to `000...000` (64 zeros). Editing or deleting a
//! line breaks the chain at the following entry, which
//! [`verify_ledger_chain`] reports.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::incident::{Incident, IncidentKind, truncate_details};

/// The hash used for the first entry in the chain (no predecessor).
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Session-scoped storage that receives each serialized ledger line.
pub trait LedgerSink: Send + fmt::Debug {
    fn append_line(&mut self, line: &str) -> std::io::Result<()>;
}

/// In-memory session storage. Discarded with the page view.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    lines: Vec<String>,
}

impl SessionStorage {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl LedgerSink for SessionStorage {
    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// JSONL file export, one file per session.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create (or truncate) the export file, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::File::create(&path)
            .with_context(|| format!("Failed to create ledger export {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerSink for JsonlSink {
    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

/// One exported ledger line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub session_id: String,
    pub prev_entry_sha256: String,
    #[serde(flatten)]
    pub incident: Incident,
}

/// Who is recording, stamped on every incident.
#[derive(Debug, Clone)]
pub struct LedgerOrigin {
    pub session_id: String,
    pub origin_url: String,
    pub agent_fingerprint: String,
}

#[derive(Debug)]
pub struct IncidentLedger {
    origin: LedgerOrigin,
    details_max_chars: usize,
    incidents: Vec<Incident>,
    count: u64,
    last_hash: String,
    sink: Box<dyn LedgerSink>,
}

impl IncidentLedger {
    pub fn new(origin: LedgerOrigin, details_max_chars: usize) -> Self {
        Self::with_sink(origin, details_max_chars, Box::new(SessionStorage::default()))
    }

    pub fn with_sink(
        origin: LedgerOrigin,
        details_max_chars: usize,
        sink: Box<dyn LedgerSink>,
    ) -> Self {
        Self {
            origin,
            details_max_chars,
            incidents: Vec::new(),
            count: 0,
            last_hash: GENESIS_HASH.to_string(),
            sink,
        }
    }

    /// Record a violation and return the stored incident.
    ///
    /// The in-memory append always succeeds. A sink failure is logged and
    /// leaves the export chain where it was; the running page never depends
    /// on the export.
    pub fn append(&mut self, kind: IncidentKind, details: &str) -> &Incident {
        self.count += 1;
        let incident = Incident {
            seq: self.count,
            kind,
            details: truncate_details(details, self.details_max_chars),
            timestamp: chrono::Utc::now().to_rfc3339(),
            origin_url: self.origin.origin_url.clone(),
            agent_fingerprint: self.origin.agent_fingerprint.clone(),
        };

        let record = LedgerRecord {
            session_id: self.origin.session_id.clone(),
            prev_entry_sha256: self.last_hash.clone(),
            incident: incident.clone(),
        };
        match serde_json::to_string(&record) {
            Ok(line) => match self.sink.append_line(&line) {
                Ok(()) => self.last_hash = sha256_hex(line.as_bytes()),
                Err(e) => warn!("Failed to persist incident {}: {}", incident.seq, e),
            },
            Err(e) => warn!("Failed to serialize incident {}: {}", incident.seq, e),
        }

        self.incidents.push(incident);
        &self.incidents[self.incidents.len() - 1]
    }

    /// Number of incidents recorded this session. Never decreases.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn session_id(&self) -> &str {
        &self.origin.session_id
    }

    pub fn count_of(&self, kind: IncidentKind) -> usize {
        self.incidents.iter().filter(|i| i.kind == kind).count()
    }
}

/// Read and parse all records from an exported ledger.
///
/// Corrupted lines are skipped (not fatal). Returns an empty vector if the
/// file does not exist.
pub fn read_ledger_export(path: &Path) -> Result<Vec<LedgerRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).context("Failed to read ledger export")?;
    Ok(content
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<LedgerRecord>(line).ok())
        .collect())
}

/// Verify the hash chain of an exported ledger.
///
/// Returns the indices of lines whose `prev_entry_sha256` does not match the
/// SHA-256 of the preceding line. Corrupted (non-JSON) lines are reported as
/// broken. An empty result means the chain is intact.
pub fn verify_ledger_chain(path: &Path) -> Result<Vec<usize>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).context("Failed to read ledger export")?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();

    let mut broken = Vec::new();
    let mut expected = GENESIS_HASH.to_string();
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<LedgerRecord>(line) {
            Ok(record) if record.prev_entry_sha256 == expected => {}
            _ => broken.push(i),
        }
        expected = sha256_hex(line.as_bytes());
    }

    Ok(broken)
}

/// Compute hex-encoded SHA-256.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> LedgerOrigin {
        LedgerOrigin {
            session_id: "session-1".to_string(),
            origin_url: "https://example.com/".to_string(),
            agent_fingerprint: "test-agent".to_string(),
        }
    }

    #[derive(Debug)]
    struct BrokenSink;

    impl LedgerSink for BrokenSink {
        fn append_line(&mut self, _line: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn appends_in_order_with_monotonic_count() {
        let mut ledger = IncidentLedger::new(origin(), 100);
        let mut last = ledger.count();
        for kind in [
            IncidentKind::DangerousHref,
            IncidentKind::InlineHandler,
            IncidentKind::DomClobbering,
        ] {
            ledger.append(kind, "x");
            assert!(ledger.count() > last);
            last = ledger.count();
        }

        let seqs: Vec<u64> = ledger.incidents().iter().map(|i| i.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(ledger.incidents()[2].kind, IncidentKind::DomClobbering);
        assert_eq!(ledger.count_of(IncidentKind::InlineHandler), 1);
    }

    #[test]
    fn details_are_truncated() {
        let mut ledger = IncidentLedger::new(origin(), 10);
        let incident = ledger.append(IncidentKind::DangerousInlineScript, &"a".repeat(50));
        assert_eq!(incident.details.len(), 10);
        assert_eq!(incident.origin_url, "https://example.com/");
        assert_eq!(incident.agent_fingerprint, "test-agent");
    }

    #[test]
    fn sink_failure_keeps_in_memory_record() {
        let mut ledger = IncidentLedger::with_sink(origin(), 100, Box::new(BrokenSink));
        ledger.append(IncidentKind::CspViolation, "script-src");
        assert_eq!(ledger.count(), 1);
        assert_eq!(ledger.incidents().len(), 1);
    }

    #[test]
    fn export_chain_integrity() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledgers").join("s.jsonl");
        let sink = JsonlSink::create(&path).unwrap();
        let mut ledger = IncidentLedger::with_sink(origin(), 100, Box::new(sink));

        for i in 0..5 {
            ledger.append(IncidentKind::GlobalTampering, &format!("eval-{}", i));
        }

        let records = read_ledger_export(&path).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].prev_entry_sha256, GENESIS_HASH);
        assert_eq!(records[4].incident.details, "eval-4");
        assert_eq!(records[4].session_id, "session-1");

        let broken = verify_ledger_chain(&path).unwrap();
        assert!(broken.is_empty(), "Chain should be intact: {:?}", broken);
    }

    #[test]
    fn edited_line_breaks_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s.jsonl");
        let sink = JsonlSink::create(&path).unwrap();
        let mut ledger = IncidentLedger::with_sink(origin(), 100, Box::new(sink));
        for i in 0..3 {
            ledger.append(IncidentKind::DangerousFormData, &format!("field_{}", i));
        }

        let content = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        let tampered = lines[1].replace("field_1", "harmless");
        lines[1] = &tampered;
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let broken = verify_ledger_chain(&path).unwrap();
        assert_eq!(broken, vec![2]);
    }

    #[test]
    fn missing_export_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nope.jsonl");
        assert!(read_ledger_export(&path).unwrap().is_empty());
        assert!(verify_ledger_chain(&path).unwrap().is_empty());
    }

    #[test]
    fn session_storage_receives_every_line() {
        let mut storage = SessionStorage::default();
        storage.append_line("{}").unwrap();
        assert_eq!(storage.lines(), &["{}".to_string()]);
    }
}
