//! Audit logging for second-factor decisions.
//!
//! Every policy evaluation produces exactly one audit record: who was asked
//! to prove a second factor, when, and why. Records are JSON lines with a
//! stable field order, written to:
//! 1. Syslog (AUTH facility) - for SIEM integration
//! 2. An append-only audit file (default `/var/log/netgate-audit.log`)
//! 3. stderr - for debugging/testing
//!
//! ## Decoupling from the decision path
//!
//! Records are handed to a bounded queue drained by a dedicated writer
//! thread, so [`AuditSink::record`] never blocks an authentication decision.
//! A full queue or a failed write is counted and reported on the operational
//! channel; it never alters a decision that has already been computed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use once_cell::sync::Lazy;
use serde::Serialize;
use syslog::{Facility, Formatter3164};

use crate::evaluator::ConnectionContext;
use crate::policy::{Decision, DecisionReason};

/// Default audit log file path
const DEFAULT_AUDIT_LOG: &str = "/var/log/netgate-audit.log";

/// Default bound on queued, not-yet-written records
const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Global syslog writer
static SYSLOG_WRITER: Lazy<Mutex<Option<syslog::Logger<syslog::LoggerBackend, Formatter3164>>>> =
    Lazy::new(|| {
        let formatter = Formatter3164 {
            facility: Facility::LOG_AUTH,
            hostname: None,
            process: "netgate".to_string(),
            pid: std::process::id(),
        };

        let logger = syslog::unix(formatter).ok();
        Mutex::new(logger)
    });

/// Decision outcome as recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditOutcome {
    /// Second factor must be demanded
    Required,
    /// Trusted origin, second factor skipped
    NotRequired,
}

/// One immutable audit record. Field order is stable so the JSON output is
/// both grep-able and machine-parseable.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Decision time, RFC 3339
    pub timestamp: String,
    /// Host the decision was made on
    pub host: String,
    /// Reported source address, or an explicit "absent"/"malformed" marker
    pub source_address: String,
    /// Whether the second factor was required
    pub outcome: AuditOutcome,
    /// Stable reason code
    pub reason: &'static str,
    /// Label of the matching trust rule, if any
    pub matched_rule: Option<String>,
}

impl AuditRecord {
    /// Build the record for one decision. The record mirrors the decision
    /// exactly: same reason, same matched rule.
    pub fn for_decision(decision: &Decision, context: &ConnectionContext) -> Self {
        let source_address = match decision.reason {
            DecisionReason::NoSourceAddress => "absent".to_string(),
            DecisionReason::MalformedSourceAddress => "malformed".to_string(),
            _ => context
                .source_address
                .clone()
                .unwrap_or_else(|| "absent".to_string()),
        };

        let outcome = if decision.second_factor_required {
            AuditOutcome::Required
        } else {
            AuditOutcome::NotRequired
        };

        Self {
            timestamp: context.timestamp.to_rfc3339(),
            host: get_hostname(),
            source_address,
            outcome,
            reason: decision.reason.as_str(),
            matched_rule: decision.matched_rule.as_ref().map(|r| r.label.clone()),
        }
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Audit file path
    pub log_path: PathBuf,
    /// Whether to forward records to syslog (AUTH facility)
    pub use_syslog: bool,
    /// Whether to echo records to stderr
    pub echo_stderr: bool,
    /// Bound on queued records before drops begin
    pub queue_depth: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_AUDIT_LOG),
            use_syslog: true,
            echo_stderr: true,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl AuditConfig {
    /// Load configuration from environment variables.
    ///
    /// `NETGATE_AUDIT_LOG` overrides the audit file path.
    pub fn from_env() -> Self {
        let log_path = std::env::var("NETGATE_AUDIT_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_AUDIT_LOG));

        Self {
            log_path,
            ..Self::default()
        }
    }
}

/// Counters shared between the caller side and the writer thread.
#[derive(Debug, Default)]
struct SinkShared {
    records_written: AtomicU64,
    records_dropped: AtomicU64,
    write_failures: AtomicU64,
}

/// Snapshot of sink counters (serializable).
///
/// A gap in the audit trail is itself a security-relevant condition, so
/// drops and write failures are always observable here even though they
/// never surface on the decision path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Records durably handed to at least the audit file
    pub records_written: u64,
    /// Records dropped because the queue was full or closed
    pub records_dropped: u64,
    /// Write attempts that failed on the writer thread
    pub write_failures: u64,
}

/// Append-only, fire-and-forget audit sink.
///
/// Concurrent callers are serialized through the internal queue, so records
/// from simultaneous connections stay individually well-formed and ordered
/// by arrival. Dropping the sink closes the queue and joins the writer
/// thread, flushing every record already accepted.
pub struct AuditSink {
    tx: Option<SyncSender<AuditRecord>>,
    writer: Option<JoinHandle<()>>,
    shared: Arc<SinkShared>,
}

impl AuditSink {
    /// Start a sink with default configuration.
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(AuditConfig::default())
    }

    /// Start a sink from environment configuration.
    pub fn from_env() -> std::io::Result<Self> {
        Self::with_config(AuditConfig::from_env())
    }

    /// Start a sink with the given configuration, spawning its writer thread.
    pub fn with_config(config: AuditConfig) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<AuditRecord>(config.queue_depth);
        let shared = Arc::new(SinkShared::default());

        let writer_shared = Arc::clone(&shared);
        let writer = std::thread::Builder::new()
            .name("netgate-audit".to_string())
            .spawn(move || {
                for record in rx {
                    write_record(&config, &record, &writer_shared);
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            writer: Some(writer),
            shared,
        })
    }

    /// Queue one record for writing. Never blocks and never fails the
    /// caller: a full or closed queue drops the record, counts it, and
    /// warns on the operational channel.
    pub fn record(&self, record: AuditRecord) {
        let Some(tx) = self.tx.as_ref() else {
            self.shared.records_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.shared.records_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("audit queue full, record dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.shared.records_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("audit writer gone, record dropped");
            }
        }
    }

    /// Current counter snapshot.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            records_written: self.shared.records_written.load(Ordering::Relaxed),
            records_dropped: self.shared.records_dropped.load(Ordering::Relaxed),
            write_failures: self.shared.write_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AuditSink {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit.
        drop(self.tx.take());
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

/// Write one record to every configured destination.
fn write_record(config: &AuditConfig, record: &AuditRecord, shared: &SinkShared) {
    let json = match serde_json::to_string(record) {
        Ok(json) => json,
        Err(e) => {
            shared.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("audit record serialization failed: {e}");
            return;
        }
    };

    match append_to_file(&config.log_path, &json) {
        Ok(()) => {
            shared.records_written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            shared.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "audit write to {} failed: {e}",
                config.log_path.display()
            );
        }
    }

    if config.use_syslog {
        log_to_syslog(&json);
    }

    if config.echo_stderr {
        eprintln!("netgate-audit: {json}");
    }
}

/// Get the hostname of the current machine.
fn get_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Append a line to the audit file.
fn append_to_file(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(file, "{content}")?;
    Ok(())
}

/// Log a message to syslog.
fn log_to_syslog(message: &str) {
    if let Ok(mut guard) = SYSLOG_WRITER.lock() {
        if let Some(ref mut logger) = *guard {
            // Audit events go out at info level
            let _ = logger.info(message);
        }
    }
}
