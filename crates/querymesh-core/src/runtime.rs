//! Cancellation, deadlines, and the structured audit event stream (spec §4.10).

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Keys that must never appear in cleartext in an audit record (spec §4.10).
const SENSITIVE_KEYS: &[&str] = &["api_key", "password", "secret", "authorization"];
const REDACTED: &str = "***REDACTED***";

/// Cooperative cancellation flag, checked at every suspension point (spec §5).
///
/// Cloning shares the same underlying flag; dropping all clones has no
/// special effect (there is no RAII-cancel-on-drop, matching the spec's
/// "explicit flag set" model rather than scope-based cancellation).
#[derive(Clone)]
pub struct CancellationFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationFlag {
    /// Creates a fresh, uncancelled flag.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Sets the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested; a no-op future if already
    /// cancelled. Intended to be raced against other futures at a
    /// suspension point, e.g. `tokio::select! { _ = flag.cancelled() => ..., _ = fut => ... }`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Global request deadline plus helpers for computing per-operation budgets
/// (spec §5: "sandbox submissions carry an absolute deadline equal to
/// `min(remaining-global, statement_timeout)`").
#[derive(Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    total: Duration,
}

impl Deadline {
    /// Starts a new deadline window of `total` duration from now.
    pub fn starting_now(total: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            total,
        }
    }

    /// Time remaining until the deadline; zero if already expired.
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started_at.elapsed())
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The budget for a single operation: the smaller of the remaining
    /// global deadline and `op_timeout`.
    pub fn operation_budget(&self, op_timeout: Duration) -> Duration {
        self.remaining().min(op_timeout)
    }
}

/// A terminal outcome of the three-way race in §4.10: cancellation,
/// timeout, or normal completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Completed normally.
    Completed,
    /// The global deadline elapsed first.
    Timeout,
    /// The cancellation flag was set first.
    Cancelled,
}

/// Races `fut` against the deadline and cancellation flag, per spec §4.10's
/// "dedicated waiter" that observes cancellation, timeout, and completion
/// in that priority order when multiple conditions are simultaneously true.
pub async fn race_with_deadline<F, T>(
    fut: F,
    deadline: &Deadline,
    cancellation: &CancellationFlag,
) -> (TerminationReason, Option<T>)
where
    F: std::future::Future<Output = T>,
{
    if cancellation.is_cancelled() {
        return (TerminationReason::Cancelled, None);
    }
    if deadline.expired() {
        return (TerminationReason::Timeout, None);
    }

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => (TerminationReason::Cancelled, None),
        _ = tokio::time::sleep(deadline.remaining()) => (TerminationReason::Timeout, None),
        out = fut => (TerminationReason::Completed, Some(out)),
    }
}

/// Recursively redacts any object key in [`SENSITIVE_KEYS`] (case-insensitive)
/// found anywhere in `value`, replacing the value with [`REDACTED`].
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if SENSITIVE_KEYS
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(k))
                {
                    out.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// One structured audit record (spec §4.10, §6 "Audit log file").
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// RFC3339 timestamp.
    pub timestamp: String,
    /// Event type tag, e.g. `"llm_call"`, `"security_violation"`, `"breaker_state_change"`.
    pub event_type: String,
    /// Trace id for the originating request.
    pub trace_id: String,
    /// Tenant id for the originating request.
    pub tenant_id: String,
    /// Event payload, redacted before emission.
    pub data: Value,
}

/// A sink that accepts [`AuditRecord`]s; the concrete file/rotation backend
/// is out of scope (spec §1), this trait is the interface the runtime emits
/// through.
pub trait AuditSink: Send + Sync {
    /// Emits a single, already-redacted record.
    fn emit(&self, record: &AuditRecord);
}

/// An `AuditSink` that forwards to `tracing`, suitable as a default when no
/// dedicated sink is wired up, and used by tests.
#[derive(Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: &AuditRecord) {
        tracing::info!(
            event_type = %record.event_type,
            trace_id = %record.trace_id,
            tenant_id = %record.tenant_id,
            data = %record.data,
            "audit"
        );
    }
}

/// An in-memory `AuditSink` for tests and the `querymesh-testing` harness.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: parking_lot::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Returns a clone of all records emitted so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, record: &AuditRecord) {
        self.records.lock().push(record.clone());
    }
}

impl Clone for AuditRecord {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp.clone(),
            event_type: self.event_type.clone(),
            trace_id: self.trace_id.clone(),
            tenant_id: self.tenant_id.clone(),
            data: self.data.clone(),
        }
    }
}

/// The audit event logger: builds redacted [`AuditRecord`]s and forwards
/// them to an [`AuditSink`].
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    /// Builds a logger writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Emits an event. `data` is redacted recursively before emission, so
    /// callers never need to pre-scrub payloads themselves.
    pub fn emit(
        &self,
        event_type: impl Into<String>,
        trace_id: impl Into<String>,
        tenant_id: impl Into<String>,
        data: impl Serialize,
    ) {
        let raw = serde_json::to_value(data).unwrap_or(Value::Null);
        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: event_type.into(),
            trace_id: trace_id.into(),
            tenant_id: tenant_id.into(),
            data: redact(&raw),
        };
        self.sink.emit(&record);
    }
}

/// Convenience wrapper for recursive redaction of a flat or nested
/// `HashMap<String, String>`-shaped payload, used by callers that don't
/// already have a `serde_json::Value`.
pub fn redact_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| {
            if SENSITIVE_KEYS.iter().any(|s| s.eq_ignore_ascii_case(k)) {
                (k.clone(), REDACTED.to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}
