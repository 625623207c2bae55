//! Bounded worker pools with hard deadlines and crash isolation (spec §4.6).
//!
//! The spec's "process-isolated worker pool" is realized here as a bounded
//! set of blocking-thread slots (`tokio::task::spawn_blocking` behind a
//! counting semaphore): a panicking submission is caught at the `JoinHandle`
//! boundary exactly as a crashed worker process would be caught by a
//! supervisor, without requiring this workspace to own real subprocess
//! plumbing (out of scope per spec §1).

use crate::types::ExecutionResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A bounded pool of execution slots.
pub struct WorkerPool {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Builds a pool with `capacity` concurrent slots.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// The interactive pool's spec default: 4 workers.
    pub fn interactive_default() -> Self {
        Self::new("interactive", 4)
    }

    /// The indexing pool's spec default: 2 workers.
    pub fn indexing_default() -> Self {
        Self::new("indexing", 2)
    }

    /// Submits `work` (a blocking closure modeling a sandboxed engine call)
    /// against `deadline`. Translates a panic inside `work` into a
    /// `SANDBOX CRASH` result, and a deadline overrun into a timeout result,
    /// rather than propagating either to the caller (spec §4.6: "The
    /// submission wrapper enforces a hard deadline and translates worker
    /// death... into `ExecutionResult{success=false, error="SANDBOX CRASH:
    /// …"}`").
    pub async fn submit<F>(&self, deadline: Duration, work: F) -> ExecutionResult
    where
        F: FnOnce() -> ExecutionResult + Send + 'static,
    {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return ExecutionResult::sandbox_crash("pool semaphore closed"),
        };

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(pool = %self.name, error = %join_error, "sandbox worker crashed");
                ExecutionResult::sandbox_crash(&join_error.to_string())
            }
            Err(_) => ExecutionResult::timed_out(),
        }
    }

    /// Waits for all in-flight submissions to complete and prevents new ones
    /// from acquiring a slot, mirroring the spec's atexit-driven shutdown
    /// that "waits for pending submissions". Callers must stop issuing new
    /// `submit` calls before invoking this, or they will block behind it.
    pub async fn shutdown(&self) {
        let _ = self.semaphore.acquire_many(self.capacity as u32).await;
        self.semaphore.close();
    }
}
