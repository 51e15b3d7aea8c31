//! In-process registry for long-running ingest and recompute jobs.
//!
//! One `Mutex<HashMap>` owner per process; every mutation takes the lock
//! briefly and never across an await. Finished records are kept for a
//! retention window so clients can poll results, then swept by a
//! background loop.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default retention of finished tasks.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// How often the sweep loop runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

/// Progress counters, advanced as the job walks its units of work.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TaskProgress {
    pub total: u64,
    pub done: u64,
    pub failed: u64,
}

/// One registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    /// Job family, e.g. `"ingest"`.
    pub kind: String,
    /// Deduplication key within the kind (e.g. a digest of the request).
    pub key: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub progress: TaskProgress,
    pub error: Option<String>,
    /// Job-specific result payload, set on completion.
    pub summary: Option<serde_json::Value>,
}

/// What `start` resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(Uuid),
    /// A task of the same kind and key is already running; its id is
    /// returned instead of starting a second one.
    AlreadyRunning(Uuid),
}

impl StartOutcome {
    pub fn task_id(self) -> Uuid {
        match self {
            StartOutcome::Started(id) | StartOutcome::AlreadyRunning(id) => id,
        }
    }
}

/// Process-wide task table.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running task, unless one with the same kind and key
    /// is already running.
    pub fn start(&self, kind: &str, key: &str, total: u64) -> StartOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(running) = inner.values().find(|t| {
            t.status == TaskStatus::Running && t.kind == kind && t.key == key
        }) {
            return StartOutcome::AlreadyRunning(running.task_id);
        }

        let task_id = Uuid::new_v4();
        inner.insert(
            task_id,
            TaskRecord {
                task_id,
                kind: kind.to_string(),
                key: key.to_string(),
                status: TaskStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                failed_at: None,
                progress: TaskProgress {
                    total,
                    ..Default::default()
                },
                error: None,
                summary: None,
            },
        );
        StartOutcome::Started(task_id)
    }

    /// Bump the progress counters of a running task.
    pub fn advance(&self, task_id: Uuid, done: u64, failed: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = inner.get_mut(&task_id) {
            task.progress.done += done;
            task.progress.failed += failed;
        }
    }

    pub fn complete(&self, task_id: Uuid, summary: serde_json::Value) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = inner.get_mut(&task_id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.summary = Some(summary);
        }
    }

    /// Mark a task failed; accumulated progress counters stay readable.
    pub fn fail(&self, task_id: Uuid, error: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = inner.get_mut(&task_id) {
            task.status = TaskStatus::Failed;
            task.failed_at = Some(Utc::now());
            task.error = Some(error.into());
        }
    }

    pub fn snapshot(&self, task_id: Uuid) -> Option<TaskRecord> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(&task_id).cloned()
    }

    /// Drop finished tasks older than `retention`. Returns the number of
    /// removed records.
    pub fn sweep(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::hours(24));
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.len();
        inner.retain(|_, task| {
            let finished_at = task.completed_at.or(task.failed_at);
            match finished_at {
                Some(at) => at > cutoff,
                None => true,
            }
        });
        before - inner.len()
    }
}

/// Run the periodic registry sweep until cancelled.
pub async fn run_sweeper(
    registry: std::sync::Arc<TaskRegistry>,
    retention: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "task sweep loop started"
    );
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("task sweep loop stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = registry.sweep(retention);
                if removed > 0 {
                    tracing::info!(removed, "task sweep: purged finished tasks");
                } else {
                    tracing::debug!("task sweep: nothing to purge");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_snapshot_round_trip() {
        let registry = TaskRegistry::new();
        let id = registry.start("ingest", "batch-a", 3).task_id();
        let task = registry.snapshot(id).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress.total, 3);
    }

    #[test]
    fn duplicate_running_task_is_suppressed() {
        let registry = TaskRegistry::new();
        let first = registry.start("ingest", "batch-a", 1);
        let second = registry.start("ingest", "batch-a", 1);
        assert!(matches!(second, StartOutcome::AlreadyRunning(id) if id == first.task_id()));

        // A different key is a different task.
        let other = registry.start("ingest", "batch-b", 1);
        assert!(matches!(other, StartOutcome::Started(_)));
    }

    #[test]
    fn completion_clears_the_duplicate_guard() {
        let registry = TaskRegistry::new();
        let first = registry.start("ingest", "batch-a", 1).task_id();
        registry.complete(first, serde_json::json!({"files": 1}));
        let second = registry.start("ingest", "batch-a", 1);
        assert!(matches!(second, StartOutcome::Started(_)));
    }

    #[test]
    fn advance_accumulates_counters() {
        let registry = TaskRegistry::new();
        let id = registry.start("ingest", "k", 10).task_id();
        registry.advance(id, 3, 1);
        registry.advance(id, 2, 0);
        let task = registry.snapshot(id).unwrap();
        assert_eq!(task.progress.done, 5);
        assert_eq!(task.progress.failed, 1);
    }

    #[test]
    fn fail_records_error_and_timestamp() {
        let registry = TaskRegistry::new();
        let id = registry.start("ingest", "k", 1).task_id();
        registry.fail(id, "parse error");
        let task = registry.snapshot(id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.failed_at.is_some());
        assert_eq!(task.error.as_deref(), Some("parse error"));
    }

    #[test]
    fn sweep_keeps_running_and_recent_tasks() {
        let registry = TaskRegistry::new();
        let running = registry.start("ingest", "a", 1).task_id();
        let finished = registry.start("ingest", "b", 1).task_id();
        registry.complete(finished, serde_json::json!({}));

        // Nothing is older than the retention window yet.
        assert_eq!(registry.sweep(Duration::from_secs(3600)), 0);
        // Zero retention sweeps everything finished, never the running task.
        assert_eq!(registry.sweep(Duration::ZERO), 1);
        assert!(registry.snapshot(running).is_some());
        assert!(registry.snapshot(finished).is_none());
    }
}
