//! Terminal task outcomes retained for polling.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::domain::types::{StoredArtifact, TaskId, TaskStatus};

/// Bounded completed/failed ledgers keyed by task id.
///
/// Entries are insert-only while tasks settle; once a ledger reaches
/// capacity, recording a new outcome evicts the oldest retained one. An
/// evicted task becomes indistinguishable from a pending one to pollers, so
/// the capacity should comfortably exceed the polling window.
pub struct ResultLedger {
    inner: Mutex<Inner>,
}

struct Inner {
    completed: LruCache<TaskId, StoredArtifact>,
    failed: LruCache<TaskId, String>,
}

impl ResultLedger {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                completed: LruCache::new(capacity),
                failed: LruCache::new(capacity),
            }),
        }
    }

    pub fn record_success(&self, id: TaskId, artifact: StoredArtifact) {
        let mut inner = self.lock();
        inner.completed.put(id, artifact);
    }

    pub fn record_failure(&self, id: TaskId, error: String) {
        let mut inner = self.lock();
        inner.failed.put(id, error);
    }

    /// Status of an assigned task: `Pending` until an outcome lands.
    pub fn status_of(&self, id: TaskId) -> TaskStatus {
        let inner = self.lock();
        if let Some(artifact) = inner.completed.peek(&id) {
            TaskStatus::Completed(artifact.clone())
        } else if let Some(error) = inner.failed.peek(&id) {
            TaskStatus::Failed(error.clone())
        } else {
            TaskStatus::Pending
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::ResultLedger;
    use crate::domain::types::{StoredArtifact, TaskStatus};

    fn artifact(path: &str) -> StoredArtifact {
        StoredArtifact {
            bucket: "seo-images".to_string(),
            object_path: path.to_string(),
            public_url: format!("https://cdn.test/{path}"),
            fallback: false,
        }
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero test capacity")
    }

    #[test]
    fn outcomes_are_looked_up_by_id() {
        let ledger = ResultLedger::new(capacity(8));
        ledger.record_success(1, artifact("a.png"));
        ledger.record_failure(2, "render failed: boom".to_string());

        assert!(matches!(ledger.status_of(1), TaskStatus::Completed(a) if a.object_path == "a.png"));
        assert!(matches!(ledger.status_of(2), TaskStatus::Failed(e) if e.contains("boom")));
        assert!(matches!(ledger.status_of(3), TaskStatus::Pending));
    }

    #[test]
    fn capacity_evicts_the_oldest_entry() {
        let ledger = ResultLedger::new(capacity(2));
        ledger.record_success(1, artifact("a.png"));
        ledger.record_success(2, artifact("b.png"));
        ledger.record_success(3, artifact("c.png"));

        assert!(matches!(ledger.status_of(1), TaskStatus::Pending));
        assert!(matches!(ledger.status_of(2), TaskStatus::Completed(_)));
        assert!(matches!(ledger.status_of(3), TaskStatus::Completed(_)));
    }

    #[test]
    fn completed_and_failed_are_tracked_independently() {
        let ledger = ResultLedger::new(capacity(1));
        ledger.record_success(1, artifact("a.png"));
        ledger.record_failure(2, "upload failed".to_string());

        assert!(matches!(ledger.status_of(1), TaskStatus::Completed(_)));
        assert!(matches!(ledger.status_of(2), TaskStatus::Failed(_)));
    }
}
