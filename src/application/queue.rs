//! The request queue: strict FIFO order, single-flight execution, amortized
//! buffer compaction.
//!
//! Every accepted card request becomes a task with a monotonically
//! increasing id. Exactly one task's pipeline runs at a time; a browser
//! instance is expensive, so global ordering keeps resource usage flat and
//! makes external side effects easy to reason about. Producers only ever
//! touch the tail under the state mutex, so enqueueing is safe from any
//! number of request handlers while the drain loop runs.

use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, gauge, histogram};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::ledger::ResultLedger;
use crate::application::pipeline::PipelineError;
use crate::domain::types::{StoredArtifact, TaskId, TaskStatus};

/// Dispatched-prefix length beyond which partial compaction is considered.
const COMPACT_THRESHOLD: usize = 1024;

/// Opaque per-task callable: `(template_type, props)` to a settled pipeline
/// outcome. The queue never looks inside.
pub type TaskHandler = Arc<
    dyn Fn(String, serde_json::Value) -> BoxFuture<'static, Result<StoredArtifact, PipelineError>>
        + Send
        + Sync,
>;

/// Everything needed to execute one render request.
pub struct TaskSpec {
    pub template_type: String,
    pub props: serde_json::Value,
    pub handler: TaskHandler,
}

struct QueuedTask {
    id: TaskId,
    spec: TaskSpec,
}

#[derive(Default)]
struct QueueState {
    /// Slots before `head` are dispatched and hold `None`; dispatch takes
    /// ownership without shifting, compaction reclaims the stale prefix.
    buffer: Vec<Option<QueuedTask>>,
    head: usize,
    next_id: TaskId,
    running: bool,
}

impl QueueState {
    fn depth(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// Two-part bound on buffer growth: a fully drained buffer is discarded
    /// outright; otherwise the stale prefix is dropped only once it is both
    /// past [`COMPACT_THRESHOLD`] and the majority of the buffer. The
    /// threshold+ratio condition amortizes the O(n) rebuild instead of
    /// paying it on every step.
    fn compact(&mut self) {
        if self.head > 0 && self.head == self.buffer.len() {
            self.buffer = Vec::new();
            self.head = 0;
            counter!("cartolina_queue_compactions_total").increment(1);
        } else if self.head > COMPACT_THRESHOLD && self.head * 2 >= self.buffer.len() {
            self.buffer = self.buffer.split_off(self.head);
            self.head = 0;
            counter!("cartolina_queue_compactions_total").increment(1);
        }
    }
}

/// FIFO scheduler executing at most one task at a time.
///
/// Cheap to clone; clones share the same buffer and ledger.
#[derive(Clone)]
pub struct RenderQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    ledger: ResultLedger,
    /// Optional ceiling on a single task's pipeline; expiry fails the task
    /// and unblocks the drain loop.
    task_timeout: Option<Duration>,
}

impl RenderQueue {
    pub fn new(result_capacity: NonZeroUsize, task_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                ledger: ResultLedger::new(result_capacity),
                task_timeout,
            }),
        }
    }

    /// Append a task and return its freshly assigned id without blocking.
    /// Starts the drain loop when no execution is in flight.
    pub fn enqueue(&self, spec: TaskSpec) -> TaskId {
        let (id, depth, start_drain) = {
            let mut state = self.lock_state();
            state.next_id += 1;
            let id = state.next_id;
            state.buffer.push(Some(QueuedTask { id, spec }));
            let start_drain = !state.running;
            if start_drain {
                state.running = true;
            }
            (id, state.depth(), start_drain)
        };

        gauge!("cartolina_queue_depth").set(depth as f64);
        debug!(target: "cartolina::queue", task_id = id, depth, "task queued");

        if start_drain {
            let queue = self.clone();
            tokio::spawn(async move { queue.drain().await });
        }
        id
    }

    /// `None` for ids that were never assigned; otherwise the ledger's view.
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        if id == 0 || id > self.lock_state().next_id {
            return None;
        }
        Some(self.inner.ledger.status_of(id))
    }

    /// Number of accepted tasks not yet dispatched.
    pub fn depth(&self) -> usize {
        self.lock_state().depth()
    }

    /// True when no task is executing and nothing is waiting.
    pub fn is_idle(&self) -> bool {
        let state = self.lock_state();
        !state.running && state.depth() == 0
    }

    /// Drop every undispatched task. Operational recovery only; a task
    /// already dispatched still runs to completion.
    pub fn clear(&self) {
        {
            let mut state = self.lock_state();
            state.buffer = Vec::new();
            state.head = 0;
        }
        gauge!("cartolina_queue_depth").set(0.0);
        info!(target: "cartolina::queue", "queue cleared");
    }

    /// Sequentially execute queued tasks until the buffer is exhausted.
    /// Exactly one drain loop exists at a time; `running` is flipped under
    /// the same lock that guards the emptiness check, so an enqueue racing
    /// the final iteration either sees the loop alive or starts a new one.
    async fn drain(self) {
        loop {
            let task = {
                let mut state = self.lock_state();
                if state.head >= state.buffer.len() {
                    state.compact();
                    state.running = false;
                    return;
                }
                let slot = state.head;
                state.head += 1;
                state.buffer[slot].take()
            };

            // A dispatched slot is populated unless the buffer was cleared
            // out from under the cursor mid-flight.
            let Some(task) = task else {
                warn!(target: "cartolina::queue", "dispatched slot was empty, skipping");
                continue;
            };

            self.run_task(task).await;

            let mut state = self.lock_state();
            state.compact();
            gauge!("cartolina_queue_depth").set(state.depth() as f64);
        }
    }

    async fn run_task(&self, task: QueuedTask) {
        let QueuedTask { id, spec } = task;
        info!(
            target: "cartolina::queue",
            task_id = id,
            template = %spec.template_type,
            "processing task"
        );
        let started = Instant::now();

        let future = (spec.handler)(spec.template_type.clone(), spec.props);
        let future = AssertUnwindSafe(future).catch_unwind();

        let settled = match self.inner.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(settled) => settled,
                Err(_) => {
                    let message = format!("task timed out after {}s", limit.as_secs());
                    error!(target: "cartolina::queue", task_id = id, %message, "task failed");
                    self.inner.ledger.record_failure(id, message);
                    counter!("cartolina_tasks_failed_total").increment(1);
                    return;
                }
            },
            None => future.await,
        };

        let elapsed_ms = started.elapsed().as_millis() as f64;
        histogram!("cartolina_task_ms").record(elapsed_ms);

        match settled {
            Ok(Ok(artifact)) => {
                info!(
                    target: "cartolina::queue",
                    task_id = id,
                    url = %artifact.public_url,
                    elapsed_ms,
                    "task completed"
                );
                self.inner.ledger.record_success(id, artifact);
                counter!("cartolina_tasks_completed_total").increment(1);
            }
            Ok(Err(err)) => {
                error!(target: "cartolina::queue", task_id = id, error = %err, "task failed");
                self.inner.ledger.record_failure(id, err.to_string());
                counter!("cartolina_tasks_failed_total").increment(1);
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!(target: "cartolina::queue", task_id = id, %message, "task panicked");
                self.inner.ledger.record_failure(id, message);
                counter!("cartolina_tasks_failed_total").increment(1);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("task handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("task handler panicked: {message}")
    } else {
        "task handler panicked".to_string()
    }
}
