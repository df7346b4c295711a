//! Scheduler behavior: arrival-order execution, id assignment, failure
//! isolation, and recovery.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;

use cartolina::application::pipeline::PipelineError;
use cartolina::application::queue::{RenderQueue, TaskHandler, TaskSpec};
use cartolina::domain::types::{StoredArtifact, TaskStatus};

fn queue_with_capacity(capacity: usize) -> RenderQueue {
    RenderQueue::new(NonZeroUsize::new(capacity).expect("capacity"), None)
}

fn artifact(tag: &str) -> StoredArtifact {
    StoredArtifact {
        bucket: "seo-images".to_string(),
        object_path: format!("{tag}.png"),
        public_url: format!("https://cdn.test/{tag}.png"),
        fallback: false,
    }
}

/// Handler that logs `start`/`end` events around an artificial delay.
fn delayed_spec(
    label: &'static str,
    delay: Duration,
    events: Arc<Mutex<Vec<String>>>,
) -> TaskSpec {
    let handler: TaskHandler = Arc::new(move |_, _| {
        let events = Arc::clone(&events);
        async move {
            events.lock().expect("events lock").push(format!("start {label}"));
            tokio::time::sleep(delay).await;
            events.lock().expect("events lock").push(format!("end {label}"));
            Ok(artifact(label))
        }
        .boxed()
    });
    TaskSpec {
        template_type: label.to_string(),
        props: serde_json::json!({}),
        handler,
    }
}

fn instant_spec(label: &'static str) -> TaskSpec {
    let handler: TaskHandler =
        Arc::new(move |_, _| futures::future::ok(artifact(label)).boxed());
    TaskSpec {
        template_type: label.to_string(),
        props: serde_json::json!({}),
        handler,
    }
}

fn failing_spec(message: &'static str) -> TaskSpec {
    let handler: TaskHandler = Arc::new(move |_, _| {
        futures::future::err(PipelineError::Render(message.to_string())).boxed()
    });
    TaskSpec {
        template_type: "failing-card".to_string(),
        props: serde_json::json!({}),
        handler,
    }
}

async fn wait_until_idle(queue: &RenderQueue) {
    for _ in 0..300 {
        if queue.is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue did not go idle within 3s");
}

#[tokio::test]
async fn ids_are_assigned_synchronously_and_monotonically() {
    let queue = queue_with_capacity(16);
    let first = queue.enqueue(instant_spec("a"));
    let second = queue.enqueue(instant_spec("b"));
    let third = queue.enqueue(instant_spec("c"));

    assert_eq!((first, second, third), (1, 2, 3));
    wait_until_idle(&queue).await;
    assert_eq!(queue.depth(), 0);
}

#[tokio::test]
async fn completions_follow_arrival_order_not_delay_order() {
    let queue = queue_with_capacity(16);
    let events = Arc::new(Mutex::new(Vec::new()));

    let a = queue.enqueue(delayed_spec("A", Duration::from_millis(30), Arc::clone(&events)));
    let b = queue.enqueue(delayed_spec("B", Duration::from_millis(10), Arc::clone(&events)));
    let c = queue.enqueue(delayed_spec("C", Duration::from_millis(5), Arc::clone(&events)));

    wait_until_idle(&queue).await;

    let events = events.lock().expect("events lock").clone();
    assert_eq!(
        events,
        vec!["start A", "end A", "start B", "end B", "start C", "end C"]
    );

    for id in [a, b, c] {
        assert!(
            matches!(queue.status(id), Some(TaskStatus::Completed(_))),
            "task {id} should have completed"
        );
    }
}

#[tokio::test]
async fn tasks_never_overlap() {
    let queue = queue_with_capacity(64);
    let events = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..10 {
        queue.enqueue(delayed_spec("T", Duration::from_millis(3), Arc::clone(&events)));
    }
    wait_until_idle(&queue).await;

    let events = events.lock().expect("events lock").clone();
    assert_eq!(events.len(), 20);
    // Strict alternation: every start is immediately followed by its end.
    for pair in events.chunks(2) {
        assert_eq!(pair[0], "start T");
        assert_eq!(pair[1], "end T");
    }
}

#[tokio::test]
async fn failing_task_never_blocks_the_next() {
    let queue = queue_with_capacity(16);
    let failed = queue.enqueue(failing_spec("browser exploded"));
    let ok = queue.enqueue(instant_spec("after-failure"));

    wait_until_idle(&queue).await;

    match queue.status(failed) {
        Some(TaskStatus::Failed(message)) => {
            assert!(message.contains("browser exploded"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(queue.status(ok), Some(TaskStatus::Completed(_))));
}

#[tokio::test]
async fn panicking_task_is_recorded_and_queue_recovers() {
    let queue = queue_with_capacity(16);
    let handler: TaskHandler = Arc::new(|_, _| {
        async { panic!("handler bug") }.boxed()
    });
    let panicked = queue.enqueue(TaskSpec {
        template_type: "panicking-card".to_string(),
        props: serde_json::json!({}),
        handler,
    });
    let ok = queue.enqueue(instant_spec("after-panic"));

    wait_until_idle(&queue).await;

    match queue.status(panicked) {
        Some(TaskStatus::Failed(message)) => assert!(message.contains("panicked")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(queue.status(ok), Some(TaskStatus::Completed(_))));
    assert!(queue.is_idle());
}

#[tokio::test]
async fn task_timeout_fails_the_task_and_unblocks_the_queue() {
    let queue = RenderQueue::new(
        NonZeroUsize::new(16).expect("capacity"),
        Some(Duration::from_millis(50)),
    );

    let stuck_handler: TaskHandler = Arc::new(|_, _| {
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(StoredArtifact {
                bucket: String::new(),
                object_path: String::new(),
                public_url: String::new(),
                fallback: false,
            })
        }
        .boxed()
    });
    let stuck = queue.enqueue(TaskSpec {
        template_type: "stuck-card".to_string(),
        props: serde_json::json!({}),
        handler: stuck_handler,
    });
    let ok = queue.enqueue(instant_spec("after-timeout"));

    wait_until_idle(&queue).await;

    match queue.status(stuck) {
        Some(TaskStatus::Failed(message)) => assert!(message.contains("timed out")),
        other => panic!("expected timeout failure, got {other:?}"),
    }
    assert!(matches!(queue.status(ok), Some(TaskStatus::Completed(_))));
}

#[tokio::test]
async fn unknown_ids_are_distinguished_from_pending_ones() {
    let queue = queue_with_capacity(16);
    assert!(queue.status(0).is_none());
    assert!(queue.status(1).is_none());

    let id = queue.enqueue(delayed_spec(
        "slow",
        Duration::from_millis(50),
        Arc::new(Mutex::new(Vec::new())),
    ));
    // Assigned but unsettled: pending, not unknown.
    assert!(matches!(queue.status(id), Some(_)));
    assert!(queue.status(id + 1).is_none());

    wait_until_idle(&queue).await;
}

#[tokio::test]
async fn clearing_drops_undispatched_tasks() {
    let queue = queue_with_capacity(16);
    let events = Arc::new(Mutex::new(Vec::new()));

    let running = queue.enqueue(delayed_spec("long", Duration::from_millis(100), Arc::clone(&events)));
    let dropped_one = queue.enqueue(instant_spec("never-runs-1"));
    let dropped_two = queue.enqueue(instant_spec("never-runs-2"));

    // Give the drain loop time to dispatch the first task, then clear.
    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.clear();
    wait_until_idle(&queue).await;

    assert!(matches!(queue.status(running), Some(TaskStatus::Completed(_))));
    assert!(matches!(queue.status(dropped_one), Some(TaskStatus::Pending)));
    assert!(matches!(queue.status(dropped_two), Some(TaskStatus::Pending)));
    assert_eq!(queue.depth(), 0);
}

#[tokio::test]
async fn result_capacity_evicts_the_oldest_outcomes() {
    let queue = queue_with_capacity(2);
    for label in ["one", "two", "three", "four"] {
        queue.enqueue(instant_spec(label));
    }
    wait_until_idle(&queue).await;

    // Only the two most recent outcomes are still observable.
    assert!(matches!(queue.status(1), Some(TaskStatus::Pending)));
    assert!(matches!(queue.status(2), Some(TaskStatus::Pending)));
    assert!(matches!(queue.status(3), Some(TaskStatus::Completed(_))));
    assert!(matches!(queue.status(4), Some(TaskStatus::Completed(_))));
}

#[tokio::test]
async fn concurrent_producers_get_distinct_ids_and_everything_runs() {
    let queue = queue_with_capacity(512);

    let mut joins = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        joins.push(tokio::spawn(async move {
            (0..25)
                .map(|_| queue.enqueue(instant_spec("burst")))
                .collect::<Vec<_>>()
        }));
    }

    let mut ids = Vec::new();
    for join in joins {
        ids.extend(join.await.expect("producer task"));
    }
    wait_until_idle(&queue).await;

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 200, "every enqueue must get a distinct id");
    assert_eq!(ids.last().copied(), Some(200));

    for id in ids {
        assert!(matches!(queue.status(id), Some(TaskStatus::Completed(_))));
    }
}
