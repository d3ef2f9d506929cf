use injector_queue::{
    BatchCoordinator, BatchStatus, Priority, QueueConfig, QueueError, TaskId, TaskQueue,
    TaskStatus,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn submit(queue: &TaskQueue, priority: Priority) -> TaskId {
    queue
        .submit("validate_project", json!({ "project_path": "/srv/game" }), priority)
        .unwrap()
}

fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

#[test]
fn test_mixed_priorities_dequeue_most_urgent_first() {
    let queue = TaskQueue::default();
    let low = submit(&queue, Priority::Low);
    let critical = submit(&queue, Priority::Critical);
    let normal = submit(&queue, Priority::Normal);

    let order: Vec<TaskId> = std::iter::from_fn(|| queue.next()).map(|t| t.id).collect();
    assert_eq!(order, vec![critical, normal, low]);
}

#[test]
fn test_empty_task_type_is_rejected() {
    let queue = TaskQueue::default();
    let err = queue.submit("", json!({}), Priority::Normal).unwrap_err();

    assert!(matches!(err, QueueError::InvalidSpec(_)));
    assert_eq!(queue.depth(), 0);
    assert!(queue.is_empty());
}

#[test]
fn test_batch_succeeds_only_when_all_members_succeed() {
    let queue = Arc::new(TaskQueue::new(QueueConfig::default()));
    let batches = BatchCoordinator::new(queue.clone());
    let id = batches
        .create_batch(
            "level-1",
            vec![
                ("generate_prefab".into(), json!({ "name": "Door" })),
                ("generate_prefab".into(), json!({ "name": "Key" })),
            ],
            Priority::Normal,
        )
        .unwrap();

    let first = queue.next().unwrap();
    assert_eq!(batches.batch_status(id).unwrap().status, BatchStatus::Running);

    queue.complete(first.id, None).unwrap();
    let report = batches.batch_status(id).unwrap();
    assert_eq!(report.status, BatchStatus::Running);
    assert_eq!(report.progress, 0.5);

    let second = queue.next().unwrap();
    queue.complete(second.id, None).unwrap();
    let report = batches.batch_status(id).unwrap();
    assert_eq!(report.status, BatchStatus::Succeeded);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.progress, 1.0);
}

#[test]
fn test_batch_fails_as_soon_as_any_member_fails() {
    let queue = Arc::new(TaskQueue::default());
    let batches = BatchCoordinator::new(queue.clone());
    let id = batches
        .create_batch(
            "assets",
            vec![
                ("optimize_assets".into(), json!({ "asset_path": "/a" })),
                ("optimize_assets".into(), json!({ "asset_path": "/b" })),
                ("optimize_assets".into(), json!({ "asset_path": "/c" })),
            ],
            Priority::High,
        )
        .unwrap();

    let first = queue.next().unwrap();
    queue.fail(first.id, "PermissionError: denied").unwrap();

    let report = batches.batch_status(id).unwrap();
    assert_eq!(report.status, BatchStatus::Failed);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pending, 2);
}

#[test]
fn test_batch_members_are_never_evicted() {
    let queue = Arc::new(TaskQueue::new(
        QueueConfig::default().with_max_retained_tasks(0),
    ));
    let batches = BatchCoordinator::new(queue.clone());
    let id = batches
        .create_batch(
            "kept",
            vec![("generate_script".into(), json!({ "name": "Spawner" }))],
            Priority::Low,
        )
        .unwrap();

    let task = queue.next().unwrap();
    queue.complete(task.id, None).unwrap();
    assert_eq!(queue.status(task.id).unwrap().status, TaskStatus::Succeeded);
    assert_eq!(batches.batch_status(id).unwrap().status, BatchStatus::Succeeded);
}

proptest! {
    #[test]
    fn prop_next_yields_highest_priority_then_fifo(
        priorities in prop::collection::vec(priority(), 1..64)
    ) {
        let queue = TaskQueue::default();
        let submitted: Vec<(Priority, TaskId)> = priorities
            .iter()
            .map(|p| (*p, submit(&queue, *p)))
            .collect();

        // Stable sort keeps submission order within a priority
        let mut expected = submitted.clone();
        expected.sort_by(|a, b| b.0.cmp(&a.0));

        let dequeued: Vec<(Priority, TaskId)> = std::iter::from_fn(|| queue.next())
            .map(|t| (t.priority, t.id))
            .collect();

        prop_assert_eq!(dequeued, expected);
    }

    #[test]
    fn prop_requeue_preserves_priority(
        priorities in prop::collection::vec(priority(), 1..16),
        pick in any::<prop::sample::Index>()
    ) {
        let queue = TaskQueue::default();
        let ids: Vec<TaskId> = priorities.iter().map(|p| submit(&queue, *p)).collect();
        let target = ids[pick.index(ids.len())];

        while let Some(task) = queue.next() {
            if task.id == target {
                queue.mark_retrying(task.id, "TimeoutError").unwrap();
                queue.requeue(task.id).unwrap();
                break;
            }
        }

        let requeued = queue.status(target).unwrap();
        prop_assert_eq!(requeued.priority, priorities[pick.index(ids.len())]);
        prop_assert_eq!(requeued.retry_count, 1);
    }
}
