//! Priority task queue
//!
//! Single-lock queue state shared by submitters and workers:
//! - Binary heap keyed by (priority, reverse sequence)
//! - Task table holding every live and retained task
//! - Monotonic sequence counter bumped on every (re)enqueue
//! - Bounded retention of finished standalone tasks

use crate::error::QueueError;
use crate::spec::TaskSpec;
use crate::types::{BatchId, Priority, Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::Notify;

/// Queue configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Repair budget given to each new task
    pub max_retries: u32,
    /// Finished standalone tasks kept for status queries
    pub max_retained_tasks: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retained_tasks: 10_000,
        }
    }
}

impl QueueConfig {
    /// Set repair budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set retention limit
    #[inline]
    #[must_use]
    pub fn with_max_retained_tasks(mut self, limit: usize) -> Self {
        self.max_retained_tasks = limit;
        self
    }
}

/// Heap entry; the greatest entry is dequeued first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: Priority,
    sequence: u64,
    id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    tasks: HashMap<TaskId, Task>,
    next_sequence: u64,
    /// Finished standalone tasks, oldest first
    retired: VecDeque<TaskId>,
    /// Open [`TaskWatch`] guards per task; watched tasks are never evicted
    watched: HashMap<TaskId, usize>,
}

impl QueueState {
    fn enqueue(&mut self, mut task: Task) -> TaskId {
        task.sequence = self.next_sequence;
        self.next_sequence += 1;

        let id = task.id;
        self.heap.push(QueueEntry {
            priority: task.priority,
            sequence: task.sequence,
            id,
        });
        self.tasks.insert(id, task);
        id
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, QueueError> {
        self.tasks.get_mut(&id).ok_or(QueueError::TaskNotFound(id))
    }

    fn retire(&mut self, id: TaskId, limit: usize) {
        let standalone = self.tasks.get(&id).is_some_and(|t| t.batch_id.is_none());
        if !standalone {
            return;
        }
        self.retired.push_back(id);
        self.evict(limit);
    }

    /// Drop the oldest unwatched finished tasks until at most `limit`
    /// unwatched ones remain
    fn evict(&mut self, limit: usize) {
        let watched = if self.watched.is_empty() {
            0
        } else {
            self.retired
                .iter()
                .filter(|id| self.watched.contains_key(*id))
                .count()
        };
        let mut excess = self.retired.len().saturating_sub(watched + limit);
        let mut kept = Vec::new();
        while excess > 0 {
            let Some(id) = self.retired.pop_front() else {
                break;
            };
            if self.watched.contains_key(&id) {
                kept.push(id);
                continue;
            }
            self.tasks.remove(&id);
            excess -= 1;
            tracing::debug!("Evicted finished task {}", id);
        }
        for id in kept.into_iter().rev() {
            self.retired.push_front(id);
        }
    }
}

/// Keeps a task queryable while it is held
///
/// Finished tasks under watch are exempt from retention; eviction resumes
/// when the last guard for the task is dropped.
#[derive(Debug)]
pub struct TaskWatch<'a> {
    queue: &'a TaskQueue,
    id: TaskId,
}

impl TaskWatch<'_> {
    /// Watched task ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current snapshot of the watched task
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound` if a restore replaced the task table
    pub fn current(&self) -> Result<Task, QueueError> {
        self.queue.status(self.id)
    }
}

impl Drop for TaskWatch<'_> {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock();
        if let Some(count) = state.watched.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                state.watched.remove(&self.id);
            }
        }
        state.evict(self.queue.config.max_retained_tasks);
    }
}

/// Priority queue of tasks
///
/// Strict priority order (critical first), FIFO within a priority.
#[derive(Debug)]
pub struct TaskQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl TaskQueue {
    /// Create empty queue
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Queue configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Validate and enqueue a raw submission
    ///
    /// # Errors
    /// - `QueueError::InvalidSpec` if the submission is malformed; the queue
    ///   is left unchanged
    pub fn submit(
        &self,
        task_type: &str,
        spec: Value,
        priority: Priority,
    ) -> Result<TaskId, QueueError> {
        let spec = TaskSpec::parse(task_type, spec)?;
        Ok(self.submit_spec(spec, priority))
    }

    /// Enqueue an already validated spec
    pub fn submit_spec(&self, spec: TaskSpec, priority: Priority) -> TaskId {
        let task = Task::new(spec, priority, self.config.max_retries);
        let task_type = task.task_type();
        let id = self.state.lock().enqueue(task);
        self.notify.notify_one();

        tracing::info!("Submitted {} task {} ({})", task_type, id, priority);
        id
    }

    /// Enqueue batch members under one lock so their sequence numbers are
    /// consecutive and follow input order
    pub(crate) fn enqueue_all(
        &self,
        batch_id: BatchId,
        specs: Vec<TaskSpec>,
        priority: Priority,
    ) -> Vec<TaskId> {
        let ids: Vec<TaskId> = {
            let mut state = self.state.lock();
            specs
                .into_iter()
                .map(|spec| {
                    let mut task = Task::new(spec, priority, self.config.max_retries);
                    task.batch_id = Some(batch_id);
                    state.enqueue(task)
                })
                .collect()
        };
        for _ in &ids {
            self.notify.notify_one();
        }
        ids
    }

    /// Current snapshot of a task
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound` for unknown or evicted IDs
    pub fn status(&self, id: TaskId) -> Result<Task, QueueError> {
        self.get(id).ok_or(QueueError::TaskNotFound(id))
    }

    /// Hold a task so it stays queryable after it finishes
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound` for unknown or already evicted IDs
    pub fn watch(&self, id: TaskId) -> Result<TaskWatch<'_>, QueueError> {
        let mut state = self.state.lock();
        if !state.tasks.contains_key(&id) {
            return Err(QueueError::TaskNotFound(id));
        }
        *state.watched.entry(id).or_insert(0) += 1;
        Ok(TaskWatch { queue: self, id })
    }

    /// Current snapshot of a task, if known
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.state.lock().tasks.get(&id).cloned()
    }

    /// Dequeue the most urgent task and mark it running
    ///
    /// Returns `None` when nothing is pending.
    pub fn next(&self) -> Option<Task> {
        let mut state = self.state.lock();
        while let Some(entry) = state.heap.pop() {
            let Some(task) = state.tasks.get_mut(&entry.id) else {
                continue;
            };
            if task.sequence != entry.sequence || task.transition(TaskStatus::Running).is_err() {
                continue;
            }
            tracing::debug!("Dequeued task {} ({})", task.id, task.priority);
            return Some(task.clone());
        }
        None
    }

    /// Wait until a task is available, then dequeue it
    pub async fn wait_next(&self) -> Task {
        loop {
            let notified = self.notify.notified();
            if let Some(task) = self.next() {
                return task;
            }
            notified.await;
        }
    }

    /// Mark a running task succeeded
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound` / `QueueError::IllegalTransition`
    pub fn complete(&self, id: TaskId, output_path: Option<PathBuf>) -> Result<Task, QueueError> {
        let mut state = self.state.lock();
        let task = state.task_mut(id)?;
        task.transition(TaskStatus::Succeeded)?;
        task.output_path = output_path;
        task.error_message = None;
        let snapshot = task.clone();
        state.retire(id, self.config.max_retained_tasks);
        Ok(snapshot)
    }

    /// Mark a running or retrying task failed
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound` / `QueueError::IllegalTransition`
    pub fn fail(&self, id: TaskId, message: impl Into<String>) -> Result<Task, QueueError> {
        let mut state = self.state.lock();
        let task = state.task_mut(id)?;
        task.transition(TaskStatus::Failed)?;
        task.error_message = Some(message.into());
        let snapshot = task.clone();
        state.retire(id, self.config.max_retained_tasks);
        Ok(snapshot)
    }

    /// Park a running task after a successful repair; bumps `retry_count`
    ///
    /// The task is not dequeued again until [`Self::requeue`].
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound` / `QueueError::IllegalTransition`
    pub fn mark_retrying(&self, id: TaskId, message: impl Into<String>) -> Result<Task, QueueError> {
        let mut state = self.state.lock();
        let task = state.task_mut(id)?;
        task.transition(TaskStatus::Retrying)?;
        task.retry_count += 1;
        task.error_message = Some(message.into());
        Ok(task.clone())
    }

    /// Put a retrying task back in the queue under a fresh sequence number
    ///
    /// Priority is unchanged.
    ///
    /// # Errors
    /// - `QueueError::TaskNotFound`, or `QueueError::IllegalTransition` if
    ///   the task is not retrying
    pub fn requeue(&self, id: TaskId) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            let task = state.task_mut(id)?;
            if task.status != TaskStatus::Retrying {
                return Err(QueueError::IllegalTransition {
                    id,
                    from: task.status,
                    to: TaskStatus::Pending,
                });
            }
            let task = task.clone();
            state.enqueue(task);
        }
        self.notify.notify_one();
        tracing::info!("Requeued task {}", id);
        Ok(())
    }

    /// Tasks waiting to be dequeued
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Tasks currently held by workers
    #[must_use]
    pub fn running(&self) -> usize {
        self.state
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    /// Known task count (live and retained)
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Whether no task is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every known task, in sequence order
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.export().0
    }

    /// Every known task plus the next sequence number, read atomically
    #[must_use]
    pub fn export(&self) -> (Vec<Task>, u64) {
        let state = self.state.lock();
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.sequence);
        (tasks, state.next_sequence)
    }

    /// Next sequence number to be assigned
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.state.lock().next_sequence
    }

    /// Replace the queue contents with restored tasks
    ///
    /// Finished tasks are kept for queries; unfinished ones are re-enqueued
    /// as pending in their original order. The sequence counter resumes
    /// above every restored sequence. Returns the number re-enqueued.
    pub fn restore(&self, tasks: Vec<Task>, next_sequence: u64) -> usize {
        let mut finished: Vec<Task> = Vec::new();
        let mut unfinished: Vec<Task> = Vec::new();
        for task in tasks {
            if task.status.is_terminal() {
                finished.push(task);
            } else {
                unfinished.push(task);
            }
        }
        finished.sort_by_key(|t| t.completed_at);
        unfinished.sort_by_key(|t| t.sequence);

        let highest = finished
            .iter()
            .chain(&unfinished)
            .map(|t| t.sequence + 1)
            .max()
            .unwrap_or(0);

        let requeued = unfinished.len();
        {
            let mut state = self.state.lock();
            let watched = std::mem::take(&mut state.watched);
            *state = QueueState {
                next_sequence: next_sequence.max(highest),
                watched,
                ..QueueState::default()
            };

            for task in finished {
                let id = task.id;
                state.tasks.insert(id, task);
                state.retire(id, self.config.max_retained_tasks);
            }
            for mut task in unfinished {
                task.status = TaskStatus::Pending;
                task.started_at = None;
                state.enqueue(task);
            }
        }
        self.notify.notify_waiters();

        tracing::info!("Restored queue state, {} task(s) re-enqueued", requeued);
        requeued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submit(queue: &TaskQueue, priority: Priority) -> TaskId {
        queue
            .submit("generate_prefab", json!({}), priority)
            .unwrap()
    }

    #[test]
    fn empty_queue_yields_none() {
        let queue = TaskQueue::default();
        assert!(queue.next().is_none());
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn next_marks_running() {
        let queue = TaskQueue::default();
        let id = submit(&queue, Priority::Normal);

        let task = queue.next().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(queue.running(), 1);
        assert_eq!(queue.status(id).unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn invalid_submission_leaves_queue_unchanged() {
        let queue = TaskQueue::default();
        submit(&queue, Priority::Low);
        let sequence = queue.next_sequence();

        assert!(queue.submit("", json!({}), Priority::High).is_err());
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.next_sequence(), sequence);
    }

    #[test]
    fn retry_keeps_priority_and_bumps_sequence() {
        let queue = TaskQueue::default();
        let id = submit(&queue, Priority::High);
        let first = queue.next().unwrap();

        queue.mark_retrying(id, "TimeoutError").unwrap();
        assert!(queue.next().is_none());

        queue.requeue(id).unwrap();
        let again = queue.next().unwrap();
        assert_eq!(again.priority, Priority::High);
        assert_eq!(again.retry_count, 1);
        assert!(again.sequence > first.sequence);
    }

    #[test]
    fn requeue_requires_retrying() {
        let queue = TaskQueue::default();
        let id = submit(&queue, Priority::Normal);
        assert!(matches!(
            queue.requeue(id),
            Err(QueueError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn unknown_task_is_not_found() {
        let queue = TaskQueue::default();
        assert!(matches!(
            queue.status(TaskId::new()),
            Err(QueueError::TaskNotFound(_))
        ));
    }

    #[test]
    fn finished_standalone_tasks_are_evicted_oldest_first() {
        let queue = TaskQueue::new(QueueConfig::default().with_max_retained_tasks(2));
        let ids: Vec<TaskId> = (0..3).map(|_| submit(&queue, Priority::Normal)).collect();

        for _ in 0..3 {
            let task = queue.next().unwrap();
            queue.complete(task.id, None).unwrap();
        }

        assert!(queue.get(ids[0]).is_none());
        assert!(queue.get(ids[1]).is_some());
        assert!(queue.get(ids[2]).is_some());
    }

    #[test]
    fn watched_task_outlives_retention_until_released() {
        let queue = TaskQueue::new(QueueConfig::default().with_max_retained_tasks(1));
        let watched = submit(&queue, Priority::High);
        let others: Vec<TaskId> = (0..2).map(|_| submit(&queue, Priority::Low)).collect();
        let watch = queue.watch(watched).unwrap();

        for _ in 0..3 {
            let task = queue.next().unwrap();
            queue.complete(task.id, None).unwrap();
        }

        assert_eq!(watch.current().unwrap().status, TaskStatus::Succeeded);
        assert!(queue.get(others[0]).is_none());
        assert!(queue.get(others[1]).is_some());

        drop(watch);
        assert!(queue.get(watched).is_none());
        assert!(queue.get(others[1]).is_some());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn watching_unknown_task_is_not_found() {
        let queue = TaskQueue::default();
        assert!(matches!(
            queue.watch(TaskId::new()),
            Err(QueueError::TaskNotFound(_))
        ));
    }

    #[test]
    fn restore_requeues_unfinished_and_resumes_sequence() {
        let queue = TaskQueue::default();
        let done = submit(&queue, Priority::Low);
        let busy = submit(&queue, Priority::Low);
        let waiting = submit(&queue, Priority::Low);

        queue.next().unwrap();
        queue.complete(done, None).unwrap();
        queue.next().unwrap();

        let (tasks, next_sequence) = queue.export();
        let restored = TaskQueue::default();
        assert_eq!(restored.restore(tasks, next_sequence), 2);

        assert_eq!(restored.status(done).unwrap().status, TaskStatus::Succeeded);
        assert_eq!(restored.next().unwrap().id, busy);
        assert_eq!(restored.next().unwrap().id, waiting);
        assert!(restored.next_sequence() >= next_sequence);
    }

    #[tokio::test]
    async fn wait_next_wakes_on_submit() {
        let queue = std::sync::Arc::new(TaskQueue::default());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_next().await })
        };

        tokio::task::yield_now().await;
        let id = submit(&queue, Priority::Critical);

        let task = tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.id, id);
    }
}
