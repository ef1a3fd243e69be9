// SPDX-License-Identifier: MIT

//! Deduplicated priority queue with retry, stuck recovery, and a dirty bit.
//!
//! All mutations stamp `dirty_at`; the engine's persistence cycle flushes
//! eagerly whenever it is non-zero and calls [`TaskQueue::mark_clean`]
//! after a successful save.

use crate::clock::Clock;
use crate::task::{Task, TaskId, TaskKind, TaskParams, TaskStatus, DEFAULT_MAX_RETRIES};
use std::time::Duration;

/// A task stuck in Running longer than this lost its host mid-execution.
pub const MAX_RUNNING_AGE: Duration = Duration::from_secs(120);

/// Stuck-task recovery runs at most once per this interval.
pub const RECOVERY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Terminal tasks older than this are evicted.
pub const TERMINAL_TASK_TTL: Duration = Duration::from_secs(600);

/// Per-server task queue.
#[derive(Clone)]
pub struct TaskQueue<C: Clock> {
    clock: C,
    tasks: Vec<Task>,
    next_id: TaskId,
    dirty_at_ms: u64,
    last_recovery_ms: u64,
}

impl<C: Clock> TaskQueue<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, tasks: Vec::new(), next_id: 1, dirty_at_ms: 0, last_recovery_ms: 0 }
    }

    /// Add a task, or return `None` if an equivalent non-terminal task exists.
    pub fn add(
        &mut self,
        kind: TaskKind,
        params: TaskParams,
        priority: u8,
        village_id: Option<String>,
        scheduled_for_ms: Option<u64>,
    ) -> Option<TaskId> {
        if self.tasks.iter().any(|t| t.duplicates(kind, village_id.as_deref(), &params)) {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let now_ms = self.clock.epoch_ms();
        self.tasks.push(Task {
            id,
            kind,
            params,
            priority: priority.clamp(1, 10),
            village_id,
            status: TaskStatus::Pending,
            created_at_ms: now_ms,
            scheduled_for_ms,
            retries: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error: None,
            started_at_ms: None,
            finished_at_ms: None,
        });
        self.touch();
        Some(id)
    }

    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Select the next ready task and flip it to Running.
    ///
    /// Runs stuck-task recovery first (throttled), then picks the lowest
    /// priority number among ready tasks, ties broken by earlier creation.
    pub fn get_next(&mut self) -> Option<Task> {
        self.recover_stuck();
        let now_ms = self.clock.epoch_ms();
        let next = self
            .tasks
            .iter_mut()
            .filter(|t| t.is_ready(now_ms))
            .min_by_key(|t| (t.priority, t.created_at_ms, t.id))?;
        next.status = TaskStatus::Running;
        next.started_at_ms = Some(now_ms);
        let task = next.clone();
        self.touch();
        Some(task)
    }

    /// The task `get_next` would return, without claiming it.
    pub fn peek(&self) -> Option<&Task> {
        let now_ms = self.clock.epoch_ms();
        self.tasks
            .iter()
            .filter(|t| t.is_ready(now_ms))
            .min_by_key(|t| (t.priority, t.created_at_ms, t.id))
    }

    /// Apply a patch to a task in place.
    pub fn update(&mut self, id: TaskId, patch: impl FnOnce(&mut Task)) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        patch(task);
        self.touch();
        true
    }

    pub fn mark_completed(&mut self, id: TaskId) -> bool {
        let now_ms = self.clock.epoch_ms();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        task.status = TaskStatus::Completed;
        task.finished_at_ms = Some(now_ms);
        self.evict_old_terminal(now_ms);
        self.touch();
        true
    }

    /// Record a failure: back to Pending below the retry cap, Failed at it.
    pub fn mark_failed(&mut self, id: TaskId, error: impl Into<String>) -> bool {
        let now_ms = self.clock.epoch_ms();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        task.retries += 1;
        task.error = Some(error.into());
        if task.retries >= task.max_retries {
            task.status = TaskStatus::Failed;
            task.finished_at_ms = Some(now_ms);
        } else {
            task.status = TaskStatus::Pending;
            task.started_at_ms = None;
        }
        self.evict_old_terminal(now_ms);
        self.touch();
        true
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Pending).count()
    }

    pub fn clear(&mut self) {
        if !self.tasks.is_empty() {
            self.tasks.clear();
            self.touch();
        }
    }

    pub fn clear_completed(&mut self) {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.status.is_terminal());
        if self.tasks.len() != before {
            self.touch();
        }
    }

    pub fn has_task_of_type(&self, kind: TaskKind, village_id: Option<&str>) -> bool {
        self.tasks.iter().any(|t| {
            t.kind == kind && !t.status.is_terminal() && t.village_id.as_deref() == village_id
        })
    }

    pub fn has_any_task_of_type(&self, kind: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind && !t.status.is_terminal())
    }

    /// Epoch ms of the last mutation, or 0 after `mark_clean`.
    pub fn dirty_at(&self) -> u64 {
        self.dirty_at_ms
    }

    pub fn mark_clean(&mut self) {
        self.dirty_at_ms = 0;
    }

    /// Replace queue contents from a persisted snapshot.
    ///
    /// Tasks restored in Running lost their host; they go back to Pending.
    /// Does not mark the queue dirty: restored state is by definition the
    /// state that was last saved.
    pub fn restore(&mut self, tasks: Vec<Task>) {
        self.next_id = tasks.iter().map(|t| t.id + 1).max().unwrap_or(1);
        self.tasks = tasks;
        for task in &mut self.tasks {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
                task.started_at_ms = None;
            }
        }
    }

    fn touch(&mut self) {
        self.dirty_at_ms = self.clock.epoch_ms();
    }

    fn evict_old_terminal(&mut self, now_ms: u64) {
        let ttl_ms = TERMINAL_TASK_TTL.as_millis() as u64;
        self.tasks.retain(|t| {
            !(t.status.is_terminal()
                && t.finished_at_ms.map(|f| now_ms.saturating_sub(f) > ttl_ms).unwrap_or(false))
        });
    }

    /// Requeue or fail tasks stuck in Running past [`MAX_RUNNING_AGE`].
    ///
    /// Throttled to once per [`RECOVERY_CHECK_INTERVAL`]. This is the only
    /// path out of Running other than completion or failure.
    fn recover_stuck(&mut self) {
        let now_ms = self.clock.epoch_ms();
        let interval_ms = RECOVERY_CHECK_INTERVAL.as_millis() as u64;
        if now_ms.saturating_sub(self.last_recovery_ms) < interval_ms {
            return;
        }
        self.last_recovery_ms = now_ms;
        let max_age_ms = MAX_RUNNING_AGE.as_millis() as u64;
        let mut mutated = false;
        for task in &mut self.tasks {
            if task.status != TaskStatus::Running {
                continue;
            }
            let age = task.started_at_ms.map(|s| now_ms.saturating_sub(s)).unwrap_or(0);
            if age <= max_age_ms {
                continue;
            }
            task.retries += 1;
            if task.retries >= task.max_retries {
                task.status = TaskStatus::Failed;
                task.error = Some(format!("stuck in running for {}ms", age));
                task.finished_at_ms = Some(now_ms);
            } else {
                task.status = TaskStatus::Pending;
                task.started_at_ms = None;
            }
            mutated = true;
        }
        if mutated {
            self.touch();
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
