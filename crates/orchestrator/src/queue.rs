//! Priority queue of workflow tasks with dependency gating.
//!
//! Ordering is (priority desc, submission sequence asc). A retried or
//! dependency-blocked task keeps its original sequence number, so it does
//! not lose its place among equal-priority work. All state sits behind one
//! std `Mutex` that is never held across an `.await`.
//!
//! Finished records are kept for status queries up to a retention cap and
//! evicted oldest first, except while an unfinished task still depends on
//! them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use pathweave_core::{FeatureStatus, PathweaveError, TaskId};
use pathweave_resource::FeatureFlagRegistry;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;
use crate::task::{CancelReason, Priority, TaskRecord, TaskStatus, WorkflowTask};

// ── Heap entries ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: Priority,
    seq: u64,
    ready_at: Instant,
    id: TaskId,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority first, then lower seq.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

// ── Slots ───────────────────────────────────────────────────────────

struct Slot {
    task: WorkflowTask,
    record: TaskRecord,
    seq: u64,
    token: Option<CancellationToken>,
    /// Set while Running; the worker settles the task as Cancelled.
    cancel_requested: Option<CancelReason>,
}

impl Slot {
    fn move_to(&mut self, next: TaskStatus) {
        if let Err(e) = self.record.transition(next) {
            warn!(task = %self.task.id, error = %e, "rejected task transition");
        }
    }

    fn cancel(&mut self, reason: CancelReason) {
        debug!(task = %self.task.id, %reason, "task cancelled");
        self.move_to(TaskStatus::Cancelled);
        self.record.cancel_reason = Some(reason);
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    /// Ask a running handler to stop. False if already asked.
    fn request_cancel(&mut self, reason: CancelReason) -> bool {
        if self.cancel_requested.is_some() {
            return false;
        }
        self.cancel_requested = Some(reason);
        if let Some(token) = &self.token {
            token.cancel();
        }
        true
    }
}

enum Deps {
    Ready,
    Waiting,
    Broken(TaskId),
}

fn dependency_state(slots: &HashMap<TaskId, Slot>, deps: &[TaskId]) -> Deps {
    let mut waiting = false;
    for dep in deps {
        match slots.get(dep).map(|s| s.record.status) {
            Some(TaskStatus::Completed) => {}
            Some(TaskStatus::Failed | TaskStatus::Cancelled) => return Deps::Broken(*dep),
            // unknown ids count as unmet
            _ => waiting = true,
        }
    }
    if waiting {
        Deps::Waiting
    } else {
        Deps::Ready
    }
}

struct QueueState {
    heap: BinaryHeap<Entry>,
    slots: HashMap<TaskId, Slot>,
    next_seq: u64,
    closed: bool,
    /// Finished task ids, oldest first.
    finished: VecDeque<TaskId>,
    /// Unfinished dependents per dependency id.
    dependents: HashMap<TaskId, usize>,
    retention: usize,
}

impl QueueState {
    fn new(retention: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
            next_seq: 0,
            closed: false,
            finished: VecDeque::new(),
            dependents: HashMap::new(),
            retention,
        }
    }

    fn admit(&mut self, task: WorkflowTask) -> Result<(TaskId, u64), OrchestratorError> {
        if self.closed {
            return Err(OrchestratorError::ShuttingDown);
        }
        if self.slots.contains_key(&task.id) {
            return Err(OrchestratorError::Validation(format!(
                "task {} already submitted",
                task.id
            )));
        }
        let id = task.id;
        let seq = self.next_seq;
        self.next_seq += 1;
        for dep in &task.dependencies {
            *self.dependents.entry(*dep).or_default() += 1;
        }
        let record = TaskRecord::pending(&task);
        self.slots.insert(
            id,
            Slot {
                task,
                record,
                seq,
                token: None,
                cancel_requested: None,
            },
        );
        Ok((id, seq))
    }

    /// Book a task that just reached a terminal status.
    fn retire(&mut self, id: TaskId) {
        if let Some(slot) = self.slots.get(&id) {
            for dep in &slot.task.dependencies {
                if let Some(count) = self.dependents.get_mut(dep) {
                    *count -= 1;
                    if *count == 0 {
                        self.dependents.remove(dep);
                    }
                }
            }
        }
        self.finished.push_back(id);
        self.evict(self.retention);
    }

    /// Drop the oldest finished records beyond `keep`. Records some
    /// unfinished task depends on are skipped.
    fn evict(&mut self, keep: usize) -> usize {
        let mut excess = self.finished.len().saturating_sub(keep);
        let mut unchecked = self.finished.len();
        let mut evicted = 0;
        while excess > 0 && unchecked > 0 {
            let Some(id) = self.finished.pop_front() else {
                break;
            };
            unchecked -= 1;
            if self.dependents.contains_key(&id) {
                self.finished.push_back(id);
                continue;
            }
            self.slots.remove(&id);
            excess -= 1;
            evicted += 1;
        }
        evicted
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// A task handed to a worker for one attempt.
#[derive(Debug, Clone)]
pub struct Lease {
    pub task: WorkflowTask,
    /// 1-based attempt number.
    pub attempt: u32,
    pub token: CancellationToken,
}

/// How a worker ended one attempt.
#[derive(Debug, Clone)]
pub enum Settlement {
    Completed(serde_json::Value),
    Retry { error: String, after: Duration },
    Failed(String),
    /// Cancelled by the handler or the token; the requested reason wins.
    Cancelled(Option<CancelReason>),
}

pub struct WorkflowQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    dependency_retry: Duration,
}

impl WorkflowQueue {
    /// `retention` caps how many finished records stay queryable.
    pub fn new(dependency_retry: Duration, retention: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::new(retention.max(1))),
            notify: Notify::new(),
            dependency_retry,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a pending task.
    pub fn push(&self, task: WorkflowTask) -> Result<TaskId, OrchestratorError> {
        let priority = task.priority;
        let mut state = self.state();
        let (id, seq) = state.admit(task)?;
        state.heap.push(Entry {
            priority,
            seq,
            ready_at: Instant::now(),
            id,
        });
        drop(state);
        self.notify.notify_one();
        Ok(id)
    }

    /// Record a task as Cancelled without queueing it.
    pub fn reject(&self, task: WorkflowTask, reason: CancelReason) -> Result<TaskId, OrchestratorError> {
        let mut state = self.state();
        let (id, _) = state.admit(task)?;
        if let Some(slot) = state.slots.get_mut(&id) {
            slot.cancel(reason);
        }
        state.retire(id);
        Ok(id)
    }

    /// Hand out the best ready task, marking it Running.
    ///
    /// Tasks with unmet dependencies go back with a delay; tasks whose
    /// dependency failed, or whose feature is now disabled, are cancelled.
    pub fn try_dequeue(&self, registry: &FeatureFlagRegistry) -> Option<Lease> {
        let now = Instant::now();
        let mut guard = self.state();
        let state = &mut *guard;
        let mut deferred = Vec::new();
        let mut retired = Vec::new();
        let mut lease = None;

        while let Some(entry) = state.heap.pop() {
            let Some(slot) = state.slots.get(&entry.id) else {
                continue;
            };
            // cancelled while queued
            if slot.record.status != TaskStatus::Pending {
                continue;
            }
            if entry.ready_at > now {
                deferred.push(entry);
                continue;
            }

            let deps = dependency_state(&state.slots, &slot.task.dependencies);
            let feature = slot.task.payload.feature();
            let Some(slot) = state.slots.get_mut(&entry.id) else {
                continue;
            };
            match deps {
                Deps::Ready => {}
                Deps::Waiting => {
                    deferred.push(Entry {
                        ready_at: now + self.dependency_retry,
                        ..entry
                    });
                    continue;
                }
                Deps::Broken(dependency) => {
                    slot.cancel(CancelReason::DependencyFailed { dependency });
                    retired.push(entry.id);
                    continue;
                }
            }

            if let Err(PathweaveError::FeatureDisabled { feature, level }) = registry.check(feature) {
                slot.cancel(CancelReason::FeatureDisabled { feature, level });
                retired.push(entry.id);
                continue;
            }

            slot.move_to(TaskStatus::Running);
            slot.record.attempts += 1;
            let token = CancellationToken::new();
            slot.token = Some(token.clone());
            lease = Some(Lease {
                task: slot.task.clone(),
                attempt: slot.record.attempts,
                token,
            });
            break;
        }

        state.heap.extend(deferred);
        let settled_any = !retired.is_empty();
        for id in retired {
            state.retire(id);
        }
        drop(guard);
        if settled_any {
            self.notify.notify_waiters();
        }
        lease
    }

    /// Record the outcome of a leased attempt. Returns the resulting status.
    pub fn settle(&self, id: TaskId, settlement: Settlement) -> Option<TaskStatus> {
        let mut guard = self.state();
        let state = &mut *guard;
        let closed = state.closed;
        let slot = state.slots.get_mut(&id)?;
        if slot.record.status != TaskStatus::Running {
            return Some(slot.record.status);
        }
        slot.token = None;
        let requested = slot.cancel_requested.take();

        let mut requeue = None;
        match (settlement, requested) {
            (Settlement::Completed(value), _) => {
                slot.record.result = Some(value);
                slot.move_to(TaskStatus::Completed);
            }
            (Settlement::Cancelled(reason), requested) => {
                slot.cancel(requested.or(reason).unwrap_or(CancelReason::Requested));
            }
            (Settlement::Retry { error, .. } | Settlement::Failed(error), Some(reason)) => {
                slot.record.error = Some(error);
                slot.cancel(reason);
            }
            (Settlement::Retry { error, .. }, None) if closed => {
                slot.record.error = Some(error);
                slot.cancel(CancelReason::Shutdown);
            }
            (Settlement::Retry { error, after }, None) => {
                slot.record.error = Some(error);
                slot.move_to(TaskStatus::Pending);
                requeue = Some(Entry {
                    priority: slot.task.priority,
                    seq: slot.seq,
                    ready_at: Instant::now() + after,
                    id,
                });
            }
            (Settlement::Failed(error), None) => {
                slot.record.error = Some(error);
                slot.move_to(TaskStatus::Failed);
            }
        }
        let status = slot.record.status;
        if let Some(entry) = requeue {
            state.heap.push(entry);
        }
        if status.is_terminal() {
            state.retire(id);
        }
        drop(guard);
        // dependents may now be runnable or cancellable
        self.notify.notify_waiters();
        Some(status)
    }

    /// Cancel one task. Pending tasks leave the queue immediately; running
    /// ones are signalled through their token. False if already terminal.
    pub fn cancel(&self, id: TaskId) -> Result<bool, OrchestratorError> {
        let mut state = self.state();
        let slot = state
            .slots
            .get_mut(&id)
            .ok_or(OrchestratorError::UnknownTask(id))?;
        match slot.record.status {
            TaskStatus::Pending => {
                slot.cancel(CancelReason::Requested);
                state.retire(id);
                Ok(true)
            }
            TaskStatus::Running => Ok(slot.request_cancel(CancelReason::Requested)),
            _ => Ok(false),
        }
    }

    /// Bulk-cancel pending tasks whose feature is disabled right now.
    pub fn drain_disabled(&self, registry: &FeatureFlagRegistry) -> usize {
        let level = registry.level();
        let mut state = self.state();
        let mut cancelled = Vec::new();
        for (id, slot) in state.slots.iter_mut() {
            if slot.record.status != TaskStatus::Pending {
                continue;
            }
            let feature = slot.task.payload.feature();
            if registry.status(feature) == FeatureStatus::Disabled {
                slot.cancel(CancelReason::FeatureDisabled { feature, level });
                cancelled.push(*id);
            }
        }
        let drained = cancelled.len();
        for id in cancelled {
            state.retire(id);
        }
        if drained > 0 {
            info!(drained, %level, "drained pending tasks for disabled features");
        }
        drained
    }

    /// Signal running tasks for which `reason_for` returns a reason.
    pub fn cancel_running_where(
        &self,
        reason_for: impl Fn(&WorkflowTask) -> Option<CancelReason>,
    ) -> usize {
        let mut state = self.state();
        state
            .slots
            .values_mut()
            .filter(|slot| slot.record.status == TaskStatus::Running)
            .filter_map(|slot| reason_for(&slot.task).map(|reason| slot.request_cancel(reason)))
            .filter(|&signalled| signalled)
            .count()
    }

    /// Stop accepting tasks and wake every waiter.
    pub fn close(&self) {
        self.state().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Cancel all pending tasks and signal all running ones.
    /// Returns (pending cancelled, running signalled).
    pub fn cancel_all(&self, reason: CancelReason) -> (usize, usize) {
        let mut state = self.state();
        let mut cancelled = Vec::new();
        let mut running = 0;
        for (id, slot) in state.slots.iter_mut() {
            match slot.record.status {
                TaskStatus::Pending => {
                    slot.cancel(reason.clone());
                    cancelled.push(*id);
                }
                TaskStatus::Running => {
                    if slot.request_cancel(reason.clone()) {
                        running += 1;
                    }
                }
                _ => {}
            }
        }
        state.heap.clear();
        let pending = cancelled.len();
        for id in cancelled {
            state.retire(id);
        }
        (pending, running)
    }

    /// Drop every finished record no unfinished task depends on.
    pub fn purge_finished(&self) -> usize {
        let purged = self.state().evict(0);
        if purged > 0 {
            info!(purged, "purged finished task records");
        }
        purged
    }

    /// Task records currently held, finished ones included.
    pub fn record_count(&self) -> usize {
        self.state().slots.len()
    }

    pub fn status(&self, id: TaskId) -> Option<TaskRecord> {
        self.state().slots.get(&id).map(|s| s.record.clone())
    }

    /// Number of Pending tasks.
    pub fn depth(&self) -> usize {
        self.count(TaskStatus::Pending)
    }

    pub fn running_count(&self) -> usize {
        self.count(TaskStatus::Running)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.state()
            .slots
            .values()
            .filter(|s| s.record.status == status)
            .count()
    }

    pub fn pending_by_priority(&self) -> HashMap<Priority, usize> {
        let mut out = HashMap::new();
        for slot in self.state().slots.values() {
            if slot.record.status == TaskStatus::Pending {
                *out.entry(slot.task.priority).or_default() += 1;
            }
        }
        out
    }

    /// Wait for a wake-up, at most `max`.
    pub async fn wait(&self, max: Duration) {
        let _ = tokio::time::timeout(max, self.notify.notified()).await;
    }
}
