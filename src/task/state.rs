//! Task State Store - progress of every task started in this process.
//!
//! Progress is monotonic: `sent` never decreases and never exceeds `total`.
//! Finished is terminal.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Created,
    Handshaking,
    Running,
    Finished,
}

impl TaskPhase {
    /// Externally reported status for this phase.
    pub fn status(self) -> TaskStatus {
        match self {
            TaskPhase::Finished => TaskStatus::Finished,
            _ => TaskStatus::Running,
        }
    }
}

/// Status as reported by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// No task to report.
    Idle,
    /// Created, handshaking or sending.
    Running,
    /// Loop ended, successfully or not.
    Finished,
}

/// Snapshot of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_id: String,
    pub phase: TaskPhase,
    pub status: TaskStatus,
    /// Completed units.
    pub sent: u32,
    pub total: u32,
}

impl TaskProgress {
    fn new(task_id: &str, total: u32) -> Self {
        Self {
            task_id: task_id.to_string(),
            phase: TaskPhase::Created,
            status: TaskStatus::Running,
            sent: 0,
            total,
        }
    }

    /// Whether every unit completed.
    pub fn is_complete(&self) -> bool {
        self.sent == self.total
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tasks: HashMap<String, TaskProgress>,
    current: Option<String>,
}

/// Shared, thread-safe task registry.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task at `Created` and make it current.
    ///
    /// Re-creating an existing id is ignored.
    pub fn create(&self, task_id: &str, total: u32) {
        let mut inner = self.inner.write();
        inner
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskProgress::new(task_id, total));
        inner.current = Some(task_id.to_string());
    }

    /// Move a task forward to `phase`. Never leaves `Finished` and never
    /// moves backwards.
    pub fn set_phase(&self, task_id: &str, phase: TaskPhase) {
        let mut inner = self.inner.write();
        if let Some(task) = inner.tasks.get_mut(task_id) {
            if task.phase != TaskPhase::Finished && phase_rank(phase) > phase_rank(task.phase) {
                task.phase = phase;
                task.status = phase.status();
            }
        }
    }

    /// Record `sent` completed units; lower values are ignored and the
    /// count is capped at `total`.
    pub fn advance(&self, task_id: &str, sent: u32) {
        let mut inner = self.inner.write();
        if let Some(task) = inner.tasks.get_mut(task_id) {
            let sent = sent.min(task.total);
            if sent > task.sent {
                task.sent = sent;
            }
        }
    }

    /// Mark a task finished. Idempotent.
    pub fn finish(&self, task_id: &str) {
        self.set_phase(task_id, TaskPhase::Finished);
    }

    pub fn get(&self, task_id: &str) -> Option<TaskProgress> {
        self.inner.read().tasks.get(task_id).cloned()
    }

    /// The most recently created task, unless cleared.
    pub fn current(&self) -> Option<TaskProgress> {
        let inner = self.inner.read();
        inner
            .current
            .as_ref()
            .and_then(|id| inner.tasks.get(id))
            .cloned()
    }

    /// Drop the current pointer if that task has finished.
    ///
    /// A task still running stays current.
    pub fn clear_finished_current(&self) {
        let mut inner = self.inner.write();
        let finished = match inner.current.as_ref().and_then(|id| inner.tasks.get(id)) {
            Some(task) => task.phase == TaskPhase::Finished,
            None => true,
        };
        if finished {
            inner.current = None;
        }
    }

    /// Number of tasks recorded.
    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn phase_rank(phase: TaskPhase) -> u8 {
    match phase {
        TaskPhase::Created => 0,
        TaskPhase::Handshaking => 1,
        TaskPhase::Running => 2,
        TaskPhase::Finished => 3,
    }
}
