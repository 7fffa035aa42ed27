//! Session Guard - single-flight admission of tasks.
//!
//! At most one task holds the guard. [`SessionGuard::try_acquire`] never
//! waits: a held guard means "busy". The returned [`SessionPermit`]
//! releases on drop, so every exit path of a task frees the guard.
//! [`SessionGuard::release`] force-releases (logout); a permit from a
//! force-released task is stale and its drop leaves newer holders alone.
//!
//! The guard also owns the active task's id and `JoinHandle`, so logout
//! can wait for or abort it before letting the next task in. A holder
//! handed out by [`SessionGuard::take_active`] stays held after its permit
//! drops; only [`SessionGuard::release_generation`] frees it.
//!
//! # Example
//!
//! ```
//! use wbchannel_client::guard::SessionGuard;
//!
//! let guard = SessionGuard::new();
//! let permit = guard.try_acquire("t1").unwrap();
//! assert!(guard.try_acquire("t2").is_none());
//!
//! drop(permit);
//! assert!(guard.try_acquire("t2").is_some());
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct ActiveTask {
    task_id: String,
    generation: u64,
    handle: Option<JoinHandle<()>>,
    /// Handed to a teardown; the permit no longer releases it.
    taken: bool,
}

#[derive(Debug, Default)]
struct GuardState {
    next_generation: u64,
    holder: Option<ActiveTask>,
}

/// The active task as handed to whoever tears it down.
#[derive(Debug)]
pub struct TakenTask {
    pub task_id: String,
    /// Generation to pass to [`SessionGuard::release_generation`].
    pub generation: u64,
    /// Handle of the spawned task, if it was attached.
    pub handle: Option<JoinHandle<()>>,
}

/// Exclusive single-task lock.
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    state: Arc<Mutex<GuardState>>,
}

/// Proof of holding the guard. Releases on drop.
#[derive(Debug)]
pub struct SessionPermit {
    state: Arc<Mutex<GuardState>>,
    generation: u64,
    task_id: String,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard for `task_id`, or `None` if it is held.
    pub fn try_acquire(&self, task_id: &str) -> Option<SessionPermit> {
        let mut state = self.state.lock();
        if state.holder.is_some() {
            return None;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        state.holder = Some(ActiveTask {
            task_id: task_id.to_string(),
            generation,
            handle: None,
            taken: false,
        });
        tracing::debug!(task_id, generation, "Session guard acquired");

        Some(SessionPermit {
            state: self.state.clone(),
            generation,
            task_id: task_id.to_string(),
        })
    }

    /// Attach the spawned task's handle to the holder of `generation`.
    ///
    /// Returns `false` if that holder is gone or already taken by a
    /// teardown; the handle is then detached.
    pub fn attach(&self, generation: u64, handle: JoinHandle<()>) -> bool {
        let mut state = self.state.lock();
        match state.holder.as_mut() {
            Some(active) if active.generation == generation && !active.taken => {
                active.handle = Some(handle);
                true
            }
            _ => false,
        }
    }

    /// Force release. Idempotent.
    pub fn release(&self) {
        if let Some(active) = self.state.lock().holder.take() {
            tracing::debug!(task_id = %active.task_id, "Session guard force-released");
        }
    }

    /// Hand the active task to a teardown.
    ///
    /// Returns `None` if the guard is free or the holder was already taken.
    /// The guard stays held, even past the permit's drop, until
    /// [`release_generation`](Self::release_generation) or
    /// [`release`](Self::release).
    pub fn take_active(&self) -> Option<TakenTask> {
        let mut state = self.state.lock();
        let active = state.holder.as_mut().filter(|active| !active.taken)?;
        active.taken = true;
        Some(TakenTask {
            task_id: active.task_id.clone(),
            generation: active.generation,
            handle: active.handle.take(),
        })
    }

    /// Release the guard if `generation` still holds it.
    pub fn release_generation(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        match state.holder.as_ref() {
            Some(active) if active.generation == generation => {
                tracing::debug!(task_id = %active.task_id, "Session guard released after teardown");
                state.holder = None;
                true
            }
            _ => false,
        }
    }

    /// Id of the task holding the guard.
    pub fn active_task_id(&self) -> Option<String> {
        self.state
            .lock()
            .holder
            .as_ref()
            .map(|active| active.task_id.clone())
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().holder.is_some()
    }
}

impl SessionPermit {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Acquisition number, unique per guard.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this permit still owns the guard.
    pub fn is_current(&self) -> bool {
        matches!(
            self.state.lock().holder.as_ref(),
            Some(active) if active.generation == self.generation
        )
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let owned = matches!(
            state.holder.as_ref(),
            Some(active) if active.generation == self.generation && !active.taken
        );
        if owned {
            state.holder = None;
            tracing::debug!(task_id = %self.task_id, "Session guard released");
        }
    }
}
