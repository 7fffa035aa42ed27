//! Task module - the long-running business loop and its bookkeeping.

mod runner;
mod state;

pub use runner::{TaskReport, TaskRunner};
pub use state::{TaskPhase, TaskProgress, TaskStatus, TaskStore};
