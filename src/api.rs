//! Response bodies of the control surface.
//!
//! These serialize to the JSON an HTTP layer returns as-is:
//!
//! ```text
//! start_task  → {"task_id":"…","status":"started"} | {"error":"busy"}
//! task_status → {"status":"idle|running|finished","taskId":…,"sent":…,"total":…}
//! logout      → {"status":"logged_out"}
//! ```

use serde::Serialize;

use crate::client::TaskTicket;
use crate::error::{ChannelError, Result};
use crate::task::{TaskProgress, TaskStatus};

/// Body returned by `start_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StartTaskResponse {
    Started {
        task_id: String,
        status: &'static str,
    },
    Rejected {
        error: String,
    },
}

impl StartTaskResponse {
    /// Error string used when the guard is held.
    pub const BUSY: &'static str = "busy";

    pub fn started(task_id: impl Into<String>) -> Self {
        StartTaskResponse::Started {
            task_id: task_id.into(),
            status: "started",
        }
    }

    pub fn busy() -> Self {
        StartTaskResponse::Rejected {
            error: Self::BUSY.to_string(),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, StartTaskResponse::Rejected { error } if error == Self::BUSY)
    }
}

impl From<&Result<TaskTicket>> for StartTaskResponse {
    fn from(result: &Result<TaskTicket>) -> Self {
        match result {
            Ok(ticket) => StartTaskResponse::started(ticket.task_id.clone()),
            Err(ChannelError::Busy) => StartTaskResponse::busy(),
            Err(e) => StartTaskResponse::Rejected {
                error: e.to_string(),
            },
        }
    }
}

/// Body returned by `task_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusReport {
    pub status: TaskStatus,
    pub task_id: Option<String>,
    pub sent: u32,
    pub total: u32,
}

impl TaskStatusReport {
    /// No current task.
    pub fn idle() -> Self {
        Self {
            status: TaskStatus::Idle,
            task_id: None,
            sent: 0,
            total: 0,
        }
    }
}

impl From<TaskProgress> for TaskStatusReport {
    fn from(progress: TaskProgress) -> Self {
        Self {
            status: progress.status,
            task_id: Some(progress.task_id),
            sent: progress.sent,
            total: progress.total,
        }
    }
}

/// Body returned by `logout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutResponse {
    pub status: &'static str,
}

impl LogoutResponse {
    pub fn logged_out() -> Self {
        Self {
            status: "logged_out",
        }
    }
}
