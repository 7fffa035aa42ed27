//! Task Runner - drives one task from connect to finish.
//!
//! `Created → Handshaking → Running → Finished`. The runner opens the
//! connection, starts the router, performs the handshake, starts the
//! heartbeat monitor and then sends one `UserActivityNotify` per unit,
//! taking the next queued message as its acknowledgment before the next. Any failure ends the
//! loop; progress made so far is kept. Whatever happens, every activity is
//! stopped and the task is marked finished before [`TaskRunner::run`]
//! returns.

use std::sync::Arc;

use crate::config::ChannelConfig;
use crate::connection::ConnectionManager;
use crate::control::{Handshake, HeartbeatMonitor};
use crate::error::{ChannelError, Result};
use crate::protocol::{new_req_id, Message, MessageName};
use crate::router::MessageRouter;
use crate::session::{Activities, Session};

use super::state::{TaskPhase, TaskStore};

/// Outcome of one run.
#[derive(Debug)]
pub struct TaskReport {
    pub task_id: String,
    /// Acknowledged units.
    pub sent: u32,
    pub total: u32,
    /// Why the loop stopped early, if it did.
    pub error: Option<ChannelError>,
}

impl TaskReport {
    /// Whether every unit was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.sent == self.total
    }
}

/// Runs tasks over a shared connection manager.
#[derive(Clone)]
pub struct TaskRunner {
    config: Arc<ChannelConfig>,
    conn: Arc<ConnectionManager>,
    store: TaskStore,
}

impl TaskRunner {
    pub fn new(config: Arc<ChannelConfig>, conn: Arc<ConnectionManager>, store: TaskStore) -> Self {
        Self {
            config,
            conn,
            store,
        }
    }

    /// Record a task at `Created` so it is visible before it starts.
    pub fn register(&self, task_id: &str, total: u32) {
        self.store.create(task_id, total);
    }

    /// Run a task to completion.
    ///
    /// Never fails: errors end the loop and are returned in the report.
    pub async fn run(&self, task_id: &str, total: u32, session_token: &str) -> TaskReport {
        self.register(task_id, total);

        let mut session = Session::new(self.config.endpoint.clone(), session_token);
        let mut activities = Activities::new();

        let result = self.drive(task_id, total, &mut session, &mut activities).await;

        activities
            .shutdown(&self.conn, self.config.shutdown_grace())
            .await;
        self.store.finish(task_id);

        let sent = self.store.get(task_id).map(|t| t.sent).unwrap_or(0);
        let error = match result {
            Ok(()) => {
                tracing::info!(task_id, sent, total, "Task finished");
                None
            }
            Err(e) if e.is_disconnect() => {
                tracing::warn!(task_id, sent, total, "Task stopped: connection lost");
                Some(e)
            }
            Err(e) => {
                tracing::error!(task_id, sent, total, error = %e, "Task stopped early");
                Some(e)
            }
        };

        TaskReport {
            task_id: task_id.to_string(),
            sent,
            total,
            error,
        }
    }

    async fn drive(
        &self,
        task_id: &str,
        total: u32,
        session: &mut Session,
        activities: &mut Activities,
    ) -> Result<()> {
        self.store.set_phase(task_id, TaskPhase::Handshaking);
        self.conn.open(session.endpoint()).await?;

        let frames = self.conn.take_frames().ok_or(ChannelError::Disconnected)?;
        let (mut queue, router) =
            MessageRouter::spawn(frames, self.conn.clone(), self.config.exchange_timeout());
        queue.set_req_id_check(self.config.check_req_id);
        activities.set_router(router);

        let identity = Handshake::new(&self.config.profile)
            .run(&self.conn, &mut queue, session)
            .await?;

        let heartbeat =
            HeartbeatMonitor::new(self.config.heartbeat_interval(), self.config.heartbeat_jitter())
                .spawn(self.conn.clone());
        activities.set_heartbeat(heartbeat);

        self.store.set_phase(task_id, TaskPhase::Running);
        tracing::info!(task_id, total, "Task running");

        for unit in 1..=total {
            if !self.conn.is_connected() {
                tracing::warn!(task_id, unit, "Connection lost, stopping");
                return Err(ChannelError::Disconnected);
            }

            let req_id = new_req_id();
            let request = Message::user_activity(
                &self.config.profile,
                &self.config.activity,
                &identity,
                &req_id,
            );
            tracing::trace!(task_id, unit, req_id = %req_id, "Sending unit");
            self.conn.send(&request).await?;
            queue
                .next_reply(&MessageName::UserActivityNotifyResp, Some(&req_id))
                .await?;

            self.store.advance(task_id, unit);
            tracing::debug!(task_id, unit, total, "Unit acknowledged");
        }

        Ok(())
    }
}
