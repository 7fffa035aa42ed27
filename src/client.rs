//! Orchestrator builder and control surface.
//!
//! The [`OrchestratorBuilder`] provides a fluent API over [`ChannelConfig`]
//! and the transport. The [`Orchestrator`] is what a caller (an HTTP layer,
//! a CLI) drives:
//! 1. `start_task` - admit one task through the session guard and spawn it
//! 2. `task_status` - report the current task's progress
//! 3. `logout` - close the connection, stop the task, release the guard
//!
//! # Example
//!
//! ```ignore
//! use wbchannel_client::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::builder()
//!         .invoker_id("306177")
//!         .build()?;
//!
//!     let ticket = orchestrator.start_task(5, "session-token").await?;
//!     println!("{}", serde_json::to_string(&orchestrator.task_status())?);
//!
//!     let report = ticket.wait().await;
//!     println!("{report:?}");
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::api::{LogoutResponse, TaskStatusReport};
use crate::config::{ActivityProfile, ChannelConfig, ClientProfile};
use crate::connection::ConnectionManager;
use crate::error::{ChannelError, Result};
use crate::guard::SessionGuard;
use crate::protocol::new_req_id;
use crate::task::{TaskProgress, TaskReport, TaskRunner, TaskStore};
use crate::transport::{Connector, WebSocketConnector};
use crate::writer::WriterConfig;

/// Builder for configuring and creating an [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: ChannelConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl OrchestratorBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ChannelConfig::default(),
            connector: None,
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ChannelConfig) -> Self {
        Self {
            config,
            connector: None,
        }
    }

    /// Start from a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_config(ChannelConfig::from_file(path)?))
    }

    /// Set the WebSocket endpoint.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    /// Set the invoker (user) id.
    pub fn invoker_id(mut self, invoker_id: impl Into<String>) -> Self {
        self.config.profile.invoker_id = invoker_id.into();
        self
    }

    /// Set the application group id.
    pub fn app_gid(mut self, app_gid: impl Into<String>) -> Self {
        self.config.profile.app_gid = app_gid.into();
        self
    }

    /// Set the protocol version sent in `context.version`.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.profile.version = version.into();
        self
    }

    /// Replace the whole client profile.
    pub fn profile(mut self, profile: ClientProfile) -> Self {
        self.config.profile = profile;
        self
    }

    /// Replace the activity reported per unit.
    pub fn activity(mut self, activity: ActivityProfile) -> Self {
        self.config.activity = activity;
        self
    }

    /// Set the base heartbeat interval.
    ///
    /// Default: 18 seconds
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the max jitter added to each heartbeat interval.
    ///
    /// Default: 4 seconds
    pub fn heartbeat_jitter(mut self, jitter: Duration) -> Self {
        self.config.heartbeat_jitter_ms = jitter.as_millis() as u64;
        self
    }

    /// Set the bound on every wait for a response.
    ///
    /// Default: 30 seconds
    pub fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.config.exchange_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set how long `logout` waits for a running task before aborting it.
    ///
    /// Default: 5 seconds
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Skip responses echoing a `reqId` other than the one sent.
    ///
    /// Default: off
    pub fn check_req_id(mut self, enabled: bool) -> Self {
        self.config.check_req_id = enabled;
        self
    }

    /// Use a custom transport instead of WebSocket.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validate the configuration and build the orchestrator.
    ///
    /// Nothing connects until a task starts.
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector::new()),
        };
        let writer_config = WriterConfig {
            channel_capacity: self.config.channel_capacity,
        };
        let config = Arc::new(self.config);
        let conn = Arc::new(ConnectionManager::new(connector, writer_config));
        let store = TaskStore::new();
        let runner = TaskRunner::new(config.clone(), conn.clone(), store.clone());

        Ok(Orchestrator {
            config,
            conn,
            store,
            guard: SessionGuard::new(),
            runner,
            logout_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A started task.
///
/// Dropping the ticket does not stop the task.
#[derive(Debug)]
pub struct TaskTicket {
    pub task_id: String,
    pub total: u32,
    done: oneshot::Receiver<TaskReport>,
}

impl TaskTicket {
    /// Wait for the task to end.
    ///
    /// Returns `None` if the task was aborted by `logout`.
    pub async fn wait(self) -> Option<TaskReport> {
        self.done.await.ok()
    }
}

/// Single-flight task orchestrator.
///
/// Cheap to clone; clones share the connection, the guard and the task store.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ChannelConfig>,
    conn: Arc<ConnectionManager>,
    store: TaskStore,
    guard: SessionGuard,
    runner: TaskRunner,
    logout_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Orchestrator {
    /// Create a new orchestrator builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Start a task of `unit_count` business exchanges.
    ///
    /// Fails with [`ChannelError::Busy`] if a task already holds the guard;
    /// no task record is created in that case.
    pub async fn start_task(&self, unit_count: u32, session_token: &str) -> Result<TaskTicket> {
        let task_id = new_req_id();
        let permit = self.guard.try_acquire(&task_id).ok_or_else(|| {
            tracing::info!("Task rejected: channel busy");
            ChannelError::Busy
        })?;
        let generation = permit.generation();

        self.runner.register(&task_id, unit_count);

        let (done_tx, done) = oneshot::channel();
        let runner = self.runner.clone();
        let token = session_token.to_string();
        let id = task_id.clone();

        let handle = tokio::spawn(async move {
            // Dropped when the run is over, or with this future if aborted.
            let permit = permit;
            let report = runner.run(&id, unit_count, &token).await;
            drop(permit);
            let _ = done_tx.send(report);
        });
        let abort = handle.abort_handle();
        if !self.guard.attach(generation, handle) {
            // Logged out before the handle was attached.
            tracing::warn!(task_id = %task_id, "Guard released during start, aborting task");
            abort.abort();
        }

        tracing::info!(task_id = %task_id, total = unit_count, "Task started");
        Ok(TaskTicket {
            task_id,
            total: unit_count,
            done,
        })
    }

    /// Acquire the guard and run a task inline, returning its report.
    ///
    /// Fails with [`ChannelError::Busy`] like [`start_task`](Self::start_task).
    pub async fn run_task(&self, unit_count: u32, session_token: &str) -> Result<TaskReport> {
        let task_id = new_req_id();
        let _permit = self
            .guard
            .try_acquire(&task_id)
            .ok_or(ChannelError::Busy)?;
        Ok(self.runner.run(&task_id, unit_count, session_token).await)
    }

    /// Status of the current task, or idle.
    pub fn task_status(&self) -> TaskStatusReport {
        self.store
            .current()
            .map(TaskStatusReport::from)
            .unwrap_or_else(TaskStatusReport::idle)
    }

    /// Progress of any task started in this process.
    pub fn task(&self, task_id: &str) -> Option<TaskProgress> {
        self.store.get(task_id)
    }

    /// Whether a task holds the guard.
    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    /// Whether the channel connection is live.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Close the connection and release the guard, whatever is in flight.
    ///
    /// A running task gets the shutdown grace period to notice the
    /// disconnect before it is aborted. Afterwards the status is idle.
    /// Concurrent calls run one after another.
    pub async fn logout(&self) -> LogoutResponse {
        let _serial = self.logout_lock.lock().await;
        self.conn.close().await;

        if let Some(active) = self.guard.take_active() {
            if let Some(mut handle) = active.handle {
                match tokio::time::timeout(self.config.shutdown_grace(), &mut handle).await {
                    Ok(_) => {}
                    Err(_) => {
                        tracing::warn!(task_id = %active.task_id, "Task did not stop in time, aborting");
                        handle.abort();
                        let _ = handle.await;
                    }
                }
            }
            self.store.finish(&active.task_id);
            // The task may have reconnected before it noticed.
            self.conn.close().await;
            self.store.clear_finished_current();
            self.guard.release_generation(active.generation);
        } else {
            self.store.clear_finished_current();
        }

        tracing::info!("Logged out");
        LogoutResponse::logged_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use crate::transport::MemoryConnector;

    #[test]
    fn test_builder_default() {
        let builder = OrchestratorBuilder::default();
        assert_eq!(builder.config, ChannelConfig::default());
        assert!(builder.connector.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Orchestrator::builder()
            .endpoint("ws://127.0.0.1:9000/ws")
            .invoker_id("306177")
            .app_gid("other")
            .version("2.0.0")
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_jitter(Duration::ZERO)
            .exchange_timeout(Duration::from_secs(3))
            .shutdown_grace(Duration::from_millis(250))
            .channel_capacity(16)
            .check_req_id(true);

        let config = &builder.config;
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/ws");
        assert_eq!(config.profile.invoker_id, "306177");
        assert_eq!(config.profile.app_gid, "other");
        assert_eq!(config.profile.version, "2.0.0");
        assert_eq!(config.heartbeat_interval_ms, 10_000);
        assert_eq!(config.heartbeat_jitter_ms, 0);
        assert_eq!(config.exchange_timeout_ms, 3_000);
        assert_eq!(config.shutdown_grace_ms, 250);
        assert_eq!(config.channel_capacity, 16);
        assert!(config.check_req_id);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = Orchestrator::builder().endpoint("").build();
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[tokio::test]
    async fn test_idle_before_any_task() {
        let (connector, _listener) = MemoryConnector::pair();
        let orchestrator = Orchestrator::builder().connector(connector).build().unwrap();

        let status = orchestrator.task_status();
        assert_eq!(status.status, TaskStatus::Idle);
        assert!(status.task_id.is_none());
        assert!(!orchestrator.is_busy());
        assert!(!orchestrator.is_connected());
    }

    #[tokio::test]
    async fn test_logout_when_idle() {
        let (connector, _listener) = MemoryConnector::pair();
        let orchestrator = Orchestrator::builder().connector(connector).build().unwrap();

        let response = orchestrator.logout().await;
        assert_eq!(response, LogoutResponse::logged_out());
        assert!(!orchestrator.is_busy());
    }
}
