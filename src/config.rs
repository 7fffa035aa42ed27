//! Channel configuration.
//!
//! [`ChannelConfig`] holds everything the orchestrator needs: where to
//! connect, how to identify the client, and the timing knobs. Defaults match
//! the production client; a JSON file may override any subset of fields:
//!
//! ```json
//! {
//!   "endpoint": "wss://www.srdcloud.cn/websocket/peerAppgw",
//!   "profile": { "invokerId": "306177" },
//!   "heartbeatIntervalMs": 18000
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ChannelError, Result};

/// Default WebSocket endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://www.srdcloud.cn/websocket/peerAppgw";

/// Default base heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(18);

/// Default upper bound of random jitter added to each heartbeat interval.
pub const DEFAULT_HEARTBEAT_JITTER: Duration = Duration::from_secs(4);

/// Default bound on every correlation-queue wait.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time `logout` waits for a running task to wind down.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default writer channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Client identity sent in handshake and business messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientProfile {
    /// Application group id (`appGId`).
    #[serde(rename = "appGId")]
    pub app_gid: String,
    /// Invoker (user) id.
    pub invoker_id: String,
    /// Protocol version reported in `context.version`.
    pub version: String,
    /// IDE kind.
    pub client_type: String,
    /// IDE version.
    pub client_version: String,
    /// OS/arch.
    pub client_platform: String,
    /// Plugin version.
    pub plugin_version: String,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            app_gid: "aicode".to_string(),
            invoker_id: String::new(),
            version: "1.6.0".to_string(),
            client_type: "vscode".to_string(),
            client_version: "1.100.2".to_string(),
            client_platform: "windows-x64".to_string(),
            plugin_version: "1.6.0".to_string(),
        }
    }
}

/// What each `UserActivityNotify` unit reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityProfile {
    /// Activity kind.
    pub activity_type: String,
    /// Service name.
    pub service: String,
    /// Lines per unit.
    pub lines: u32,
    /// Count per unit.
    pub count: u32,
}

impl Default for ActivityProfile {
    fn default() -> Self {
        Self {
            activity_type: "code_display".to_string(),
            service: "codegen".to_string(),
            lines: 1,
            count: 1,
        }
    }
}

/// Full orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// Client identity.
    pub profile: ClientProfile,
    /// Business activity description.
    pub activity: ActivityProfile,
    /// Base interval between client heartbeats, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Max random jitter added to each heartbeat interval, in milliseconds.
    pub heartbeat_jitter_ms: u64,
    /// Bound on every wait for a response, in milliseconds.
    pub exchange_timeout_ms: u64,
    /// How long `logout` waits for a task to stop before aborting it.
    pub shutdown_grace_ms: u64,
    /// Capacity of the outbound frame channel.
    pub channel_capacity: usize,
    /// Skip responses echoing a `reqId` other than the one sent.
    ///
    /// Off by default: servers may put their own id in the response.
    pub check_req_id: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            profile: ClientProfile::default(),
            activity: ActivityProfile::default(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            heartbeat_jitter_ms: DEFAULT_HEARTBEAT_JITTER.as_millis() as u64,
            exchange_timeout_ms: DEFAULT_EXCHANGE_TIMEOUT.as_millis() as u64,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            check_req_id: false,
        }
    }
}

impl ChannelConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ChannelError::Config("endpoint must not be empty".to_string()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ChannelError::Config(
                "heartbeatIntervalMs must be positive".to_string(),
            ));
        }
        if self.exchange_timeout_ms == 0 {
            return Err(ChannelError::Config(
                "exchangeTimeoutMs must be positive".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ChannelError::Config(
                "channelCapacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Max heartbeat jitter.
    pub fn heartbeat_jitter(&self) -> Duration {
        Duration::from_millis(self.heartbeat_jitter_ms)
    }

    /// Per-exchange timeout.
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }

    /// Logout grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
