//! # wbchannel-client
//!
//! Client orchestrator for the WBChannel protocol: `<WBChannel>`-framed JSON
//! messages over one persistent WebSocket.
//!
//! The crate drives exactly one task at a time. A task connects, registers
//! a channel, obtains an API key, keeps the connection alive with
//! heartbeats and then sends a series of `UserActivityNotify` messages,
//! waiting for each acknowledgment while tracking progress.
//!
//! ## Architecture
//!
//! - **Transport**: WebSocket (`tokio-tungstenite`) or in-memory, behind [`transport::Connector`]
//! - **Router**: answers `ServerHeartbeat`, handles `Closed`, queues everything else
//! - **Control**: handshake and heartbeat monitor
//! - **Task**: runner plus state store, admitted by the [`guard::SessionGuard`]
//!
//! ## Example
//!
//! ```ignore
//! use wbchannel_client::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Orchestrator::builder()
//!         .invoker_id("306177")
//!         .build()
//!         .unwrap();
//!
//!     let ticket = orchestrator.start_task(10, "session-token").await.unwrap();
//!     let report = ticket.wait().await;
//!     println!("{:?}", orchestrator.task_status());
//! }
//! ```

pub mod api;
pub mod codec;
pub mod config;
pub mod connection;
pub mod control;
pub mod error;
pub mod guard;
pub mod protocol;
pub mod queue;
pub mod router;
pub mod session;
pub mod task;
pub mod transport;
pub mod writer;

mod client;

pub use client::{Orchestrator, OrchestratorBuilder, TaskTicket};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
