//! Control module - session setup and keep-alive.
//!
//! Before any business traffic the client runs a two-step handshake on the
//! freshly opened connection; afterwards a heartbeat monitor keeps it alive.
//!
//! # Workflow
//!
//! 1. Connection opens, message router starts feeding the correlation queue
//! 2. `RegisterChannel` → `RegisterChannel_resp` (channel id)
//! 3. `GetUserApiKey` → `GetUserApiKey_resp` (credential)
//! 4. Heartbeat monitor starts
//! 5. Business exchanges begin
//!
//! # Example
//!
//! ```ignore
//! use wbchannel_client::control::{Handshake, HeartbeatMonitor};
//!
//! let identity = Handshake::new(&config.profile)
//!     .run(&conn, &mut queue, &mut session)
//!     .await?;
//! let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval(), config.heartbeat_jitter())
//!     .spawn(conn.clone());
//! ```

mod handshake;
mod heartbeat;

pub use handshake::{Handshake, STEP_GET_USER_API_KEY, STEP_REGISTER_CHANNEL};
pub use heartbeat::HeartbeatMonitor;
