//! mobilterm - Drive tmux-hosted coding agent sessions from a phone
//!
//! A long-running server mirrors every tmux session on the machine and
//! exposes them to browsers over a single multiplexed WebSocket.
//!
//! # Architecture
//!
//! - **Session Registry** - Mirrors tmux by periodic discovery and owns
//!   one output bridge per live session
//! - **Output Bridge** - Polls a session only while somebody watches it and
//!   emits output when the captured text changes
//! - **Multiplex Gateway** - One connection per client, any number of
//!   subscriptions per connection, plus a periodic listing broadcast
//!
//! # Modules
//!
//! - [`tmux`] - The `Multiplexer` seam and its tmux implementation
//! - [`bridge`] - Per-session polling and subscriber counting
//! - [`session`] - Registry, status classification and grouping
//! - [`gateway`] - WebSocket protocol, REST handlers and the server loop
//! - [`config`] - Configuration and the shared-secret token
//! - [`context`] - Process-wide handles built at startup
//! - [`error`] - Error types

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod session;
pub mod tmux;

pub use config::{Config, Credentials};
pub use context::AppContext;
pub use error::{Error, Result};
pub use session::{SessionRegistry, SessionStatus, SessionView};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
