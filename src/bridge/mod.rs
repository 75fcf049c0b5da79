//! Per-session output bridge
//!
//! A bridge polls one tmux session while somebody is watching it:
//! - `OutputBridge` - Owned by the registry, one per live session
//! - `BridgeHandle` - Non-owning reference handed to the gateway
//! - `Subscription` - Reference-counted watcher with an event stream

mod output;
mod subscription;

pub use output::*;
pub use subscription::*;
