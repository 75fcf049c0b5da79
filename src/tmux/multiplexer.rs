//! The external terminal multiplexer as seen by the rest of the crate
//!
//! Registry and bridges never spawn processes themselves; they go through
//! this trait so the tmux implementation can be swapped for a fake in tests.

use std::path::Path;

use async_trait::async_trait;

use super::Pane;
use crate::error::Result;

/// Opaque command surface of a terminal multiplexer
#[async_trait]
pub trait Multiplexer: Send + Sync + 'static {
    /// List every pane of every session
    async fn list_panes(&self) -> Result<Vec<Pane>>;

    /// Capture the visible text plus `scrollback_lines` of history, escape sequences kept
    async fn capture_pane(&self, session_name: &str, scrollback_lines: u32) -> Result<String>;

    /// Create a detached session rooted at `working_dir`
    async fn create_session(&self, session_name: &str, working_dir: &Path) -> Result<()>;

    /// Kill a session by name
    async fn kill_session(&self, session_name: &str) -> Result<()>;

    /// Type literal text into a session (no key-name interpretation)
    async fn send_literal(&self, session_name: &str, text: &str) -> Result<()>;

    /// Send named keys (`Enter`, `C-c`, `Up`, ...) to a session
    async fn send_keys(&self, session_name: &str, keys: &[&str]) -> Result<()>;
}
