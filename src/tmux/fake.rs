//! In-memory multiplexer for unit tests

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Multiplexer, Pane};
use crate::error::{Result, TmuxError};

#[derive(Debug, Default)]
struct FakeState {
    panes: Vec<Pane>,
    screens: std::collections::HashMap<String, String>,
    fail_list: bool,
    fail_create: bool,
    fail_send: bool,
    captures: usize,
    created: Vec<(String, PathBuf)>,
    killed: Vec<String>,
    literals: Vec<(String, String)>,
    keys: Vec<(String, Vec<String>)>,
}

/// Scriptable multiplexer that records every call
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeMultiplexer {
    state: Arc<Mutex<FakeState>>,
}

fn failure(command: &str) -> crate::error::Error {
    TmuxError::CommandFailed {
        command: command.to_string(),
        stderr: "scripted failure".to_string(),
    }
    .into()
}

impl FakeMultiplexer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_panes(&self, panes: Vec<Pane>) {
        self.state.lock().panes = panes;
    }

    pub(crate) fn set_screen(&self, session: &str, text: &str) {
        self.state
            .lock()
            .screens
            .insert(session.to_string(), text.to_string());
    }

    pub(crate) fn fail_list(&self, fail: bool) {
        self.state.lock().fail_list = fail;
    }

    pub(crate) fn fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub(crate) fn fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    pub(crate) fn capture_count(&self) -> usize {
        self.state.lock().captures
    }

    pub(crate) fn created(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().created.clone()
    }

    pub(crate) fn killed(&self) -> Vec<String> {
        self.state.lock().killed.clone()
    }

    pub(crate) fn literals(&self) -> Vec<(String, String)> {
        self.state.lock().literals.clone()
    }

    pub(crate) fn keys(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().keys.clone()
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn list_panes(&self) -> Result<Vec<Pane>> {
        let state = self.state.lock();
        if state.fail_list {
            return Err(failure("list-panes"));
        }
        Ok(state.panes.clone())
    }

    async fn capture_pane(&self, session_name: &str, _scrollback_lines: u32) -> Result<String> {
        let mut state = self.state.lock();
        state.captures += 1;
        Ok(state.screens.get(session_name).cloned().unwrap_or_default())
    }

    async fn create_session(&self, session_name: &str, working_dir: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(failure("new-session"));
        }
        state
            .created
            .push((session_name.to_string(), working_dir.to_path_buf()));
        Ok(())
    }

    async fn kill_session(&self, session_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.killed.push(session_name.to_string());
        let before = state.panes.len();
        state.panes.retain(|p| p.session_name != session_name);
        if state.panes.len() == before {
            return Err(failure("kill-session"));
        }
        Ok(())
    }

    async fn send_literal(&self, session_name: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_send {
            return Err(failure("send-keys -l"));
        }
        state
            .literals
            .push((session_name.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_keys(&self, session_name: &str, keys: &[&str]) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_send {
            return Err(failure("send-keys"));
        }
        state.keys.push((
            session_name.to_string(),
            keys.iter().map(|k| k.to_string()).collect(),
        ));
        Ok(())
    }
}

/// Build a pane for tests
pub(crate) fn pane(
    session: &str,
    cwd: &str,
    command: &str,
    last_activity: chrono::DateTime<chrono::Utc>,
) -> Pane {
    Pane {
        session_name: session.to_string(),
        pid: 100,
        cwd: cwd.to_string(),
        created: last_activity,
        command: command.to_string(),
        last_activity,
        attached: false,
    }
}
