//! Core session types
//!
//! Defines the data the registry tracks and the views it hands out:
//! - `SessionMeta` is the stored record for one tmux session
//! - `SessionView` adds the derived fields computed on every read
//! - `ProjectGroup` buckets views by project

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tmux::Pane;

/// Project name used when a session's directory gives nothing better
pub const UNKNOWN_PROJECT: &str = "unknown";

/// Derived status of a session
///
/// Variant order is the display rank: working sorts first, stale last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Agent running and active within the working threshold
    Working,
    /// Agent running but quiet
    Idle,
    /// No agent in the foreground
    Shell,
    /// Quiet for longer than the stale threshold
    Stale,
}

impl SessionStatus {
    /// Sort rank within a project group
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::Idle => write!(f, "idle"),
            Self::Shell => write!(f, "shell"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Stored record for one live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    /// Unique tmux session name
    pub session_name: String,
    /// Pid of the representative pane; `None` until discovery resolves it
    pub pid: Option<u32>,
    /// Working directory of the representative pane
    pub cwd: String,
    /// Project the session belongs to
    pub project_name: String,
    /// When the session was created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Foreground command of the representative pane
    pub command: String,
    /// Last activity reported by tmux
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    /// Whether a tmux client is attached
    pub attached: bool,
    /// Created by this server rather than discovered
    pub spawned: bool,
}

impl SessionMeta {
    /// Record for a session first seen in a scan
    pub fn discovered(pane: &Pane, project_name: String) -> Self {
        Self {
            session_name: pane.session_name.clone(),
            pid: (pane.pid > 0).then_some(pane.pid),
            cwd: pane.cwd.clone(),
            project_name,
            created_at: pane.created,
            command: pane.command.clone(),
            last_activity: pane.last_activity,
            attached: pane.attached,
            spawned: false,
        }
    }

    /// Record for a session this server just created
    pub fn spawned(
        session_name: impl Into<String>,
        cwd: impl Into<String>,
        project_name: impl Into<String>,
        command: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_name: session_name.into(),
            pid: None,
            cwd: cwd.into(),
            project_name: project_name.into(),
            created_at: now,
            command: command.into(),
            last_activity: now,
            attached: false,
            spawned: true,
        }
    }

    /// Fold a newer scan of the same session into this record
    ///
    /// A transient empty cwd resolves to the unknown project; that must not
    /// overwrite a good project name.
    pub fn merge_pane(&mut self, pane: &Pane, project_name: String) {
        if project_name != UNKNOWN_PROJECT {
            if !pane.cwd.is_empty() {
                self.cwd = pane.cwd.clone();
            }
            self.project_name = project_name;
        }
        if !pane.command.is_empty() {
            self.command = pane.command.clone();
        }
        if pane.pid > 0 {
            self.pid = Some(pane.pid);
        }
        self.last_activity = pane.last_activity;
        self.attached = pane.attached;
    }
}

/// One row of the session listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub meta: SessionMeta,
    /// Status computed at listing time
    pub status: SessionStatus,
    /// Start of the current quiet period
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub idle_since: DateTime<Utc>,
    /// Whether anybody is watching the session's output
    pub has_subscribers: bool,
    /// Last non-blank line of output, escape sequences stripped
    pub preview: String,
}

/// Sessions of one project, ordered by status rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectGroup {
    pub project_name: String,
    pub sessions: Vec<SessionView>,
    pub stale_count: usize,
    pub total_count: usize,
}

impl ProjectGroup {
    /// Whether any session in the group is not stale
    pub fn has_active(&self) -> bool {
        self.sessions.iter().any(|s| !s.status.is_stale())
    }
}

/// A directory under the projects root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,
    pub has_active_session: bool,
}

/// Flat and grouped listing computed from the same snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListing {
    pub sessions: Vec<SessionView>,
    pub grouped: Vec<ProjectGroup>,
}
