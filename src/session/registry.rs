//! Session registry - owns every live session and its bridge
//!
//! tmux is the source of truth. The registry mirrors it by periodic
//! discovery, adds sessions it spawns itself, and removes sessions the
//! moment they vanish from a scan or are killed.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{
    AgentMatcher, ProjectEntry, ProjectGroup, SessionListing, SessionMeta, SessionStatus,
    SessionView, UNKNOWN_PROJECT, preview_line,
};
use crate::bridge::{BridgeHandle, BridgeSettings, OutputBridge};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::tmux::{CONFIRM_KEY, Multiplexer, Pane};

/// Digits of the time-based suffix appended to spawned session names
const SUFFIX_LEN: usize = 4;

/// Registry parameters derived from configuration
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Root directory whose children are projects
    pub projects_dir: PathBuf,
    /// Prefix for spawned session names
    pub session_prefix: String,
    /// Command launched in spawned sessions
    pub agent_program: String,
    /// Recognizes agent commands in pane listings
    pub agent: AgentMatcher,
    /// Polling parameters for every bridge
    pub bridge: BridgeSettings,
}

impl RegistrySettings {
    /// Build settings from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            projects_dir: config.projects_dir()?,
            session_prefix: config.session_prefix.clone(),
            agent_program: config.agent_program.clone(),
            agent: AgentMatcher::new(&config.agent_pattern)?,
            bridge: config.bridge_settings(),
        })
    }
}

/// Outcome of one discovery scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Sessions seen for the first time
    pub added: Vec<String>,
    /// Sessions that disappeared and were dropped
    pub removed: Vec<String>,
    /// Sessions tracked after the scan
    pub total: usize,
}

struct SessionEntry {
    meta: SessionMeta,
    bridge: OutputBridge,
}

/// Registry of live sessions, each with exactly one bridge
pub struct SessionRegistry {
    mux: Arc<dyn Multiplexer>,
    settings: RegistrySettings,
    sessions: RwLock<BTreeMap<String, SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new(mux: Arc<dyn Multiplexer>, settings: RegistrySettings) -> Self {
        Self {
            mux,
            settings,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Scan tmux and reconcile the registry with what it reports
    ///
    /// The write lock is held across the scan so the whole create-or-merge
    /// lands before any other registry operation runs. A failed scan
    /// returns the error and leaves the registry untouched.
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        let mut sessions = self.sessions.write().await;
        let panes = self.mux.list_panes().await?;
        if panes.is_empty() {
            // An empty listing carries no information; keep what we have
            debug!("Empty pane listing, registry unchanged");
            return Ok(DiscoveryReport {
                total: sessions.len(),
                ..DiscoveryReport::default()
            });
        }

        let mut by_session: BTreeMap<String, Vec<Pane>> = BTreeMap::new();
        for pane in panes {
            by_session
                .entry(pane.session_name.clone())
                .or_default()
                .push(pane);
        }

        let mut report = DiscoveryReport::default();

        for (name, panes) in &by_session {
            let Some(pane) = self.representative(panes) else {
                continue;
            };
            let project_name = self.project_name(&pane.cwd);

            match sessions.get_mut(name) {
                Some(entry) => entry.meta.merge_pane(pane, project_name),
                None => {
                    debug!(session = %name, project = %project_name, "Discovered session");
                    let bridge =
                        OutputBridge::new(name.clone(), self.mux.clone(), self.settings.bridge);
                    sessions.insert(
                        name.clone(),
                        SessionEntry {
                            meta: SessionMeta::discovered(pane, project_name),
                            bridge,
                        },
                    );
                    report.added.push(name.clone());
                }
            }
        }

        let vanished: Vec<String> = sessions
            .keys()
            .filter(|name| !by_session.contains_key(*name))
            .cloned()
            .collect();
        for name in vanished {
            if let Some(entry) = sessions.remove(&name) {
                entry.bridge.stop();
                info!(session = %name, "Session disappeared");
                report.removed.push(name);
            }
        }

        report.total = sessions.len();
        Ok(report)
    }

    /// Pane that stands for the session: the first agent pane, else the first pane
    fn representative<'a>(&self, panes: &'a [Pane]) -> Option<&'a Pane> {
        panes
            .iter()
            .find(|p| self.settings.agent.is_agent(&p.command))
            .or_else(|| panes.first())
    }

    /// Project name for a working directory
    pub fn project_name(&self, cwd: &str) -> String {
        resolve_project_name(&self.settings.projects_dir, cwd)
    }

    /// Create a tmux session in `project_path`, launch the agent, and register it
    ///
    /// Nothing is registered unless both steps succeed.
    #[instrument(skip(self))]
    pub async fn spawn(&self, project_path: &Path) -> Result<String> {
        if project_path.as_os_str().is_empty() {
            return Err(SessionError::MissingProjectPath.into());
        }

        let project_name = project_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string());
        let now = Utc::now();
        let session_name = generate_session_name(&self.settings.session_prefix, &project_name, now);

        let mut sessions = self.sessions.write().await;

        self.mux
            .create_session(&session_name, project_path)
            .await
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        if let Err(e) = self.launch_agent(&session_name).await {
            if let Err(kill_err) = self.mux.kill_session(&session_name).await {
                warn!(session = %session_name, "Cleanup after failed launch failed: {}", kill_err);
            }
            return Err(SessionError::SpawnFailed(e.to_string()).into());
        }

        let meta = SessionMeta::spawned(
            session_name.clone(),
            project_path.to_string_lossy(),
            project_name,
            self.settings.agent_program.clone(),
            now,
        );
        let bridge = OutputBridge::new(session_name.clone(), self.mux.clone(), self.settings.bridge);
        sessions.insert(session_name.clone(), SessionEntry { meta, bridge });

        info!(session = %session_name, path = ?project_path, "Spawned session");
        Ok(session_name)
    }

    async fn launch_agent(&self, session_name: &str) -> Result<()> {
        self.mux
            .send_literal(session_name, &self.settings.agent_program)
            .await?;
        self.mux
            .send_keys(session_name, &[CONFIRM_KEY])
            .await
    }

    /// Kill a session in tmux (best effort) and drop it locally
    ///
    /// Returns whether the session was tracked. Killing a session tmux no
    /// longer knows about still succeeds.
    #[instrument(skip(self))]
    pub async fn kill_session(&self, session_name: &str) -> bool {
        if let Err(e) = self.mux.kill_session(session_name).await {
            debug!(session = %session_name, "tmux kill failed, treating as already dead: {}", e);
        }

        let removed = self.sessions.write().await.remove(session_name);
        match removed {
            Some(entry) => {
                entry.bridge.stop();
                info!(session = %session_name, "Killed session");
                true
            }
            None => false,
        }
    }

    /// Kill every session currently classified stale; returns their names
    #[instrument(skip(self))]
    pub async fn kill_stale(&self) -> Vec<String> {
        let now = Utc::now();
        let stale: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|e| self.status_of(&e.meta, now).is_stale())
                .map(|e| e.meta.session_name.clone())
                .collect()
        };

        for name in &stale {
            self.kill_session(name).await;
        }

        if !stale.is_empty() {
            info!("Cleaned up {} stale session(s)", stale.len());
        }
        stale
    }

    fn status_of(&self, meta: &SessionMeta, now: DateTime<Utc>) -> SessionStatus {
        self.settings
            .agent
            .status(&meta.command, meta.last_activity, now)
    }

    fn view(&self, entry: &SessionEntry, now: DateTime<Utc>) -> SessionView {
        SessionView {
            meta: entry.meta.clone(),
            status: self.status_of(&entry.meta, now),
            idle_since: entry.meta.last_activity,
            has_subscribers: entry.bridge.subscriber_count() > 0,
            preview: preview_line(&entry.bridge.last_output()),
        }
    }

    /// Every session with its status computed now
    pub async fn list_sessions(&self) -> Vec<SessionView> {
        self.list_sessions_at(Utc::now()).await
    }

    /// Every session with its status computed as of `now`
    pub async fn list_sessions_at(&self, now: DateTime<Utc>) -> Vec<SessionView> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|e| self.view(e, now)).collect()
    }

    /// Sessions partitioned by project
    pub async fn grouped_sessions(&self) -> Vec<ProjectGroup> {
        group_sessions(self.list_sessions().await)
    }

    /// Flat and grouped listing from one snapshot
    pub async fn listing(&self) -> SessionListing {
        let sessions = self.list_sessions().await;
        SessionListing {
            grouped: group_sessions(sessions.clone()),
            sessions,
        }
    }

    /// Directories under the projects root, flagged if any session uses them
    pub async fn list_projects(&self) -> Vec<ProjectEntry> {
        let active: HashSet<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .map(|e| e.meta.project_name.clone())
                .collect()
        };

        let mut dir = match tokio::fs::read_dir(&self.settings.projects_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(dir = ?self.settings.projects_dir, "Cannot read projects dir: {}", e);
                return Vec::new();
            }
        };

        let mut projects = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_dir || name.starts_with('.') {
                continue;
            }
            projects.push(ProjectEntry {
                has_active_session: active.contains(&name),
                path: entry.path(),
                name,
            });
        }

        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }

    /// Non-owning handle to a live session's bridge
    pub async fn bridge(&self, session_name: &str) -> Option<BridgeHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(session_name).map(|e| e.bridge.handle())
    }

    /// Whether a session is tracked
    pub async fn contains(&self, session_name: &str) -> bool {
        self.sessions.read().await.contains_key(session_name)
    }

    /// Number of tracked sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Project name for `cwd` relative to the projects root
///
/// Under the root the first path component names the project, so nested
/// directories still group together; elsewhere the directory's basename
/// is used.
pub fn resolve_project_name(projects_dir: &Path, cwd: &str) -> String {
    if cwd.is_empty() {
        return UNKNOWN_PROJECT.to_string();
    }

    let path = Path::new(cwd);
    if let Ok(relative) = path.strip_prefix(projects_dir) {
        if let Some(first) = relative.components().next() {
            return first.as_os_str().to_string_lossy().into_owned();
        }
    }

    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN_PROJECT.to_string())
}

/// Partition views by project and order groups and members for display
pub fn group_sessions(sessions: Vec<SessionView>) -> Vec<ProjectGroup> {
    let mut by_project: BTreeMap<String, Vec<SessionView>> = BTreeMap::new();
    for view in sessions {
        let key = if view.meta.project_name.is_empty() {
            UNKNOWN_PROJECT.to_string()
        } else {
            view.meta.project_name.clone()
        };
        by_project.entry(key).or_default().push(view);
    }

    let mut groups: Vec<ProjectGroup> = by_project
        .into_iter()
        .map(|(project_name, mut sessions)| {
            sessions.sort_by_key(|s| s.status.rank());
            ProjectGroup {
                project_name,
                stale_count: sessions.iter().filter(|s| s.status.is_stale()).count(),
                total_count: sessions.len(),
                sessions,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.has_active()
            .cmp(&a.has_active())
            .then_with(|| a.project_name.cmp(&b.project_name))
    });
    groups
}

/// `<prefix>-<project>-<suffix>` with a base-36 suffix from the clock
pub fn generate_session_name(prefix: &str, project_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        sanitize_session_component(project_name),
        time_suffix(now)
    )
}

/// tmux rewrites `.` and `:` in session names; do it up front so the
/// registered name matches what discovery will report
fn sanitize_session_component(name: &str) -> String {
    name.chars()
        .map(|c| if c == '.' || c == ':' { '_' } else { c })
        .collect()
}

fn time_suffix(now: DateTime<Utc>) -> String {
    let encoded = to_base36(now.timestamp_millis().unsigned_abs());
    let start = encoded.len().saturating_sub(SUFFIX_LEN);
    encoded[start..].to_string()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
