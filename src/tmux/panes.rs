//! Pane listing format and parsing

use chrono::{DateTime, TimeZone, Utc};

/// Format string handed to `tmux list-panes -a -F`
pub const LIST_PANES_FORMAT: &str = "#{session_name}|#{pane_pid}|#{pane_current_path}|#{session_created}|#{pane_current_command}|#{session_activity}|#{session_attached}";

const FIELD_COUNT: usize = 7;

/// One terminal viewport inside a tmux session, as seen by a single scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pane {
    /// Owning session name
    pub session_name: String,
    /// Pid of the pane's process (0 if tmux reported garbage)
    pub pid: u32,
    /// Current working directory (may be empty)
    pub cwd: String,
    /// When the session was created
    pub created: DateTime<Utc>,
    /// Name of the foreground command
    pub command: String,
    /// Last activity in the session
    pub last_activity: DateTime<Utc>,
    /// Whether a client is attached
    pub attached: bool,
}

impl Pane {
    /// Parse one line of `list-panes` output
    ///
    /// The cwd is the only free-form field that may itself contain `|`, so
    /// fixed fields are taken from both ends and the remainder is the cwd.
    pub fn parse_line(line: &str, now: DateTime<Utc>) -> Option<Self> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < FIELD_COUNT {
            return None;
        }

        let session_name = parts[0].trim();
        if session_name.is_empty() {
            return None;
        }

        let n = parts.len();
        Some(Self {
            session_name: session_name.to_string(),
            pid: parts[1].trim().parse().unwrap_or(0),
            cwd: parts[2..n - 4].join("|"),
            created: parse_epoch_secs(parts[n - 4]).unwrap_or(now),
            command: parts[n - 3].to_string(),
            last_activity: parse_epoch_secs(parts[n - 2]).unwrap_or(now),
            attached: parts[n - 1].trim() == "1",
        })
    }

    /// Parse the full `list-panes` output, skipping malformed lines
    pub fn parse_listing(raw: &str, now: DateTime<Utc>) -> Vec<Self> {
        raw.lines()
            .filter_map(|line| Self::parse_line(line, now))
            .collect()
    }
}

fn parse_epoch_secs(field: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = field.trim().parse().ok()?;
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}
