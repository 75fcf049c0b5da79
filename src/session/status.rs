//! Session status classification
//!
//! Status is a pure function of how long the session has been quiet and
//! whether its foreground command is the agent:
//! 1. quiet longer than `STALE_THRESHOLD` -> stale, whatever the command
//! 2. not the agent -> shell
//! 3. quiet at most `WORKING_THRESHOLD` -> working
//! 4. otherwise idle

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};

use super::SessionStatus;
use crate::error::{ConfigError, Result};

/// Longest quiet period still counted as working
pub const WORKING_THRESHOLD: Duration = Duration::from_secs(60);

/// Quiet period after which a session is stale
pub const STALE_THRESHOLD: Duration = Duration::from_secs(4 * 60 * 60);

/// Default agent command pattern (case-insensitive)
pub const DEFAULT_AGENT_PATTERN: &str = "claude";

/// Classify a session from its idle duration and command kind
pub fn classify(idle: Duration, is_agent: bool) -> SessionStatus {
    if idle > STALE_THRESHOLD {
        SessionStatus::Stale
    } else if !is_agent {
        SessionStatus::Shell
    } else if idle <= WORKING_THRESHOLD {
        SessionStatus::Working
    } else {
        SessionStatus::Idle
    }
}

/// Time since `last_activity`; activity in the future counts as none
pub fn idle_duration(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last_activity).to_std().unwrap_or(Duration::ZERO)
}

/// Recognizes the agent command among pane commands
#[derive(Debug, Clone)]
pub struct AgentMatcher {
    pattern: Regex,
}

impl AgentMatcher {
    /// Compile a case-insensitive agent pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "agent_pattern".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { pattern })
    }

    /// Whether `command` is the agent
    pub fn is_agent(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }

    /// Status of a session with this command and activity
    pub fn status(&self, command: &str, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> SessionStatus {
        classify(idle_duration(last_activity, now), self.is_agent(command))
    }
}

impl Default for AgentMatcher {
    fn default() -> Self {
        Self {
            pattern: RegexBuilder::new(DEFAULT_AGENT_PATTERN)
                .case_insensitive(true)
                .build()
                .unwrap(),
        }
    }
}
