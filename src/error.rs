//! Error types for mobilterm
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for mobilterm
#[derive(Error, Debug)]
pub enum Error {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Tmux error: {0}")]
    Tmux(#[from] TmuxError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session registry errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("projectPath required")]
    MissingProjectPath,

    #[error("Failed to spawn session: {0}")]
    SpawnFailed(String),
}

/// Tmux integration errors
#[derive(Error, Debug)]
pub enum TmuxError {
    #[error("Tmux is not installed or not in PATH")]
    NotInstalled,

    #[error("Tmux command failed: {command} - {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Tmux command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Semaphore acquire failed")]
    SemaphoreError,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Credential errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unauthorized")]
    InvalidToken,

    #[error("Failed to read token file {path}: {reason}")]
    TokenUnreadable { path: PathBuf, reason: String },

    #[error("Failed to write token file {path}: {reason}")]
    TokenUnwritable { path: PathBuf, reason: String },
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::NotFound("mt-foo-1a2b".to_string());
        assert_eq!(err.to_string(), "Session not found: mt-foo-1a2b");

        let err = TmuxError::NotInstalled;
        assert!(err.to_string().contains("not installed"));

        let err = AuthError::InvalidToken;
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[test]
    fn test_error_conversion() {
        let session_err = SessionError::MissingProjectPath;
        let top_err: Error = session_err.into();
        assert!(matches!(top_err, Error::Session(SessionError::MissingProjectPath)));

        let tmux_err = TmuxError::Timeout(std::time::Duration::from_secs(3));
        let top_err: Error = tmux_err.into();
        assert!(top_err.to_string().contains("timed out"));
    }
}
