//! User configuration settings
//!
//! Layered configuration: defaults → config file → environment variables

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bridge::BridgeSettings;
use crate::error::{ConfigError, Error, Result};

/// Environment variable prefix (`MOBILTERM_PORT`, ...)
pub const ENV_PREFIX: &str = "MOBILTERM_";

/// Projects directory name under the desktop
const DEFAULT_PROJECTS_DIR_NAME: &str = "Claude Projects";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Port the HTTP server listens on
    pub port: u16,

    /// Root directory whose children are projects
    pub projects_dir: Option<PathBuf>,

    /// Prefix for spawned session names
    pub session_prefix: String,

    /// Program launched in spawned sessions
    pub agent_program: String,

    /// Case-insensitive regex identifying agent commands
    pub agent_pattern: String,

    /// Interval between tmux discovery scans in milliseconds
    pub discovery_interval_ms: u64,

    /// Interval between listing broadcasts in milliseconds
    pub broadcast_interval_ms: u64,

    /// Capture interval of an active bridge in milliseconds
    pub poll_interval_ms: u64,

    /// Scrollback lines included in each capture
    pub scrollback_lines: u32,

    /// Timeout for a single tmux command in milliseconds
    pub tmux_timeout_ms: u64,

    /// Maximum concurrent tmux commands
    pub max_concurrent_tmux: usize,

    /// Auth token file (defaults to `<data dir>/auth-token`)
    pub token_file: Option<PathBuf>,

    /// Directory of static client files served at `/`
    pub static_dir: Option<PathBuf>,

    /// Enable debug logging
    pub debug: bool,

    /// Log file path (if set, logs to file instead of stderr)
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7777,
            projects_dir: None,
            session_prefix: "mt".to_string(),
            agent_program: "claude".to_string(),
            agent_pattern: crate::session::DEFAULT_AGENT_PATTERN.to_string(),
            discovery_interval_ms: 5000,
            broadcast_interval_ms: 5000,
            poll_interval_ms: 250,
            scrollback_lines: 500,
            tmux_timeout_ms: 3000,
            max_concurrent_tmux: 16,
            token_file: None,
            static_dir: None,
            debug: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration using `path` as the config file
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::figment(path)
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()).into())
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // No split: field names contain underscores
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Get the configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolved auth token file
    pub fn token_file_path(&self) -> Result<PathBuf> {
        match self.token_file {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("auth-token")),
        }
    }

    /// Resolved projects root: configured, else `~/Desktop/Claude Projects`
    pub fn projects_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.projects_dir {
            return Ok(dir.clone());
        }
        let user_dirs = UserDirs::new().ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })?;
        let desktop = user_dirs
            .desktop_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| user_dirs.home_dir().join("Desktop"));
        Ok(desktop.join(DEFAULT_PROJECTS_DIR_NAME))
    }

    /// Bridge polling parameters
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            scrollback_lines: self.scrollback_lines,
        }
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms.max(1))
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms.max(1))
    }

    pub fn tmux_timeout(&self) -> Duration {
        Duration::from_millis(self.tmux_timeout_ms)
    }

    /// `host:port` the server listens on
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Host a phone on the same network can reach
    ///
    /// An explicit bind address wins. A wildcard bind resolves to this
    /// machine's LAN address, or `localhost` when there is none.
    pub fn advertised_host(&self) -> String {
        match self.bind_address.parse::<IpAddr>() {
            Ok(ip) if !ip.is_unspecified() => ip.to_string(),
            _ => match local_ip_address::local_ip() {
                Ok(ip) if !ip.is_loopback() => ip.to_string(),
                Ok(_) => "localhost".to_string(),
                Err(e) => {
                    debug!("No LAN address found: {}", e);
                    "localhost".to_string()
                }
            },
        }
    }

    /// URL that opens the client already authenticated
    pub fn connect_url(&self, token: &str) -> String {
        format!("http://{}:{}/?token={}", self.advertised_host(), self.port, token)
    }

    /// Ensure the config and data directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        let dirs = Self::project_dirs()?;

        for dir in [dirs.config_dir(), dirs.data_dir()] {
            std::fs::create_dir_all(dir).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(dir.to_path_buf()))
            })?;
        }

        Ok(())
    }

    /// Save current configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save current configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(parent.to_path_buf()))
            })?;
        }

        let toml =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "mobilterm", "mobilterm").ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 7777);
        assert_eq!(config.session_prefix, "mt");
        assert_eq!(config.agent_program, "claude");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.scrollback_lines, 500);
        assert_eq!(config.listen_address(), "0.0.0.0:7777");
    }

    #[test]
    fn test_connect_url() {
        let config = Config {
            bind_address: "192.168.1.20".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.advertised_host(), "192.168.1.20");
        assert_eq!(config.connect_url("a1b2c3"), "http://192.168.1.20:8080/?token=a1b2c3");
    }

    #[test]
    fn test_wildcard_bind_never_advertised() {
        let host = Config::default().advertised_host();
        assert_ne!(host, "0.0.0.0");
        assert!(host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| !ip.is_loopback()));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("session_prefix"));
        assert!(toml.contains("discovery_interval_ms"));
    }

    #[test]
    fn test_bridge_settings() {
        let config = Config {
            poll_interval_ms: 100,
            scrollback_lines: 50,
            ..Config::default()
        };
        let settings = config.bridge_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
        assert_eq!(settings.scrollback_lines, 50);
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = Config {
            projects_dir: Some(PathBuf::from("/srv/projects")),
            token_file: Some(PathBuf::from("/srv/token")),
            ..Config::default()
        };
        assert_eq!(config.projects_dir().unwrap(), PathBuf::from("/srv/projects"));
        assert_eq!(config.token_file_path().unwrap(), PathBuf::from("/srv/token"));
    }

    #[test]
    fn test_layering_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                port = 9000
                session_prefix = "phone"
                poll_interval_ms = 400
                "#,
            )?;
            jail.set_env("MOBILTERM_PORT", "9100");
            jail.set_env("MOBILTERM_SCROLLBACK_LINES", "120");

            let config = Config::load_from(Path::new("config.toml")).unwrap();
            assert_eq!(config.port, 9100);
            assert_eq!(config.session_prefix, "phone");
            assert_eq!(config.poll_interval_ms, 400);
            assert_eq!(config.scrollback_lines, 120);
            assert_eq!(config.agent_program, "claude");
            Ok(())
        });
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            port: 8123,
            static_dir: Some(PathBuf::from("/srv/www")),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(loaded, config);
    }
}
