//! Shared-secret auth token
//!
//! The token lives in a small text file so it survives restarts and can be
//! read by whoever pairs a phone with the server.

use std::path::Path;

use tracing::info;
use uuid::Uuid;

use crate::error::{AuthError, Result};

/// Hex characters in a generated token
pub const TOKEN_LEN: usize = 6;

/// The shared secret every client must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Read the token at `path`, generating and persisting one if the file
    /// is missing or blank
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => {
                return Ok(Self {
                    token: content.trim().to_string(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AuthError::TokenUnreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
                .into());
            }
        }

        let token = generate_token();
        let unwritable = |e: std::io::Error| AuthError::TokenUnwritable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(unwritable)?;
        }
        std::fs::write(path, &token).map_err(unwritable)?;
        info!(path = ?path, "Generated new auth token");

        Ok(Self { token })
    }

    /// Credentials with a fixed token, not backed by a file
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Exact match against the presented token
    pub fn verify(&self, presented: Option<&str>) -> Result<()> {
        match presented {
            Some(token) if token == self.token => Ok(()),
            _ => Err(AuthError::InvalidToken.into()),
        }
    }
}

fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()[..TOKEN_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generates_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("auth-token");

        let creds = Credentials::load_or_generate(&path).unwrap();
        assert_eq!(creds.token().len(), TOKEN_LEN);
        assert!(creds.token().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), creds.token());

        let again = Credentials::load_or_generate(&path).unwrap();
        assert_eq!(again.token(), creds.token());
    }

    #[test]
    fn test_existing_token_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth-token");
        std::fs::write(&path, "  a1b2c3\n").unwrap();

        let creds = Credentials::load_or_generate(&path).unwrap();
        assert_eq!(creds.token(), "a1b2c3");
    }

    #[test]
    fn test_blank_file_is_regenerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth-token");
        std::fs::write(&path, "\n").unwrap();

        let creds = Credentials::load_or_generate(&path).unwrap();
        assert_eq!(creds.token().len(), TOKEN_LEN);
    }

    #[test]
    fn test_verify() {
        let creds = Credentials::from_token("abc123");
        assert!(creds.verify(Some("abc123")).is_ok());
        assert!(creds.verify(Some("abc12")).is_err());
        assert!(creds.verify(Some("ABC123")).is_err());
        assert!(creds.verify(None).is_err());
    }
}
