//! Configuration and credentials module
//!
//! Handles:
//! - User configuration (`config.toml` in the platform config dir)
//! - The shared-secret auth token (`auth-token` in the data dir)

mod credentials;
mod settings;

pub use credentials::*;
pub use settings::*;
