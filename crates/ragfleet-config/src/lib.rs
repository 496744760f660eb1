//! Deployment configuration for ragfleet
//!
//! Settings come from two places: process environment variables with
//! documented defaults, and a project `.env` file holding the credentials and
//! application secrets. Both are folded into one [`DeploymentConfig`] value that
//! is handed to every phase.

pub mod deployment;
pub mod env_file;
pub mod error;

pub use deployment::{DeploymentConfig, REQUIRED_KEYS, Secrets};
pub use env_file::EnvFile;
pub use error::*;

use std::path::{Path, PathBuf};

/// Locate the env file for a project
///
/// Search order:
/// 1. `RAGFLEET_ENV_FILE` (direct path)
/// 2. `<project_root>/.env`
/// 3. `<project_root>/.ragfleet/.env`
///
/// When nothing exists the error names `<project_root>/.env`.
pub fn find_env_file(project_root: &Path) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("RAGFLEET_ENV_FILE") {
        let path = expand_home(&path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(ConfigError::EnvFileNotFound(path));
    }

    let candidates = [
        project_root.join(".env"),
        project_root.join(".ragfleet").join(".env"),
    ];

    for path in &candidates {
        if path.is_file() {
            return Ok(path.clone());
        }
    }

    Err(ConfigError::EnvFileNotFound(candidates[0].clone()))
}

/// Expand a leading `~/`
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
