//! Local run artifacts
//!
//! Everything a run leaves on the local machine lives under `.ragfleet/` in
//! the project root: the rendered template, the generated private key and the
//! files staged for the remote host.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

const ARTIFACT_DIR: &str = ".ragfleet";
const REMOTE_DIR: &str = "remote";

/// Reads and writes files under `<project_root>/.ragfleet`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    project_root: PathBuf,
}

impl ArtifactStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.project_root.join(ARTIFACT_DIR)
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.dir().join(REMOTE_DIR)
    }

    pub fn template_path(&self, stack_name: &str) -> PathBuf {
        self.dir().join(format!("{}.template.json", stack_name))
    }

    pub fn private_key_path(&self, key_name: &str) -> PathBuf {
        self.dir().join(format!("{}.pem", key_name))
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
            tracing::debug!("Created artifact directory: {}", dir.display());
        }
        Ok(())
    }

    /// Persist the rendered template for inspection
    pub async fn write_template(&self, stack_name: &str, body: &str) -> Result<PathBuf> {
        self.ensure_dir(&self.dir()).await?;
        let path = self.template_path(stack_name);
        fs::write(&path, body).await?;
        tracing::debug!("Wrote template: {}", path.display());
        Ok(path)
    }

    /// Persist a private key readable by the owner only
    pub async fn write_private_key(&self, key_name: &str, pem: &str) -> Result<PathBuf> {
        self.ensure_dir(&self.dir()).await?;
        let path = self.private_key_path(key_name);
        write_owner_only(&path, pem).await?;
        tracing::info!("Saved private key: {}", path.display());
        Ok(path)
    }

    /// Stage a file for the remote host
    ///
    /// `secret` files are written with mode 0600.
    pub async fn write_remote_file(&self, name: &str, content: &str, secret: bool) -> Result<PathBuf> {
        let dir = self.remote_dir();
        self.ensure_dir(&dir).await?;
        let path = dir.join(name);
        if secret {
            write_owner_only(&path, content).await?;
        } else {
            fs::write(&path, content).await?;
        }
        tracing::debug!("Staged remote file: {}", path.display());
        Ok(path)
    }

    /// Remove the private key file, `false` when there was none
    pub async fn remove_private_key(&self, key_name: &str) -> Result<bool> {
        let path = self.private_key_path(key_name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        tracing::debug!("Removed private key: {}", path.display());
        Ok(true)
    }
}

#[cfg(unix)]
async fn write_owner_only(path: &Path, content: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // Existing files keep their mode on truncate, so remove first.
    if path.exists() {
        fs::remove_file(path).await?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true).mode(0o600);
    let mut file = options.open(path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes()).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_owner_only(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).await?;
    Ok(())
}
