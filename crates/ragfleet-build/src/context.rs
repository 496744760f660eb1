use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// Never sent to the daemon: `.ragfleet` holds private keys and the remote `.env`
const EXCLUDED_ENTRIES: [&str; 3] = [".git", ".ragfleet", "node_modules"];

/// Name the Dockerfile is stored under when it lives outside the context
const INJECTED_DOCKERFILE: &str = "Dockerfile.ragfleet";

const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

/// A gzipped tar of a build context
#[derive(Debug)]
pub struct BuildContext {
    pub archive: Vec<u8>,
    /// Dockerfile path inside the archive
    pub dockerfile: String,
}

pub struct ContextBuilder;

impl ContextBuilder {
    pub fn create_context(context_path: &Path, dockerfile_path: &Path) -> BuildResult<BuildContext> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        let inside = dockerfile_path
            .strip_prefix(context_path)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"));

        let mut archive = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive, Compression::default());
            let mut tar = Builder::new(encoder);

            let mut entries = std::fs::read_dir(context_path)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let name = entry.file_name();
                if EXCLUDED_ENTRIES.iter().any(|x| name == *x) {
                    tracing::debug!("Skipping {:?} in build context", name);
                    continue;
                }
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    tar.append_dir_all(&name, &path)?;
                } else {
                    tar.append_path_with_name(&path, &name)?;
                }
            }

            if inside.is_none() {
                let content = std::fs::read(dockerfile_path)?;
                let mut header = tar::Header::new_gnu();
                header.set_path(INJECTED_DOCKERFILE).map_err(|e| {
                    BuildError::InvalidConfig(format!("Failed to set Dockerfile path: {}", e))
                })?;
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                tar.append(&header, &content[..])?;
            }

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive.len());
        if archive.len() > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "Build context is {}MB; consider moving large files out of {}",
                archive.len() / 1024 / 1024,
                context_path.display()
            );
        }

        Ok(BuildContext {
            archive,
            dockerfile: inside.unwrap_or_else(|| INJECTED_DOCKERFILE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn entry_names(archive: &[u8]) -> Vec<String> {
        let decoder = flate2::read::GzDecoder::new(archive);
        let mut tar = tar::Archive::new(decoder);
        tar.entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_create_context() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("main.py"), "print('ok')").unwrap();
        let subdir = temp_dir.path().join("app");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("routes.py"), "").unwrap();
        let dockerfile = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3.11").unwrap();

        let context = ContextBuilder::create_context(temp_dir.path(), &dockerfile).unwrap();
        assert_eq!(context.dockerfile, "Dockerfile");

        let names = entry_names(&context.archive);
        assert!(names.iter().any(|n| n == "main.py"));
        assert!(names.iter().any(|n| n == "app/routes.py"));
        assert!(names.iter().any(|n| n == "Dockerfile"));
    }

    #[test]
    fn test_local_artifacts_are_excluded() {
        let temp_dir = tempdir().unwrap();
        let artifacts = temp_dir.path().join(".ragfleet");
        fs::create_dir(&artifacts).unwrap();
        fs::write(artifacts.join("rag-system-key.pem"), "secret").unwrap();
        let dockerfile = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine").unwrap();

        let context = ContextBuilder::create_context(temp_dir.path(), &dockerfile).unwrap();
        let names = entry_names(&context.archive);
        assert!(names.iter().all(|n| !n.contains(".ragfleet")));
    }

    #[test]
    fn test_nested_dockerfile_keeps_relative_path() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("docker")).unwrap();
        let dockerfile = temp_dir.path().join("docker/api.Dockerfile");
        fs::write(&dockerfile, "FROM alpine").unwrap();

        let context = ContextBuilder::create_context(temp_dir.path(), &dockerfile).unwrap();
        assert_eq!(context.dockerfile, "docker/api.Dockerfile");
    }

    #[test]
    fn test_outside_dockerfile_is_injected() {
        let context_dir = tempdir().unwrap();
        fs::write(context_dir.path().join("main.py"), "").unwrap();
        let other = tempdir().unwrap();
        let dockerfile = other.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine").unwrap();

        let context = ContextBuilder::create_context(context_dir.path(), &dockerfile).unwrap();
        assert_eq!(context.dockerfile, INJECTED_DOCKERFILE);
        assert!(entry_names(&context.archive).contains(&INJECTED_DOCKERFILE.to_string()));
    }
}
