use ragfleet_cloud::CloudError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Compose file not found: {0}")]
    ComposeNotFound(PathBuf),

    #[error("Invalid compose file {path}: {message}")]
    InvalidCompose { path: PathBuf, message: String },

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build of {service} failed: {message}")]
    BuildFailed { service: String, message: String },

    #[error("Push of {image} failed: {message}")]
    PushFailed { image: String, message: String },

    #[error("Invalid image tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Message with a hint on how to fix the problem
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => format!(
                "Dockerfile not found: {}\n\
                 \n\
                 Check the `build.dockerfile` entry in docker-compose.yml.\n\
                 The path is relative to the build context.",
                path.display()
            ),
            BuildError::ContextNotFound(path) => format!(
                "Build context not found: {}\n\
                 \n\
                 Check the `build` / `build.context` entry in docker-compose.yml.",
                path.display()
            ),
            BuildError::DockerConnection(e) => format!(
                "Could not talk to the Docker daemon: {}\n\
                 \n\
                 Make sure Docker is running and your user can access its socket.",
                e
            ),
            BuildError::AuthFailed { registry, message } => format!(
                "Registry authentication failed for {}: {}\n\
                 \n\
                 The registry token is short-lived; re-run the command to fetch a new one.",
                registry, message
            ),
            _ => self.to_string(),
        }
    }
}

impl From<BuildError> for CloudError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Io(e) => CloudError::Io(e),
            BuildError::ComposeNotFound(_)
            | BuildError::InvalidCompose { .. }
            | BuildError::DockerfileNotFound(_)
            | BuildError::ContextNotFound(_)
            | BuildError::InvalidConfig(_) => CloudError::ConfigInvalid(err.to_string()),
            BuildError::AuthFailed { .. } => CloudError::CredentialsInvalid(err.to_string()),
            other => CloudError::CommandFailed(other.to_string()),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
