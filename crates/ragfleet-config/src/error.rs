use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Environment file not found: {0}\n\
        Create it with at least AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, S3_BUCKET and PINECONE_API_KEY,\n\
        or point RAGFLEET_ENV_FILE / --env-file at an existing file"
    )]
    EnvFileNotFound(PathBuf),

    #[error("Required configuration key '{key}' is missing or empty in {source_name}")]
    MissingKey { key: String, source_name: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// The configuration key this error is about, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::MissingKey { key, .. } | ConfigError::InvalidValue { key, .. } => {
                Some(key)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
