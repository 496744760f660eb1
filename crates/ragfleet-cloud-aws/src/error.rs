//! AWS provider error types

use ragfleet_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install AWS CLI v2")]
    AwsCliNotFound,

    #[error("AWS authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("aws {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unexpected aws CLI output: {0}")]
    UnexpectedOutput(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl AwsError {
    /// Error code of a failed call, e.g. `RepositoryNotFoundException`
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::CommandFailed { stderr, .. } => error_code(stderr),
            _ => None,
        }
    }

    pub fn has_code(&self, codes: &[&str]) -> bool {
        self.code().is_some_and(|code| codes.contains(&code))
    }

    pub fn stderr_contains(&self, needle: &str) -> bool {
        matches!(self, AwsError::CommandFailed { stderr, .. } if stderr.contains(needle))
    }
}

/// Extract `CODE` from `An error occurred (CODE) when calling ...`
pub fn error_code(stderr: &str) -> Option<&str> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let end = stderr[start..].find(')')?;
    Some(&stderr[start..start + end])
}

impl From<AwsError> for CloudError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::CloudError(inner) => inner,
            AwsError::AwsCliNotFound => CloudError::PrerequisiteMissing {
                tool: "aws".to_string(),
                hint: "Install AWS CLI v2".to_string(),
            },
            AwsError::AuthenticationFailed(msg) => CloudError::CredentialsInvalid(msg),
            AwsError::NotFound(what) => CloudError::ResourceNotFound(what),
            AwsError::AlreadyExists(what) => CloudError::ResourceConflict(what),
            AwsError::Template(msg) => CloudError::InvalidTemplate(msg),
            AwsError::IoError(e) => CloudError::Io(e),
            AwsError::JsonError(e) => CloudError::Json(e),
            other @ AwsError::CommandFailed { .. } => CloudError::CommandFailed(other.to_string()),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
