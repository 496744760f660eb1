//! Orchestration error types

use thiserror::Error;

/// Orchestration errors
///
/// `ResourceConflict` is the only non-fatal variant: provisioning treats it as
/// "already satisfied". Everything else aborts the current phase.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Required tool not found: {tool}. {hint}")]
    PrerequisiteMissing { tool: String, hint: String },

    #[error("Control-plane credentials are not usable: {0}")]
    CredentialsInvalid(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Resource already exists: {0}")]
    ResourceConflict(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("{operation} of {resource} failed with status {status}; left in place for inspection")]
    AsyncOperationFailed {
        operation: String,
        resource: String,
        status: String,
    },

    #[error(
        "{operation} of {resource} did not finish after {attempts} checks (last status: {last_status}); it may still be running"
    )]
    AsyncOperationTimedOut {
        operation: String,
        resource: String,
        attempts: u32,
        last_status: String,
    },

    #[error("Remote execution failed: {0}")]
    RemoteExecutionFailed(String),

    #[error("Outputs of stack {stack} are unavailable while it is {state}")]
    OutputsUnavailable { stack: String, state: String },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error ends the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CloudError::ResourceConflict(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_non_fatal() {
        assert!(!CloudError::ResourceConflict("bucket".into()).is_fatal());
        assert!(CloudError::RemoteExecutionFailed("ssh".into()).is_fatal());
        assert!(
            CloudError::AsyncOperationTimedOut {
                operation: "create".into(),
                resource: "stack".into(),
                attempts: 3,
                last_status: "CREATE_IN_PROGRESS".into(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_timeout_and_failure_messages_differ() {
        let failed = CloudError::AsyncOperationFailed {
            operation: "create".into(),
            resource: "stack rag-system".into(),
            status: "ROLLBACK_COMPLETE".into(),
        };
        let timed_out = CloudError::AsyncOperationTimedOut {
            operation: "create".into(),
            resource: "stack rag-system".into(),
            attempts: 60,
            last_status: "CREATE_IN_PROGRESS".into(),
        };

        assert!(failed.to_string().contains("left in place"));
        assert!(timed_out.to_string().contains("may still be running"));
    }
}
