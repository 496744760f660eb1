//! Stack convergence
//!
//! Drives a stack from whatever state it is in to a `*_COMPLETE` terminal:
//! absent stacks are created, complete stacks are updated, in-flight
//! operations are awaited first and failed stacks are left alone.

use crate::error::{CloudError, Result};
use crate::poll::{PollConfig, PollOutcome, Probe, poll_until};
use crate::provider::{ImageCatalog, StackApi, UpdateSubmission};
use crate::stack::{ImageCandidate, StackDescriptor, StackState, select_latest_image};

/// What the manager did to reach convergence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOperation {
    Created,
    Updated,
    /// Update submitted but nothing differed
    Unchanged,
}

/// Final result of a converge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    pub operation: StackOperation,
    pub state: StackState,
}

/// Resolve the newest image matching `name_filter`
pub async fn resolve_latest_image(
    catalog: &dyn ImageCatalog,
    name_filter: &str,
) -> Result<ImageCandidate> {
    let candidates = catalog.find_images(name_filter).await?;
    tracing::debug!(filter = %name_filter, count = candidates.len(), "Image candidates");

    let image = select_latest_image(candidates).ok_or_else(|| {
        CloudError::ResourceNotFound(format!("no machine image matches {}", name_filter))
    })?;
    tracing::info!(image_id = %image.id, name = %image.name, "Resolved base image");
    Ok(image)
}

pub struct StackManager<'a> {
    api: &'a dyn StackApi,
    poll: PollConfig,
}

impl<'a> StackManager<'a> {
    pub fn new(api: &'a dyn StackApi, poll: PollConfig) -> Self {
        Self { api, poll }
    }

    pub async fn state(&self, name: &str) -> Result<StackState> {
        self.api.stack_state(name).await
    }

    /// Create or update the stack and wait for a terminal state
    pub async fn converge(&self, descriptor: &StackDescriptor) -> Result<Convergence> {
        let name = descriptor.name.as_str();
        let mut state = self.api.stack_state(name).await?;
        tracing::info!(stack = %name, state = %state, "Current stack state");

        if state.is_in_progress() {
            tracing::info!(stack = %name, "Waiting for in-flight operation to finish");
            state = self.wait_settled(name, "wait").await?;
        }

        match state {
            StackState::Absent | StackState::DeleteComplete => {
                tracing::info!(stack = %name, "Creating stack");
                self.api.create_stack(descriptor).await?;
                let state = self.wait_complete(name, "create").await?;
                Ok(Convergence {
                    operation: StackOperation::Created,
                    state,
                })
            }
            StackState::CreateComplete | StackState::UpdateComplete | StackState::UpdateRolledBack => {
                if state == StackState::UpdateRolledBack {
                    tracing::warn!(stack = %name, "Previous update was rolled back, retrying");
                }
                tracing::info!(stack = %name, "Updating stack");
                match self.api.update_stack(descriptor).await? {
                    UpdateSubmission::NoChanges => {
                        tracing::info!(stack = %name, "No updates are to be performed");
                        Ok(Convergence {
                            operation: StackOperation::Unchanged,
                            state,
                        })
                    }
                    UpdateSubmission::Started => {
                        let state = self.wait_complete(name, "update").await?;
                        Ok(Convergence {
                            operation: StackOperation::Updated,
                            state,
                        })
                    }
                }
            }
            StackState::Failed(status) => Err(CloudError::AsyncOperationFailed {
                operation: "converge".to_string(),
                resource: format!("stack {}", name),
                status,
            }),
            other => Err(CloudError::ApiError(format!(
                "stack {} is still {} after waiting",
                name, other
            ))),
        }
    }

    /// Submit a delete and wait until the stack is gone
    ///
    /// Returns `false` without waiting when the stack does not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let state = self.api.stack_state(name).await?;
        if state.is_gone() {
            tracing::info!(stack = %name, "Stack does not exist, nothing to delete");
            return Ok(false);
        }

        self.api.delete_stack(name).await?;
        let api = self.api;
        let outcome = poll_until(&self.poll, "delete", || async move {
            let state = api.stack_state(name).await?;
            Ok::<_, CloudError>(if state.is_gone() {
                Probe::Done(state)
            } else if state.is_failed() {
                Probe::Failed(state)
            } else {
                Probe::Pending(state)
            })
        })
        .await?;

        into_result(outcome, "delete", name).map(|_| true)
    }

    async fn wait_complete(&self, name: &str, operation: &str) -> Result<StackState> {
        let api = self.api;
        let outcome = poll_until(&self.poll, operation, || async move {
            let state = api.stack_state(name).await?;
            Ok::<_, CloudError>(if state == StackState::UpdateRolledBack {
                Probe::Failed(state)
            } else if state.is_complete() {
                Probe::Done(state)
            } else if state.is_in_progress() {
                Probe::Pending(state)
            } else {
                Probe::Failed(state)
            })
        })
        .await?;

        into_result(outcome, operation, name)
    }

    /// Wait for any terminal state, failures included
    async fn wait_settled(&self, name: &str, operation: &str) -> Result<StackState> {
        let api = self.api;
        let outcome = poll_until(&self.poll, operation, || async move {
            let state = api.stack_state(name).await?;
            Ok::<_, CloudError>(if state.is_terminal() {
                Probe::Done(state)
            } else {
                Probe::Pending(state)
            })
        })
        .await?;

        into_result(outcome, operation, name)
    }
}

fn into_result(outcome: PollOutcome<StackState>, operation: &str, name: &str) -> Result<StackState> {
    match outcome {
        PollOutcome::Completed { value, attempts } => {
            tracing::info!(stack = %name, state = %value, attempts, "Stack settled");
            Ok(value)
        }
        PollOutcome::Failed { value, .. } => Err(CloudError::AsyncOperationFailed {
            operation: operation.to_string(),
            resource: format!("stack {}", name),
            status: match value {
                StackState::Failed(status) => status,
                other => other.to_string(),
            },
        }),
        PollOutcome::TimedOut { last, attempts } => Err(CloudError::AsyncOperationTimedOut {
            operation: operation.to_string(),
            resource: format!("stack {}", name),
            attempts,
            last_status: last.to_string(),
        }),
    }
}
