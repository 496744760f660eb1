//! Stack state machine types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of an infrastructure stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackState {
    Absent,
    Creating,
    CreateComplete,
    Updating,
    UpdateComplete,
    /// `UPDATE_ROLLBACK_COMPLETE`: the last update was undone and the stack
    /// is back on its previous, working template
    UpdateRolledBack,
    DeleteInProgress,
    DeleteComplete,
    /// Carries the raw control-plane status (e.g. `ROLLBACK_COMPLETE`)
    Failed(String),
}

impl StackState {
    /// Map a CloudFormation `StackStatus` string
    ///
    /// Every `*_FAILED` status, every rollback still in progress and a
    /// rolled-back create are failures. A rolled-back update is stable.
    pub fn from_status(status: &str) -> Self {
        match status {
            "CREATE_IN_PROGRESS" | "REVIEW_IN_PROGRESS" => StackState::Creating,
            "CREATE_COMPLETE" | "IMPORT_COMPLETE" => StackState::CreateComplete,
            "UPDATE_IN_PROGRESS" | "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" | "IMPORT_IN_PROGRESS" => {
                StackState::Updating
            }
            "UPDATE_COMPLETE" => StackState::UpdateComplete,
            "UPDATE_ROLLBACK_COMPLETE" => StackState::UpdateRolledBack,
            "DELETE_IN_PROGRESS" => StackState::DeleteInProgress,
            "DELETE_COMPLETE" => StackState::DeleteComplete,
            other => StackState::Failed(other.to_string()),
        }
    }

    /// Stable with usable outputs, rolled-back updates included
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            StackState::CreateComplete | StackState::UpdateComplete | StackState::UpdateRolledBack
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StackState::Failed(_))
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            StackState::Creating | StackState::Updating | StackState::DeleteInProgress
        )
    }

    /// Gone, either never created or fully deleted
    pub fn is_gone(&self) -> bool {
        matches!(self, StackState::Absent | StackState::DeleteComplete)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackState::Absent => write!(f, "ABSENT"),
            StackState::Creating => write!(f, "CREATING"),
            StackState::CreateComplete => write!(f, "CREATE_COMPLETE"),
            StackState::Updating => write!(f, "UPDATING"),
            StackState::UpdateComplete => write!(f, "UPDATE_COMPLETE"),
            StackState::UpdateRolledBack => write!(f, "UPDATE_ROLLBACK_COMPLETE"),
            StackState::DeleteInProgress => write!(f, "DELETE_IN_PROGRESS"),
            StackState::DeleteComplete => write!(f, "DELETE_COMPLETE"),
            StackState::Failed(status) => write!(f, "FAILED ({})", status),
        }
    }
}

/// Control-plane capability acknowledgements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Iam,
    NamedIam,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Iam => "CAPABILITY_IAM",
            Capability::NamedIam => "CAPABILITY_NAMED_IAM",
        }
    }
}

/// Everything submitted for a create or update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDescriptor {
    pub name: String,

    /// Rendered template document
    pub template_body: String,

    /// Resolved parameter values
    pub parameters: BTreeMap<String, String>,

    pub capabilities: Vec<Capability>,
}

/// Named outputs read from a converged stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs {
    pub public_ip: Option<String>,
    pub database_endpoint: Option<String>,
    pub cache_endpoint: Option<String>,
}

impl StackOutputs {
    /// Public address or an error naming the missing output
    pub fn require_public_ip(&self) -> crate::Result<&str> {
        self.public_ip.as_deref().ok_or_else(|| {
            crate::CloudError::ResourceNotFound("stack output PublicIp".to_string())
        })
    }
}

/// A machine image considered for the compute instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Newest candidate by creation time
///
/// Candidates are sorted ascending and the last one is taken, so ties resolve
/// to the later position in the listing.
pub fn select_latest_image(mut candidates: Vec<ImageCandidate>) -> Option<ImageCandidate> {
    candidates.sort_by_key(|c| c.created_at);
    candidates.pop()
}
