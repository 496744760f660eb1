//! Control-plane abstraction traits
//!
//! The orchestration logic in this crate only talks to these traits. The AWS
//! implementation lives in `ragfleet-cloud-aws`; tests use in-memory fakes.

use crate::error::Result;
use crate::stack::{ImageCandidate, StackDescriptor, StackState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Active-credentials probe
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Check whether the configured credentials are accepted
    async fn check_auth(&self) -> Result<AuthStatus>;
}

/// Declarative stack operations
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Current state, `Absent` when no stack of that name exists
    async fn stack_state(&self, name: &str) -> Result<StackState>;

    /// Submit a create; returns once accepted, not once complete
    async fn create_stack(&self, descriptor: &StackDescriptor) -> Result<()>;

    /// Submit an update; returns once accepted, not once complete
    async fn update_stack(&self, descriptor: &StackDescriptor) -> Result<UpdateSubmission>;

    /// Submit a delete; returns once accepted
    async fn delete_stack(&self, name: &str) -> Result<()>;

    /// All outputs of the stack as key/value pairs
    async fn stack_outputs(&self, name: &str) -> Result<HashMap<String, String>>;
}

/// Answer to an update submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSubmission {
    Started,
    /// The template and parameters match what is deployed
    NoChanges,
}

/// Machine image lookup
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Images whose name matches the filter (glob syntax of the provider)
    async fn find_images(&self, name_filter: &str) -> Result<Vec<ImageCandidate>>;
}

/// Kind of foundational resource managed outside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Bucket,
    ContainerRegistry,
    KeyPair,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::ContainerRegistry => write!(f, "registry"),
            ResourceKind::KeyPair => write!(f, "key-pair"),
        }
    }
}

/// A foundational resource identified by kind and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn bucket(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Bucket, id)
    }

    pub fn registry(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::ContainerRegistry, id)
    }

    pub fn key_pair(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::KeyPair, id)
    }

    /// Get the full resource key (kind:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// What a create call handed back
#[derive(Debug, Clone, Default)]
pub struct CreatedResource {
    /// PEM private key, only for key pairs
    pub private_key: Option<String>,
}

/// Existence-checked lifecycle of foundational resources
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Idempotency probe
    async fn exists(&self, handle: &ResourceHandle) -> Result<bool>;

    /// Create the resource; `ResourceConflict` if it already exists
    async fn create(&self, handle: &ResourceHandle) -> Result<CreatedResource>;

    /// Apply first-creation hardening; a no-op for kinds without any
    async fn harden(&self, handle: &ResourceHandle) -> Result<()>;

    /// Delete, forcing through contents (images, object versions)
    async fn delete(&self, handle: &ResourceHandle) -> Result<()>;
}

/// A managed DNS zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub id: String,
    /// Zone apex, with or without the trailing dot
    pub name: String,
}

/// Managed DNS operations
#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn list_zones(&self) -> Result<Vec<HostedZone>>;

    /// Create or replace an A record
    async fn upsert_a_record(
        &self,
        zone: &HostedZone,
        name: &str,
        address: &str,
        ttl: u32,
    ) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
