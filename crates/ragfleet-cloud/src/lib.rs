//! ragfleet orchestration core
//!
//! Provider-neutral deployment logic for the document-QA service. Every call
//! to the control plane goes through the traits in [`provider`], so the
//! phases below can be exercised against in-memory fakes.
//!
//! # Phases
//!
//! ```text
//!  prereq ──► provision ──► (image publish) ──► manager ──► outputs
//!                                                              │
//!                        teardown ◄── (cleanup)      dns ◄─────┤
//!                                                  remote ◄────┘
//! ```

pub mod action;
pub mod artifacts;
pub mod dns;
pub mod error;
pub mod manager;
pub mod outputs;
pub mod poll;
pub mod prereq;
pub mod provider;
pub mod provision;
pub mod remote;
pub mod stack;
pub mod teardown;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod testing;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary, TeardownEntry, TeardownOutcome, TeardownReport};
pub use artifacts::ArtifactStore;
pub use dns::{DnsConfigurator, DnsOutcome};
pub use error::{CloudError, Result};
pub use manager::{Convergence, StackManager, StackOperation, resolve_latest_image};
pub use outputs::resolve_outputs;
pub use poll::{PollConfig, PollOutcome, Probe, poll_until};
pub use prereq::{PrerequisiteReport, ToolProbe, WhichProbe, verify_prerequisites};
pub use provider::{
    AuthStatus, CreatedResource, CredentialProbe, DnsApi, HostedZone, ImageCatalog, ResourceApi,
    ResourceHandle, ResourceKind, StackApi, UpdateSubmission,
};
pub use provision::{ProvisionOutcome, ProvisionRecord, Provisioner, foundational_resources};
pub use remote::{RemoteApplier, RemoteBundle, RemoteReport, RemoteTransport, ServiceStatus};
pub use stack::{Capability, ImageCandidate, StackDescriptor, StackOutputs, StackState};
pub use teardown::{TeardownCoordinator, TeardownTargets};
