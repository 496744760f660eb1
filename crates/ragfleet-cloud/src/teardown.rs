//! Reverse-order teardown
//!
//! The stack goes first and is the only step that is waited on. Everything
//! after it is best effort: each step lands in the report and never stops the
//! next one.

use crate::action::{TeardownOutcome, TeardownReport};
use crate::artifacts::ArtifactStore;
use crate::manager::StackManager;
use crate::poll::PollConfig;
use crate::provider::{ResourceApi, ResourceHandle, StackApi};
use crate::provision::SERVICES;
use ragfleet_config::DeploymentConfig;

/// Names of everything a deployment owns
#[derive(Debug, Clone)]
pub struct TeardownTargets {
    pub stack: String,
    pub registries: Vec<String>,
    pub bucket: String,
    pub key_pair: String,
}

impl From<&DeploymentConfig> for TeardownTargets {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            stack: config.stack_name.clone(),
            registries: SERVICES
                .iter()
                .map(|service| config.registry_name(service))
                .collect(),
            bucket: config.bucket.clone(),
            key_pair: config.key_pair_name.clone(),
        }
    }
}

impl TeardownTargets {
    /// Cloud-side resources after the stack, in deletion order
    fn dependents(&self) -> Vec<ResourceHandle> {
        let mut handles: Vec<ResourceHandle> = self
            .registries
            .iter()
            .map(ResourceHandle::registry)
            .collect();
        handles.push(ResourceHandle::bucket(&self.bucket));
        handles.push(ResourceHandle::key_pair(&self.key_pair));
        handles
    }

    fn local_key_label(&self) -> String {
        format!("local key {}.pem", self.key_pair)
    }
}

pub struct TeardownCoordinator<'a> {
    stacks: &'a dyn StackApi,
    resources: &'a dyn ResourceApi,
    artifacts: &'a ArtifactStore,
    poll: PollConfig,
}

impl<'a> TeardownCoordinator<'a> {
    pub fn new(
        stacks: &'a dyn StackApi,
        resources: &'a dyn ResourceApi,
        artifacts: &'a ArtifactStore,
        poll: PollConfig,
    ) -> Self {
        Self {
            stacks,
            resources,
            artifacts,
            poll,
        }
    }

    pub async fn run(&self, targets: &TeardownTargets) -> TeardownReport {
        let mut report = TeardownReport::new();
        let stack_label = format!("stack {}", targets.stack);
        let manager = StackManager::new(self.stacks, self.poll);

        let stack_gone = match manager.delete(&targets.stack).await {
            Ok(true) => {
                report.record(stack_label, TeardownOutcome::Deleted);
                true
            }
            Ok(false) => {
                report.record(stack_label, TeardownOutcome::Absent);
                true
            }
            Err(e) => {
                report.record(stack_label, TeardownOutcome::Failed(e.to_string()));
                false
            }
        };

        if !stack_gone {
            let reason = "stack deletion did not complete".to_string();
            for handle in targets.dependents() {
                report.record(handle.to_string(), TeardownOutcome::Skipped(reason.clone()));
            }
            report.record(targets.local_key_label(), TeardownOutcome::Skipped(reason));
            return report;
        }

        for handle in targets.dependents() {
            let outcome = self.delete_resource(&handle).await;
            report.record(handle.to_string(), outcome);
        }

        let outcome = match self.artifacts.remove_private_key(&targets.key_pair).await {
            Ok(true) => TeardownOutcome::Deleted,
            Ok(false) => TeardownOutcome::Absent,
            Err(e) => TeardownOutcome::Failed(e.to_string()),
        };
        report.record(targets.local_key_label(), outcome);

        report
    }

    async fn delete_resource(&self, handle: &ResourceHandle) -> TeardownOutcome {
        match self.resources.exists(handle).await {
            Ok(false) => return TeardownOutcome::Absent,
            Ok(true) => {}
            Err(e) => return TeardownOutcome::Failed(e.to_string()),
        }

        match self.resources.delete(handle).await {
            Ok(()) => TeardownOutcome::Deleted,
            Err(e) => TeardownOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResourceKind;
    use crate::stack::StackState;
    use crate::testing::{CallLog, FakeResources, FakeStacks, fast_poll, sample_config};
    use tempfile::tempdir;

    fn targets() -> TeardownTargets {
        TeardownTargets::from(&sample_config())
    }

    #[tokio::test]
    async fn test_stack_deleted_before_dependents() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        artifacts.write_private_key("rag-system-key", "PEM").await.unwrap();

        let log = CallLog::default();
        let stacks = FakeStacks::with_state(StackState::CreateComplete).logging(log.clone());
        stacks.script_after_delete(vec![StackState::DeleteInProgress, StackState::DeleteComplete]);
        let resources = FakeResources::new().logging(log.clone());
        for handle in targets().dependents() {
            resources.insert(handle);
        }

        let report = TeardownCoordinator::new(&stacks, &resources, &artifacts, fast_poll(10))
            .run(&targets())
            .await;

        assert!(report.is_success());
        assert!(
            report
                .entries
                .iter()
                .all(|e| e.outcome == TeardownOutcome::Deleted)
        );
        assert_eq!(
            log.entries(),
            vec![
                "delete-stack rag-system",
                "delete registry rag-system-api",
                "delete registry rag-system-ui",
                "delete bucket rag-docs",
                "delete key-pair rag-system-key",
            ]
        );
        assert!(!artifacts.private_key_path("rag-system-key").exists());
    }

    #[tokio::test]
    async fn test_missing_stack_skips_wait() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let stacks = FakeStacks::new();
        let resources = FakeResources::new();

        let report = TeardownCoordinator::new(&stacks, &resources, &artifacts, fast_poll(1))
            .run(&targets())
            .await;

        assert!(report.is_success());
        assert_eq!(stacks.delete_calls(), 0);
        assert!(
            report
                .entries
                .iter()
                .all(|e| e.outcome == TeardownOutcome::Absent)
        );
    }

    #[tokio::test]
    async fn test_failed_stack_delete_skips_dependents() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let stacks = FakeStacks::with_state(StackState::CreateComplete);
        stacks.script_after_delete(vec![StackState::Failed("DELETE_FAILED".into())]);
        let resources = FakeResources::new();
        resources.insert(ResourceHandle::bucket("rag-docs"));

        let report = TeardownCoordinator::new(&stacks, &resources, &artifacts, fast_poll(10))
            .run(&targets())
            .await;

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome_of("stack rag-system"),
            Some(TeardownOutcome::Failed(_))
        ));
        assert!(matches!(
            report.outcome_of("bucket rag-docs"),
            Some(TeardownOutcome::Skipped(_))
        ));
        assert!(resources.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_dependent_failure_does_not_stop_teardown() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let stacks = FakeStacks::new();
        let resources = FakeResources::new();
        for handle in targets().dependents() {
            resources.insert(handle);
        }
        resources.fail_delete(ResourceKind::Bucket);

        let report = TeardownCoordinator::new(&stacks, &resources, &artifacts, fast_poll(1))
            .run(&targets())
            .await;

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome_of("bucket rag-docs"),
            Some(TeardownOutcome::Failed(_))
        ));
        assert_eq!(
            report.outcome_of("key-pair rag-system-key"),
            Some(&TeardownOutcome::Deleted)
        );
    }
}
