//! Create-or-skip provisioning of foundational resources
//!
//! Bucket, container registries and key pair live outside the stack. Each is
//! probed first; a create is only issued when the probe says it is absent.

use crate::action::{Action, ActionType};
use crate::artifacts::ArtifactStore;
use crate::error::{CloudError, Result};
use crate::provider::{ResourceApi, ResourceHandle, ResourceKind};
use ragfleet_config::DeploymentConfig;

/// Services that get a container registry each
pub const SERVICES: [&str; 2] = ["api", "ui"];

/// What provisioning did for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Probe found it, nothing was called
    Existing,
    Created,
    /// Create was answered with "already exists"
    AlreadySatisfied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRecord {
    pub handle: ResourceHandle,
    pub outcome: ProvisionOutcome,
}

/// Foundational resources of a deployment, in creation order
pub fn foundational_resources(config: &DeploymentConfig) -> Vec<ResourceHandle> {
    let mut handles = vec![ResourceHandle::bucket(&config.bucket)];
    handles.extend(
        SERVICES
            .iter()
            .map(|service| ResourceHandle::registry(config.registry_name(service))),
    );
    handles.push(ResourceHandle::key_pair(&config.key_pair_name));
    handles
}

pub struct Provisioner<'a> {
    api: &'a dyn ResourceApi,
    artifacts: &'a ArtifactStore,
}

impl<'a> Provisioner<'a> {
    pub fn new(api: &'a dyn ResourceApi, artifacts: &'a ArtifactStore) -> Self {
        Self { api, artifacts }
    }

    pub async fn ensure_all(&self, handles: &[ResourceHandle]) -> Result<Vec<ProvisionRecord>> {
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            records.push(self.ensure(handle).await?);
        }
        Ok(records)
    }

    pub async fn ensure(&self, handle: &ResourceHandle) -> Result<ProvisionRecord> {
        if self.api.exists(handle).await? {
            tracing::info!(resource = %handle, "Already exists, skipping");
            if handle.kind == ResourceKind::KeyPair {
                self.check_local_key(&handle.id);
            }
            return Ok(ProvisionRecord {
                handle: handle.clone(),
                outcome: ProvisionOutcome::Existing,
            });
        }

        tracing::info!(resource = %handle, "Creating");
        let created = match self.api.create(handle).await {
            Ok(created) => created,
            Err(CloudError::ResourceConflict(detail)) => {
                tracing::warn!(resource = %handle, %detail, "Created concurrently, treating as present");
                return Ok(ProvisionRecord {
                    handle: handle.clone(),
                    outcome: ProvisionOutcome::AlreadySatisfied,
                });
            }
            Err(e) => return Err(e),
        };

        if let Some(pem) = created.private_key.as_deref() {
            self.artifacts.write_private_key(&handle.id, pem).await?;
        }

        self.api.harden(handle).await?;
        tracing::info!(resource = %handle, "Created");

        Ok(ProvisionRecord {
            handle: handle.clone(),
            outcome: ProvisionOutcome::Created,
        })
    }

    /// Probe only, for dry runs
    pub async fn plan(&self, handles: &[ResourceHandle]) -> Result<Vec<Action>> {
        let mut actions = Vec::with_capacity(handles.len());
        for handle in handles {
            let exists = self.api.exists(handle).await?;
            let (action_type, description) = if exists {
                (ActionType::NoOp, "exists")
            } else {
                (ActionType::Create, "create and harden")
            };
            actions.push(Action::new(
                action_type,
                handle.kind.to_string(),
                handle.id.clone(),
                description,
            ));
        }
        Ok(actions)
    }

    fn check_local_key(&self, key_name: &str) {
        let path = self.artifacts.private_key_path(key_name);
        if !path.exists() {
            tracing::warn!(
                key = %key_name,
                path = %path.display(),
                "Key pair exists but its private key is not stored locally; SSH will need it"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeResources, sample_config};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    #[test]
    fn test_foundational_resources() {
        let config = sample_config();
        let keys: Vec<String> = foundational_resources(&config)
            .iter()
            .map(|h| h.key())
            .collect();
        assert_eq!(
            keys,
            vec![
                "bucket:rag-docs",
                "registry:rag-system-api",
                "registry:rag-system-ui",
                "key-pair:rag-system-key",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_run_issues_no_creates() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let api = FakeResources::new();
        let handles = foundational_resources(&sample_config());
        let provisioner = Provisioner::new(&api, &artifacts);

        let first = provisioner.ensure_all(&handles).await.unwrap();
        assert!(first.iter().all(|r| r.outcome == ProvisionOutcome::Created));
        assert_eq!(api.create_calls().len(), 4);
        assert_eq!(api.hardened().len(), 4);

        let second = provisioner.ensure_all(&handles).await.unwrap();
        assert!(second.iter().all(|r| r.outcome == ProvisionOutcome::Existing));
        assert_eq!(api.create_calls().len(), 4);
        assert_eq!(
            api.existing(),
            handles.iter().cloned().collect::<BTreeSet<_>>()
        );
    }

    #[tokio::test]
    async fn test_key_pair_private_key_is_saved() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let api = FakeResources::new();
        let provisioner = Provisioner::new(&api, &artifacts);

        provisioner
            .ensure(&ResourceHandle::key_pair("rag-system-key"))
            .await
            .unwrap();

        let saved = std::fs::read_to_string(artifacts.private_key_path("rag-system-key")).unwrap();
        assert!(saved.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn test_conflict_is_satisfied() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let api = FakeResources::new();
        api.conflict_on_create();
        let provisioner = Provisioner::new(&api, &artifacts);

        let record = provisioner
            .ensure(&ResourceHandle::bucket("rag-docs"))
            .await
            .unwrap();
        assert_eq!(record.outcome, ProvisionOutcome::AlreadySatisfied);
        assert!(api.hardened().is_empty());
    }

    #[tokio::test]
    async fn test_plan_does_not_mutate() {
        let temp_dir = tempdir().unwrap();
        let artifacts = ArtifactStore::new(temp_dir.path());
        let api = FakeResources::new();
        api.insert(ResourceHandle::bucket("rag-docs"));
        let provisioner = Provisioner::new(&api, &artifacts);

        let actions = provisioner
            .plan(&foundational_resources(&sample_config()))
            .await
            .unwrap();

        assert_eq!(actions[0].action_type, ActionType::NoOp);
        assert!(actions[1..].iter().all(|a| a.action_type == ActionType::Create));
        assert!(api.create_calls().is_empty());
    }
}
