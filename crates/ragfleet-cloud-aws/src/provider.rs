//! AWS implementation of the ragfleet-cloud provider traits

use crate::awscli::{AwsCli, EcrAuthorization, StackSubmission, StaticCredentials};
use crate::error::AwsError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragfleet_config::DeploymentConfig;
use ragfleet_cloud::{
    AuthStatus, CloudError, CreatedResource, CredentialProbe, DnsApi, HostedZone, ImageCandidate,
    ImageCatalog, ResourceApi, ResourceHandle, ResourceKind, StackApi, StackDescriptor, StackState,
    UpdateSubmission,
};
use std::collections::HashMap;

type CloudResult<T> = ragfleet_cloud::Result<T>;

/// AWS provider backed by the aws CLI
pub struct AwsProvider {
    cli: AwsCli,
}

impl AwsProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            cli: AwsCli::new(region),
        }
    }

    /// Region and credentials from the deployment's env file
    pub fn for_deployment(config: &DeploymentConfig) -> Self {
        let mut cli = AwsCli::new(&config.region);
        if let (Some(key), Some(secret)) = (
            config.secrets.get("AWS_ACCESS_KEY_ID"),
            config.secrets.get("AWS_SECRET_ACCESS_KEY"),
        ) {
            let token = config.secrets.get("AWS_SESSION_TOKEN").map(str::to_string);
            cli = cli.with_credentials(StaticCredentials::new(key, secret, token));
        }
        Self { cli }
    }

    pub fn region(&self) -> &str {
        self.cli.region()
    }

    /// Registry token for pushing images
    pub async fn registry_authorization(&self) -> CloudResult<EcrAuthorization> {
        Ok(self.cli.authorization_token().await?)
    }
}

fn parse_creation_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl CredentialProbe for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> CloudResult<AuthStatus> {
        match self.cli.caller_identity().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                identity.account, identity.arn
            ))),
            Err(AwsError::AwsCliNotFound) => Ok(AuthStatus::failed("aws CLI is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }
}

#[async_trait]
impl StackApi for AwsProvider {
    async fn stack_state(&self, name: &str) -> CloudResult<StackState> {
        match self.cli.describe_stack(name).await? {
            Some(stack) => {
                if let Some(reason) = &stack.stack_status_reason {
                    tracing::debug!(stack = %name, status = %stack.stack_status, %reason, "Stack status");
                }
                Ok(StackState::from_status(&stack.stack_status))
            }
            None => Ok(StackState::Absent),
        }
    }

    async fn create_stack(&self, descriptor: &StackDescriptor) -> CloudResult<()> {
        let submission = submission(descriptor);
        self.cli.create_stack(&submission).await.map_err(|e| {
            if e.has_code(&["AlreadyExistsException"]) {
                CloudError::ResourceConflict(format!("stack {}", descriptor.name))
            } else {
                e.into()
            }
        })
    }

    async fn update_stack(&self, descriptor: &StackDescriptor) -> CloudResult<UpdateSubmission> {
        let submission = submission(descriptor);
        if self.cli.update_stack(&submission).await? {
            Ok(UpdateSubmission::Started)
        } else {
            Ok(UpdateSubmission::NoChanges)
        }
    }

    async fn delete_stack(&self, name: &str) -> CloudResult<()> {
        Ok(self.cli.delete_stack(name).await?)
    }

    async fn stack_outputs(&self, name: &str) -> CloudResult<HashMap<String, String>> {
        let stack = self
            .cli
            .describe_stack(name)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("stack {}", name)))?;

        Ok(stack
            .outputs
            .into_iter()
            .map(|o| (o.output_key, o.output_value))
            .collect())
    }
}

fn submission(descriptor: &StackDescriptor) -> StackSubmission<'_> {
    StackSubmission {
        name: &descriptor.name,
        template_body: &descriptor.template_body,
        parameters: &descriptor.parameters,
        capabilities: descriptor.capabilities.iter().map(|c| c.as_str()).collect(),
    }
}

#[async_trait]
impl ImageCatalog for AwsProvider {
    async fn find_images(&self, name_filter: &str) -> CloudResult<Vec<ImageCandidate>> {
        let images = self.cli.describe_images(name_filter).await?;
        Ok(images
            .into_iter()
            .filter_map(|image| match parse_creation_date(&image.creation_date) {
                Some(created_at) => Some(ImageCandidate {
                    id: image.image_id,
                    name: image.name,
                    created_at,
                }),
                None => {
                    tracing::warn!(image = %image.image_id, date = %image.creation_date, "Unparseable creation date");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ResourceApi for AwsProvider {
    async fn exists(&self, handle: &ResourceHandle) -> CloudResult<bool> {
        let id = handle.id.as_str();
        let exists = match handle.kind {
            ResourceKind::Bucket => self.cli.bucket_exists(id).await?,
            ResourceKind::ContainerRegistry => self.cli.repository_exists(id).await?,
            ResourceKind::KeyPair => self.cli.key_pair_exists(id).await?,
        };
        Ok(exists)
    }

    async fn create(&self, handle: &ResourceHandle) -> CloudResult<CreatedResource> {
        let id = handle.id.as_str();
        match handle.kind {
            ResourceKind::Bucket => {
                self.cli.create_bucket(id).await?;
                Ok(CreatedResource::default())
            }
            ResourceKind::ContainerRegistry => {
                self.cli.create_repository(id).await?;
                Ok(CreatedResource::default())
            }
            ResourceKind::KeyPair => {
                let pem = self.cli.create_key_pair(id).await?;
                Ok(CreatedResource {
                    private_key: Some(pem),
                })
            }
        }
    }

    async fn harden(&self, handle: &ResourceHandle) -> CloudResult<()> {
        let id = handle.id.as_str();
        match handle.kind {
            ResourceKind::Bucket => self.cli.harden_bucket(id).await?,
            ResourceKind::ContainerRegistry => self.cli.enable_scan_on_push(id).await?,
            ResourceKind::KeyPair => {}
        }
        Ok(())
    }

    async fn delete(&self, handle: &ResourceHandle) -> CloudResult<()> {
        let id = handle.id.as_str();
        match handle.kind {
            ResourceKind::Bucket => self.cli.delete_bucket(id).await?,
            ResourceKind::ContainerRegistry => self.cli.delete_repository(id).await?,
            ResourceKind::KeyPair => self.cli.delete_key_pair(id).await?,
        }
        Ok(())
    }
}

#[async_trait]
impl DnsApi for AwsProvider {
    async fn list_zones(&self) -> CloudResult<Vec<HostedZone>> {
        let zones = self.cli.list_hosted_zones().await?;
        Ok(zones
            .into_iter()
            .filter(|z| !z.is_private())
            .map(|z| HostedZone {
                id: z.short_id().to_string(),
                name: z.name,
            })
            .collect())
    }

    async fn upsert_a_record(
        &self,
        zone: &HostedZone,
        name: &str,
        address: &str,
        ttl: u32,
    ) -> CloudResult<()> {
        Ok(self.cli.upsert_a_record(&zone.id, name, address, ttl).await?)
    }
}
