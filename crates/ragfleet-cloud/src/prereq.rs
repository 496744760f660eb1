//! Local tool and credential checks

use crate::error::{CloudError, Result};
use crate::provider::CredentialProbe;
use async_trait::async_trait;
use tokio::process::Command;

/// A local executable the run depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRequirement {
    pub name: &'static str,
    pub required: bool,
    pub hint: &'static str,
}

pub const TOOLS: [ToolRequirement; 5] = [
    ToolRequirement {
        name: "aws",
        required: true,
        hint: "Install AWS CLI v2: https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html",
    },
    ToolRequirement {
        name: "docker",
        required: true,
        hint: "Install Docker: https://docs.docker.com/get-docker/",
    },
    ToolRequirement {
        name: "ssh",
        required: true,
        hint: "Install an OpenSSH client",
    },
    ToolRequirement {
        name: "scp",
        required: true,
        hint: "Install an OpenSSH client",
    },
    ToolRequirement {
        name: "session-manager-plugin",
        required: false,
        hint: "Optional, enables `aws ssm start-session` to the instance",
    },
];

#[async_trait]
pub trait ToolProbe: Send + Sync {
    async fn is_available(&self, tool: &str) -> bool;
}

/// Looks tools up on `PATH` with `which`
pub struct WhichProbe;

#[async_trait]
impl ToolProbe for WhichProbe {
    async fn is_available(&self, tool: &str) -> bool {
        match Command::new("which").arg(tool).output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!(tool = %tool, error = %e, "which failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrerequisiteReport {
    pub available: Vec<&'static str>,
    pub missing_optional: Vec<ToolRequirement>,
    pub account: Option<String>,
}

/// Fail on the first missing required tool, then probe credentials
pub async fn verify_prerequisites(
    tools: &dyn ToolProbe,
    credentials: &dyn CredentialProbe,
) -> Result<PrerequisiteReport> {
    let mut report = PrerequisiteReport::default();

    for tool in TOOLS {
        if tools.is_available(tool.name).await {
            tracing::debug!(tool = %tool.name, "Found");
            report.available.push(tool.name);
        } else if tool.required {
            return Err(CloudError::PrerequisiteMissing {
                tool: tool.name.to_string(),
                hint: tool.hint.to_string(),
            });
        } else {
            tracing::warn!(tool = %tool.name, "Optional tool not found");
            report.missing_optional.push(tool);
        }
    }

    let auth = credentials.check_auth().await?;
    if !auth.authenticated {
        return Err(CloudError::CredentialsInvalid(
            auth.error
                .unwrap_or_else(|| format!("{} credentials were rejected", credentials.name())),
        ));
    }
    tracing::info!(provider = %credentials.name(), account = ?auth.account_info, "Credentials valid");
    report.account = auth.account_info;

    Ok(report)
}
