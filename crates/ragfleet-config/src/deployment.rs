//! The deployment configuration value passed between phases

use crate::env_file::EnvFile;
use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Keys that must be present and non-empty in the env file
pub const REQUIRED_KEYS: [&str; 4] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "S3_BUCKET",
    "PINECONE_API_KEY",
];

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_STACK_NAME: &str = "rag-system";
pub const DEFAULT_KEY_PAIR_NAME: &str = "rag-system-key";
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.medium";
pub const DEFAULT_DB_INSTANCE_CLASS: &str = "db.t3.micro";
pub const DEFAULT_CACHE_NODE_TYPE: &str = "cache.t3.micro";
pub const DEFAULT_SSH_USER: &str = "ec2-user";

/// Env file entries; `Debug` never prints values
#[derive(Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl Secrets {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl From<&EnvFile> for Secrets {
    fn from(env_file: &EnvFile) -> Self {
        Self {
            values: env_file
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Everything a run needs to know, loaded once
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub region: String,
    pub stack_name: String,
    pub key_pair_name: String,
    pub instance_type: String,
    pub db_instance_class: String,
    pub cache_node_type: String,
    pub domain: Option<String>,
    pub ssh_user: String,
    /// Object store bucket (`S3_BUCKET`)
    pub bucket: String,
    pub secrets: Secrets,
    source_name: String,
}

impl DeploymentConfig {
    /// Load from the process environment plus the given env file
    pub fn load(env_file: &EnvFile) -> Result<Self> {
        Self::from_sources(|key| std::env::var(key).ok(), env_file)
    }

    /// Build from an arbitrary variable lookup plus the env file
    ///
    /// Process variables win over env file entries for the non-secret settings.
    pub fn from_sources<F>(lookup: F, env_file: &EnvFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in REQUIRED_KEYS {
            env_file.require(key)?;
        }

        let setting = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env_file.get(key).filter(|v| !v.is_empty()).map(str::to_string))
                .unwrap_or_else(|| default.to_string())
        };

        let stack_name = setting("STACK_NAME", DEFAULT_STACK_NAME);
        validate_stack_name(&stack_name)?;

        let domain = lookup("DOMAIN_NAME")
            .or_else(|| env_file.get("DOMAIN_NAME").map(str::to_string))
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty());

        Ok(Self {
            region: setting("AWS_REGION", DEFAULT_REGION),
            stack_name,
            key_pair_name: setting("KEY_PAIR_NAME", DEFAULT_KEY_PAIR_NAME),
            instance_type: setting("INSTANCE_TYPE", DEFAULT_INSTANCE_TYPE),
            db_instance_class: setting("DB_INSTANCE_CLASS", DEFAULT_DB_INSTANCE_CLASS),
            cache_node_type: setting("CACHE_NODE_TYPE", DEFAULT_CACHE_NODE_TYPE),
            domain,
            ssh_user: setting("SSH_USER", DEFAULT_SSH_USER),
            bucket: env_file.require("S3_BUCKET")?.to_string(),
            secrets: Secrets::from(env_file),
            source_name: env_file.path().display().to_string(),
        })
    }

    /// Database master password, required only by phases that bind the stack template
    pub fn database_password(&self) -> Result<&str> {
        let password = self
            .secrets
            .get("DB_PASSWORD")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "DB_PASSWORD".to_string(),
                source_name: self.source_name.clone(),
            })?;

        // RDS rejects '/', '@', '"' and spaces in master passwords
        if password.len() < 8 || password.contains(['/', '@', '"', ' ']) {
            return Err(ConfigError::InvalidValue {
                key: "DB_PASSWORD".to_string(),
                message: "must be at least 8 characters without '/', '@', '\"' or spaces"
                    .to_string(),
            });
        }
        Ok(password)
    }

    /// Container registry name for an application service
    pub fn registry_name(&self, service: &str) -> String {
        format!("{}-{}", self.stack_name, service)
    }
}

/// Longest stack name whose derived IAM role name (`<stack>-instance-role`)
/// still fits the 64 character limit
pub const MAX_STACK_NAME_LEN: usize = 50;

/// Registry names are derived from the stack name and must be lowercase
fn validate_stack_name(name: &str) -> Result<()> {
    let valid = name.len() <= MAX_STACK_NAME_LEN
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "STACK_NAME".to_string(),
            message: format!(
                "'{}' must start with a lowercase letter, contain only lowercase letters, digits and '-', \
                 and be at most {} characters",
                name, MAX_STACK_NAME_LEN
            ),
        })
    }
}
