//! Per-run options and loaded state

use clap::Args;
use ragfleet_cloud::{ArtifactStore, PollConfig};
use ragfleet_cloud_aws::AwsProvider;
use ragfleet_config::{ConfigError, DeploymentConfig, EnvFile};
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project directory holding docker-compose.yml and .env
    #[arg(long, global = true, env = "RAGFLEET_PROJECT_ROOT", default_value = ".")]
    pub project_root: PathBuf,

    /// Env file (default: <project-root>/.env)
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Compose file (default: <project-root>/docker-compose.yml)
    #[arg(long, global = true)]
    pub compose_file: Option<PathBuf>,

    /// Seconds to wait for the node to settle before the remote handshake
    #[arg(long, global = true, env = "RAGFLEET_SETTLE_SECS", default_value_t = 60)]
    pub settle_secs: u64,

    /// Seconds between two stack status checks
    #[arg(long, global = true, env = "RAGFLEET_POLL_INTERVAL", default_value_t = 30)]
    pub poll_interval: u64,

    /// Maximum number of stack status checks
    #[arg(long, global = true, env = "RAGFLEET_POLL_ATTEMPTS", default_value_t = 80)]
    pub max_attempts: u32,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_root: PathBuf,
    pub env_file: Option<PathBuf>,
    pub compose_file: PathBuf,
    pub settle_delay: Duration,
    pub poll: PollConfig,
}

impl From<&GlobalArgs> for RunOptions {
    fn from(args: &GlobalArgs) -> Self {
        let compose_file = args
            .compose_file
            .clone()
            .unwrap_or_else(|| args.project_root.join("docker-compose.yml"));

        Self {
            project_root: args.project_root.clone(),
            env_file: args.env_file.clone(),
            compose_file,
            settle_delay: Duration::from_secs(args.settle_secs),
            poll: PollConfig::new(Duration::from_secs(args.poll_interval), args.max_attempts),
        }
    }
}

impl RunOptions {
    fn resolve_env_file(&self) -> ragfleet_config::Result<PathBuf> {
        match &self.env_file {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(ConfigError::EnvFileNotFound(path.clone())),
            None => ragfleet_config::find_env_file(&self.project_root),
        }
    }
}

/// Everything a command works with, loaded once per run
pub struct RunContext {
    pub options: RunOptions,
    pub config: DeploymentConfig,
    pub artifacts: ArtifactStore,
    pub provider: AwsProvider,
}

impl RunContext {
    pub fn load(options: RunOptions) -> anyhow::Result<Self> {
        let env_path = options.resolve_env_file()?;
        let env_file = EnvFile::load(&env_path)?;
        let config = DeploymentConfig::load(&env_file)?;
        tracing::debug!(?config, env_file = %env_path.display(), "Configuration loaded");

        Ok(Self {
            artifacts: ArtifactStore::new(&options.project_root),
            provider: AwsProvider::for_deployment(&config),
            options,
            config,
        })
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.artifacts.private_key_path(&self.config.key_pair_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(root: &std::path::Path) -> GlobalArgs {
        GlobalArgs {
            project_root: root.to_path_buf(),
            env_file: None,
            compose_file: None,
            settle_secs: 5,
            poll_interval: 2,
            max_attempts: 3,
            verbose: false,
        }
    }

    #[test]
    fn test_options_defaults_to_project_files() {
        let options = RunOptions::from(&args(std::path::Path::new("/srv/rag")));
        assert_eq!(options.compose_file, PathBuf::from("/srv/rag/docker-compose.yml"));
        assert_eq!(options.settle_delay, Duration::from_secs(5));
        assert_eq!(options.poll.max_attempts, 3);
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut global = args(dir.path());
        global.env_file = Some(dir.path().join("prod.env"));

        let options = RunOptions::from(&global);
        assert!(matches!(
            options.resolve_env_file(),
            Err(ConfigError::EnvFileNotFound(_))
        ));

        fs::write(dir.path().join("prod.env"), "S3_BUCKET=x\n").unwrap();
        assert_eq!(options.resolve_env_file().unwrap(), dir.path().join("prod.env"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_reads_env_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "AWS_ACCESS_KEY_ID=AKIA\nAWS_SECRET_ACCESS_KEY=s\nS3_BUCKET=rag-docs\nPINECONE_API_KEY=pc\n",
        )
        .unwrap();

        temp_env::with_vars_unset(["RAGFLEET_ENV_FILE", "STACK_NAME", "KEY_PAIR_NAME"], || {
            let ctx = RunContext::load(RunOptions::from(&args(dir.path()))).unwrap();
            assert_eq!(ctx.config.bucket, "rag-docs");
            assert_eq!(ctx.config.stack_name, "rag-system");
            assert_eq!(
                ctx.private_key_path(),
                dir.path().join(".ragfleet").join("rag-system-key.pem")
            );
        });
    }
}
