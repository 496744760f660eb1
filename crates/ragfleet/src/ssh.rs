//! `ssh`/`scp` transport to the application node
//!
//! Host keys are not checked: the instance was created by this run and its
//! key cannot be known in advance.

use async_trait::async_trait;
use ragfleet_cloud::{CloudError, RemoteTransport};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

type CloudResult<T> = ragfleet_cloud::Result<T>;

pub struct SshTransport {
    user: String,
    host: String,
    key: PathBuf,
}

impl SshTransport {
    pub fn new(user: impl Into<String>, host: impl Into<String>, key: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            key: key.into(),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            "ConnectTimeout=20".to_string(),
        ]
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    fn scp_args(&self, local: &Path, remote_dir: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push(local.display().to_string());
        args.push(format!("{}:{}/", self.destination(), remote_dir.trim_end_matches('/')));
        args
    }

    /// Interactive login command for the summary
    pub fn login_command(&self) -> String {
        format!(
            "ssh -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null {}",
            self.key.display(),
            self.destination()
        )
    }

    async fn run(&self, program: &str, args: Vec<String>) -> CloudResult<String> {
        tracing::debug!("Running: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::CommandFailed(format!(
                "{} to {} exited with {}: {}",
                program,
                self.destination(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    fn target(&self) -> String {
        self.destination()
    }

    async fn copy(&self, local: &Path, remote_dir: &str) -> CloudResult<()> {
        self.run("scp", self.scp_args(local, remote_dir)).await?;
        Ok(())
    }

    async fn exec(&self, command: &str) -> CloudResult<String> {
        self.run("ssh", self.ssh_args(command)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SshTransport {
        SshTransport::new("ec2-user", "203.0.113.5", "/p/.ragfleet/rag-system-key.pem")
    }

    #[test]
    fn test_ssh_args_disable_host_key_checks() {
        let args = transport().ssh_args("uptime");
        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/p/.ragfleet/rag-system-key.pem");
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        assert_eq!(args[args.len() - 2], "ec2-user@203.0.113.5");
        assert_eq!(args[args.len() - 1], "uptime");
    }

    #[test]
    fn test_scp_targets_remote_directory() {
        let args = transport().scp_args(Path::new("/p/.ragfleet/remote/.env"), "~/app");
        assert_eq!(args[args.len() - 2], "/p/.ragfleet/remote/.env");
        assert_eq!(args[args.len() - 1], "ec2-user@203.0.113.5:~/app/");
    }

    #[test]
    fn test_login_command() {
        let cmd = transport().login_command();
        assert!(cmd.starts_with("ssh -i /p/.ragfleet/rag-system-key.pem"));
        assert!(cmd.ends_with("ec2-user@203.0.113.5"));
    }
}
