use colored::Colorize;

/// Connect to the local Docker daemon and ping it
pub async fn connect() -> anyhow::Result<bollard::Docker> {
    let result = match bollard::Docker::connect_with_local_defaults() {
        Ok(docker) => docker.ping().await.map(|_| docker),
        Err(e) => Err(e),
    };

    result.map_err(|e| {
        eprintln!();
        eprintln!("{}", "✗ Docker connection error".red().bold());
        eprintln!();
        eprintln!("{}", "Cause:".yellow());
        eprintln!("  {}", e);
        eprintln!();
        eprintln!("{}", "How to fix:".yellow());
        eprintln!("  • Make sure the Docker daemon is running");
        eprintln!("  • Check that `docker ps` works for the current user");
        anyhow::anyhow!("Could not connect to Docker")
    })
}
