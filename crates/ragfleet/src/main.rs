mod commands;
mod docker;
mod output;
mod run;
mod ssh;

use clap::{Parser, Subcommand};
use run::{GlobalArgs, RunContext, RunOptions};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragfleet", version)]
#[command(about = "Deploy the document QA service to AWS", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision everything and start the services (default)
    Deploy,
    /// Rebuild images and re-apply an existing deployment
    Update,
    /// Delete every resource the deployment created
    Cleanup {
        /// Confirm the deletion
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show what a deploy would change, without changing anything
    DryRun,
}

const DEFAULT_FILTER: &str =
    "warn,ragfleet=info,ragfleet_cloud=info,ragfleet_cloud_aws=info,ragfleet_build=info";
const VERBOSE_FILTER: &str =
    "info,ragfleet=debug,ragfleet_cloud=debug,ragfleet_cloud_aws=debug,ragfleet_build=debug";

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let command = cli.command.unwrap_or(Commands::Deploy);

    // Refuse before anything is loaded
    if let Commands::Cleanup { yes: false } = command {
        commands::cleanup::refuse_without_confirmation();
        return ExitCode::SUCCESS;
    }

    match execute(command, RunOptions::from(&cli.global)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error_chain(&e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, options: RunOptions) -> anyhow::Result<()> {
    let ctx = RunContext::load(options)?;
    tracing::debug!(stack = %ctx.config.stack_name, region = %ctx.config.region, "Starting run");

    match command {
        Commands::Deploy => commands::deploy::handle(&ctx).await,
        Commands::Update => commands::update::handle(&ctx).await,
        Commands::Cleanup { .. } => commands::cleanup::handle(&ctx).await,
        Commands::DryRun => commands::dry_run::handle(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_deploy() {
        let cli = Cli::parse_from(["ragfleet"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.global.project_root, std::path::PathBuf::from("."));
    }

    #[test]
    fn test_cleanup_flag() {
        let cli = Cli::parse_from(["ragfleet", "cleanup", "-y"]);
        assert!(matches!(cli.command, Some(Commands::Cleanup { yes: true })));

        let cli = Cli::parse_from(["ragfleet", "cleanup"]);
        assert!(matches!(cli.command, Some(Commands::Cleanup { yes: false })));
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::parse_from(["ragfleet", "dry-run", "--project-root", "/srv/rag", "-v"]);
        assert!(matches!(cli.command, Some(Commands::DryRun)));
        assert!(cli.global.verbose);
        assert_eq!(cli.global.project_root, std::path::PathBuf::from("/srv/rag"));
    }
}
