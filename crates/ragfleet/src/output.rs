//! Severity-tagged status lines

use colored::Colorize;
use ragfleet_cloud::{Plan, RemoteReport, StackOutputs, TeardownOutcome, TeardownReport};

pub fn section(title: &str) {
    println!();
    println!("{}", format!("== {} ==", title).blue().bold());
}

pub fn info(msg: impl AsRef<str>) {
    println!("{} {}", "[INFO]".cyan(), msg.as_ref());
}

pub fn ok(msg: impl AsRef<str>) {
    println!("{} {}", "[OK]".green().bold(), msg.as_ref());
}

pub fn warn(msg: impl AsRef<str>) {
    eprintln!("{} {}", "[WARN]".yellow().bold(), msg.as_ref());
}

pub fn error(msg: impl AsRef<str>) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg.as_ref());
}

/// Top-level error with its cause chain
pub fn error_chain(err: &anyhow::Error) {
    if let Some(build) = err.downcast_ref::<ragfleet_build::BuildError>() {
        error(build.user_message());
    } else {
        error(err.to_string());
    }
    for cause in err.chain().skip(1) {
        eprintln!("        caused by: {}", cause);
    }
}

pub fn plan(plan: &Plan) {
    for action in &plan.actions {
        let verb = match action.action_type {
            ragfleet_cloud::ActionType::Create => "+ create".green(),
            ragfleet_cloud::ActionType::Update => "~ update".yellow(),
            ragfleet_cloud::ActionType::Delete => "- delete".red(),
            ragfleet_cloud::ActionType::NoOp => "  keep  ".dimmed(),
        };
        println!(
            "  {} {:<12} {:<32} {}",
            verb,
            action.resource_type,
            action.resource_id,
            action.description.dimmed()
        );
    }
    println!();
    println!("  {}", plan.summary().to_string().bold());
}

pub fn services(report: &RemoteReport) {
    for status in &report.services {
        let state = if status.is_running() {
            status.state.green()
        } else {
            status.state.red()
        };
        println!("  {:<16} {}", status.service, state);
    }
}

pub fn teardown(report: &TeardownReport) {
    for entry in &report.entries {
        let outcome = match &entry.outcome {
            TeardownOutcome::Deleted => entry.outcome.to_string().green(),
            TeardownOutcome::Absent => entry.outcome.to_string().dimmed(),
            TeardownOutcome::Skipped(_) => entry.outcome.to_string().yellow(),
            TeardownOutcome::Failed(_) => entry.outcome.to_string().red(),
        };
        println!("  {:<40} {}", entry.resource, outcome);
    }
}

/// Endpoints and the commands an operator needs next
pub fn summary(
    outputs: &StackOutputs,
    domain: Option<&str>,
    ssh_command: &str,
    stack_name: &str,
) {
    let host = domain
        .map(str::to_string)
        .or_else(|| outputs.public_ip.clone())
        .unwrap_or_else(|| "<unknown>".to_string());

    section("Endpoints");
    println!("  UI        http://{}:8501", host);
    println!("  API       http://{}:8000", host);
    if let Some(ip) = &outputs.public_ip {
        println!("  Public IP {}", ip);
    }
    if let Some(db) = &outputs.database_endpoint {
        println!("  Database  {}", db);
    }
    if let Some(cache) = &outputs.cache_endpoint {
        println!("  Cache     {}", cache);
    }

    section("Next steps");
    println!("  ssh      {}", ssh_command.cyan());
    println!(
        "  logs     {}",
        format!("{} 'cd ~/app && docker compose logs -f'", ssh_command).cyan()
    );
    println!(
        "  cleanup  {}",
        "ragfleet cleanup --yes".cyan()
    );
    println!("  stack    {}", stack_name);
}
