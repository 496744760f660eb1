use super::phases;
use crate::output;
use crate::run::RunContext;
use ragfleet_build::{ComposeFile, DEFAULT_TAG, ensure_known_services};
use ragfleet_cloud::dns::best_zone_match;
use ragfleet_cloud::provision::SERVICES;
use ragfleet_cloud::{
    Action, ActionType, DnsApi, Plan, Provisioner, StackManager, StackState,
    foundational_resources,
};

/// Probe everything a deploy would touch and print the plan
///
/// Read-only against AWS; the only write is the local template file.
pub async fn handle(ctx: &RunContext) -> anyhow::Result<()> {
    output::info(format!(
        "Dry run for stack {} in {}",
        ctx.config.stack_name, ctx.config.region
    ));
    phases::check_prerequisites(ctx).await?;

    let mut plan = Plan::empty();

    let resource_actions = Provisioner::new(&ctx.provider, &ctx.artifacts)
        .plan(&foundational_resources(&ctx.config))
        .await?;
    for action in resource_actions {
        plan.push(action);
    }

    let compose = ComposeFile::load(&ctx.options.compose_file)?;
    let recipes = compose.recipes()?;
    ensure_known_services(&recipes, &SERVICES)?;
    for recipe in &recipes {
        plan.push(Action::new(
            ActionType::Update,
            "image",
            format!("{}:{}", ctx.config.registry_name(&recipe.service), DEFAULT_TAG),
            format!("build {} and push", recipe.dockerfile.display()),
        ));
    }

    let state = StackManager::new(&ctx.provider, ctx.options.poll)
        .state(&ctx.config.stack_name)
        .await?;
    plan.push(stack_action(&ctx.config.stack_name, &state));
    if let StackState::Failed(status) = &state {
        output::warn(format!(
            "Stack {} is {}; a deploy would stop here until it is inspected or deleted",
            ctx.config.stack_name, status
        ));
    }

    if let Some(domain) = ctx.config.domain.as_deref() {
        let zones = ctx.provider.list_zones().await?;
        let action = match best_zone_match(&zones, domain) {
            Some(zone) => Action::new(
                ActionType::Update,
                "dns-record",
                domain,
                format!("upsert A record in zone {}", zone.id),
            ),
            None => Action::new(
                ActionType::NoOp,
                "dns-record",
                domain,
                "no matching hosted zone, manual",
            ),
        };
        plan.push(action);
    }

    plan.push(Action::new(
        ActionType::Update,
        "remote",
        format!("{}@<instance>", ctx.config.ssh_user),
        "copy docker-compose.yml and .env, compose pull + up",
    ));

    phases::stack_descriptor(ctx).await?;

    output::section("Plan");
    output::plan(&plan);
    println!();
    output::ok("Dry run complete, nothing was changed in AWS");
    Ok(())
}

fn stack_action(name: &str, state: &StackState) -> Action {
    let (action_type, description) = match state {
        StackState::Absent | StackState::DeleteComplete => (ActionType::Create, "create".to_string()),
        StackState::CreateComplete | StackState::UpdateComplete => {
            (ActionType::Update, "update, no-op if unchanged".to_string())
        }
        StackState::UpdateRolledBack => (
            ActionType::Update,
            "update, the previous update was rolled back".to_string(),
        ),
        StackState::Failed(status) => (ActionType::NoOp, format!("blocked: {}", status)),
        other => (
            ActionType::Update,
            format!("wait for {} to finish, then update", other),
        ),
    };
    Action::new(action_type, "stack", name, description)
}
