use crate::output;
use crate::run::RunContext;
use ragfleet_cloud::{CredentialProbe, TeardownCoordinator, TeardownOutcome, TeardownTargets};

/// Printed instead of deleting anything when `--yes` is missing
pub fn refuse_without_confirmation() {
    output::warn("cleanup deletes the stack, registries (with images), the bucket (with every object version) and the key pair");
    output::warn("Nothing was deleted. Re-run with --yes to proceed.");
}

/// Reverse-order teardown with a per-resource report
///
/// Only a failed stack deletion is fatal; later steps are reported and warned about.
pub async fn handle(ctx: &RunContext) -> anyhow::Result<()> {
    let auth = ctx.provider.check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "AWS credentials are not usable: {}",
            auth.error.unwrap_or_default()
        );
    }

    let targets = TeardownTargets::from(&ctx.config);
    output::section("Teardown");
    output::info(format!(
        "Deleting stack {} and its dependents in {}",
        targets.stack, ctx.config.region
    ));

    let report = TeardownCoordinator::new(
        &ctx.provider,
        &ctx.provider,
        &ctx.artifacts,
        ctx.options.poll,
    )
    .run(&targets)
    .await;

    output::teardown(&report);

    let stack_label = format!("stack {}", targets.stack);
    if let Some(TeardownOutcome::Failed(reason)) = report.outcome_of(&stack_label) {
        anyhow::bail!(
            "Stack {} was not deleted ({}); dependent resources were left in place",
            targets.stack,
            reason
        );
    }

    let leftovers: Vec<&str> = report.failures().map(|e| e.resource.as_str()).collect();
    if !leftovers.is_empty() {
        output::warn(format!(
            "Could not delete: {}. Remove them by hand from the AWS console",
            leftovers.join(", ")
        ));
    }

    output::ok("Cleanup complete");
    Ok(())
}
