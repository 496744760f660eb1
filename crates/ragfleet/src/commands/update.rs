use super::phases;
use crate::output;
use crate::run::RunContext;
use ragfleet_cloud::StackManager;

/// Rebuild and push images, then converge the existing stack
pub async fn handle(ctx: &RunContext) -> anyhow::Result<()> {
    output::info(format!("Updating stack {}", ctx.config.stack_name));
    phases::check_prerequisites(ctx).await?;

    let state = StackManager::new(&ctx.provider, ctx.options.poll)
        .state(&ctx.config.stack_name)
        .await?;
    if state.is_gone() {
        anyhow::bail!(
            "Stack {} does not exist; run `ragfleet deploy` first",
            ctx.config.stack_name
        );
    }

    let published = phases::publish_images(ctx).await?;
    let descriptor = phases::stack_descriptor(ctx).await?;
    phases::converge(ctx, &descriptor).await?;

    let outputs = phases::outputs(ctx).await?;
    phases::configure_dns(ctx, &outputs).await?;
    let transport = phases::apply_remote(ctx, &outputs, &published).await?;

    output::summary(
        &outputs,
        ctx.config.domain.as_deref(),
        &transport.login_command(),
        &ctx.config.stack_name,
    );
    output::ok("Update complete");
    Ok(())
}
