use super::phases;
use crate::output;
use crate::run::RunContext;

/// Full pipeline: provision, publish, converge, DNS, remote handshake
pub async fn handle(ctx: &RunContext) -> anyhow::Result<()> {
    output::info(format!(
        "Deploying stack {} to {}",
        ctx.config.stack_name, ctx.config.region
    ));

    phases::check_prerequisites(ctx).await?;
    phases::provision(ctx).await?;
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
    output::ok("Deployment complete");
    Ok(())
}
