//! Phases shared by deploy, update and dry-run

use crate::docker;
use crate::output;
use crate::run::RunContext;
use crate::ssh::SshTransport;
use anyhow::Context;
use ragfleet_build::{ComposeFile, ImagePublisher, RegistryAuth, ensure_known_services};
use ragfleet_cloud::provision::SERVICES;
use ragfleet_cloud::{
    Convergence, DnsConfigurator, DnsOutcome, ProvisionOutcome, Provisioner, RemoteApplier,
    RemoteBundle, StackDescriptor, StackManager, StackOperation, StackOutputs, WhichProbe,
    foundational_resources, resolve_latest_image, resolve_outputs, verify_prerequisites,
};
use ragfleet_cloud_aws::{
    BootstrapContext, IMAGE_NAME_FILTER, ParameterSet, StackTemplate, build_descriptor,
    render_bootstrap,
};
use std::path::PathBuf;

/// Rewritten compose file plus the registry the node logs in to
pub struct PublishedImages {
    pub registry_host: String,
    pub compose_file: PathBuf,
}

pub async fn check_prerequisites(ctx: &RunContext) -> anyhow::Result<()> {
    output::section("Prerequisites");
    let report = verify_prerequisites(&WhichProbe, &ctx.provider)
        .await
        .context("Prerequisite check failed")?;

    output::ok(format!("Tools found: {}", report.available.join(", ")));
    for tool in &report.missing_optional {
        output::warn(format!("{} not found. {}", tool.name, tool.hint));
    }
    if let Some(account) = &report.account {
        output::ok(format!("AWS credentials valid: {}", account));
    }
    Ok(())
}

pub async fn provision(ctx: &RunContext) -> anyhow::Result<()> {
    output::section("Foundational resources");
    let records = Provisioner::new(&ctx.provider, &ctx.artifacts)
        .ensure_all(&foundational_resources(&ctx.config))
        .await
        .context("Provisioning foundational resources failed")?;

    for record in records {
        match record.outcome {
            ProvisionOutcome::Existing => output::info(format!("{} exists, skipped", record.handle)),
            ProvisionOutcome::Created => output::ok(format!("{} created", record.handle)),
            ProvisionOutcome::AlreadySatisfied => {
                output::info(format!("{} already existed, skipped", record.handle))
            }
        }
    }
    Ok(())
}

/// Build, push, then write the compose file the node will run
pub async fn publish_images(ctx: &RunContext) -> anyhow::Result<PublishedImages> {
    output::section("Images");
    let compose = ComposeFile::load(&ctx.options.compose_file)?;
    let recipes = compose.recipes()?;
    ensure_known_services(&recipes, &SERVICES)?;

    let token = ctx
        .provider
        .registry_authorization()
        .await
        .context("Fetching the registry token failed")?;
    let auth = RegistryAuth::from_authorization_token(&token.authorization_token, &token.proxy_endpoint)?;
    let registry_host = auth.registry().to_string();

    let images = if recipes.is_empty() {
        output::warn("No service in the compose file has a build entry; nothing to publish");
        Default::default()
    } else {
        let docker = docker::connect().await?;
        ImagePublisher::new(docker, auth, &ctx.config.stack_name)
            .publish(&recipes)
            .await?
    };
    for image in images.values() {
        output::ok(format!("Pushed {}", image));
    }

    let rewritten = compose.rewrite(&images)?;
    let compose_file = ctx
        .artifacts
        .write_remote_file("docker-compose.yml", &rewritten, false)
        .await?;

    Ok(PublishedImages {
        registry_host,
        compose_file,
    })
}

/// Resolve dynamic parameters and bind them into the template
///
/// The rendered template is persisted next to the other local artifacts.
pub async fn stack_descriptor(ctx: &RunContext) -> anyhow::Result<StackDescriptor> {
    let db_password = ctx.config.database_password()?;
    let image = resolve_latest_image(&ctx.provider, IMAGE_NAME_FILTER)
        .await
        .context("Resolving the base image failed")?;
    output::info(format!("Base image {} ({})", image.id, image.name));

    let bootstrap = render_bootstrap(&BootstrapContext::for_stack(&ctx.config.ssh_user))?;
    let template = StackTemplate::document_qa(&bootstrap);
    let parameters = ParameterSet::for_deployment(&ctx.config, &image.id, db_password);
    let descriptor = build_descriptor(&ctx.config.stack_name, &template, &parameters)?;

    let path = ctx
        .artifacts
        .write_template(&descriptor.name, &descriptor.template_body)
        .await?;
    output::info(format!("Template written to {}", path.display()));
    Ok(descriptor)
}

pub async fn converge(ctx: &RunContext, descriptor: &StackDescriptor) -> anyhow::Result<Convergence> {
    output::section("Infrastructure stack");
    output::info(format!(
        "Converging {} (checks every {}s, at most {})",
        descriptor.name,
        ctx.options.poll.interval.as_secs(),
        ctx.options.poll.max_attempts
    ));

    let convergence = StackManager::new(&ctx.provider, ctx.options.poll)
        .converge(descriptor)
        .await
        .with_context(|| format!("Stack {} did not converge", descriptor.name))?;

    match convergence.operation {
        StackOperation::Created => output::ok(format!("Stack created ({})", convergence.state)),
        StackOperation::Updated => output::ok(format!("Stack updated ({})", convergence.state)),
        StackOperation::Unchanged => output::ok("Stack already up to date"),
    }
    Ok(convergence)
}

pub async fn outputs(ctx: &RunContext) -> anyhow::Result<StackOutputs> {
    let outputs = resolve_outputs(&ctx.provider, &ctx.config.stack_name).await?;
    if let Some(ip) = &outputs.public_ip {
        output::info(format!("Instance public IP {}", ip));
    }
    Ok(outputs)
}

pub async fn configure_dns(ctx: &RunContext, outputs: &StackOutputs) -> anyhow::Result<()> {
    let address = outputs.require_public_ip()?;
    let outcome = DnsConfigurator::new(&ctx.provider)
        .configure(ctx.config.domain.as_deref(), address)
        .await
        .context("DNS configuration failed")?;

    match outcome {
        DnsOutcome::Skipped => {}
        DnsOutcome::Upserted { zone_id, record } => {
            output::section("DNS");
            output::ok(format!("{} → {} (zone {})", record, address, zone_id));
        }
        DnsOutcome::ManualRequired { domain } => {
            output::section("DNS");
            output::warn(format!(
                "No hosted zone matches {}; point an A record at {} by hand",
                domain, address
            ));
        }
    }
    Ok(())
}

/// Ship the compose file and runtime env, then start the services
pub async fn apply_remote(
    ctx: &RunContext,
    outputs: &StackOutputs,
    published: &PublishedImages,
) -> anyhow::Result<SshTransport> {
    output::section("Remote configuration");
    let env = ragfleet_cloud::remote::render_remote_env(
        &ctx.config.secrets,
        outputs,
        ctx.config.database_password()?,
    )?;
    let env_file = ctx.artifacts.write_remote_file(".env", &env, true).await?;

    let transport = SshTransport::new(
        &ctx.config.ssh_user,
        outputs.require_public_ip()?,
        ctx.private_key_path(),
    );
    if !ctx.options.settle_delay.is_zero() {
        output::info(format!(
            "Waiting {}s for {} to settle",
            ctx.options.settle_delay.as_secs(),
            ragfleet_cloud::RemoteTransport::target(&transport)
        ));
    }

    let bundle = RemoteBundle {
        compose_file: published.compose_file.clone(),
        env_file,
    };
    let report = RemoteApplier::new(&transport)
        .with_settle_delay(ctx.options.settle_delay)
        .apply(&bundle, &ctx.config.region, &published.registry_host)
        .await
        .context("Remote configuration failed; the infrastructure is left running")?;

    output::ok(format!("Copied {} files", report.copied.len()));
    output::services(&report);
    if !report.all_running() {
        output::warn("Not every service is running yet; check the logs on the node");
    }
    Ok(transport)
}
