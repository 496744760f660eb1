//! End-to-end phase sequences against the fakes

use crate::action::TeardownOutcome;
use crate::artifacts::ArtifactStore;
use crate::dns::{DnsConfigurator, DnsOutcome};
use crate::manager::{StackManager, StackOperation};
use crate::outputs::resolve_outputs;
use crate::provision::{ProvisionOutcome, Provisioner, foundational_resources};
use crate::remote::{RemoteApplier, RemoteBundle, render_remote_env};
use crate::stack::StackState;
use crate::teardown::{TeardownCoordinator, TeardownTargets};
use crate::testing::{
    FakeDns, FakeResources, FakeStacks, FakeTransport, descriptor, fast_poll, sample_config,
};
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn deploy_from_absent_stack() {
    let temp_dir = tempdir().unwrap();
    let artifacts = ArtifactStore::new(temp_dir.path());
    let config = sample_config();

    let resources = FakeResources::new();
    let records = Provisioner::new(&resources, &artifacts)
        .ensure_all(&foundational_resources(&config))
        .await
        .unwrap();
    assert!(records.iter().all(|r| r.outcome == ProvisionOutcome::Created));

    let stacks = FakeStacks::new();
    stacks.script_after_create(vec![
        StackState::Creating,
        StackState::Creating,
        StackState::CreateComplete,
    ]);
    stacks.set_outputs(&[
        ("PublicIp", "203.0.113.5"),
        ("DatabaseEndpoint", "db.internal:5432"),
        ("CacheEndpoint", "cache.internal:6379"),
    ]);

    let convergence = StackManager::new(&stacks, fast_poll(10))
        .converge(&descriptor(&config.stack_name))
        .await
        .unwrap();
    assert_eq!(convergence.operation, StackOperation::Created);
    assert_eq!(convergence.state, StackState::CreateComplete);

    let outputs = resolve_outputs(&stacks, &config.stack_name).await.unwrap();
    assert_eq!(outputs.public_ip.as_deref(), Some("203.0.113.5"));
    assert_eq!(outputs.database_endpoint.as_deref(), Some("db.internal:5432"));
    assert_eq!(outputs.cache_endpoint.as_deref(), Some("cache.internal:6379"));

    let dns = FakeDns::new(Vec::new());
    let dns_outcome = DnsConfigurator::new(&dns)
        .configure(config.domain.as_deref(), outputs.require_public_ip().unwrap())
        .await
        .unwrap();
    assert_eq!(dns_outcome, DnsOutcome::Skipped);

    let env = render_remote_env(
        &config.secrets,
        &outputs,
        config.database_password().unwrap(),
    )
    .unwrap();
    let bundle = RemoteBundle {
        compose_file: artifacts
            .write_remote_file("docker-compose.yml", "services: {}\n", false)
            .await
            .unwrap(),
        env_file: artifacts.write_remote_file(".env", &env, true).await.unwrap(),
    };

    let transport = FakeTransport::new(
        "Login Succeeded\n--- ragfleet services ---\napi running\nui running\n",
    );
    let report = RemoteApplier::new(&transport)
        .with_settle_delay(Duration::ZERO)
        .apply(&bundle, &config.region, "123456789012.dkr.ecr.us-east-1.amazonaws.com")
        .await
        .unwrap();

    assert_eq!(transport.copied().len(), 2);
    assert_eq!(report.services.len(), 2);
    assert!(report.all_running());
}

#[tokio::test]
async fn cleanup_of_missing_stack_succeeds() {
    let temp_dir = tempdir().unwrap();
    let artifacts = ArtifactStore::new(temp_dir.path());
    let config = sample_config();
    let stacks = FakeStacks::new();
    let resources = FakeResources::new();

    let report = TeardownCoordinator::new(&stacks, &resources, &artifacts, fast_poll(5))
        .run(&TeardownTargets::from(&config))
        .await;

    assert!(report.is_success());
    assert_eq!(stacks.delete_calls(), 0);
    assert_eq!(report.entries.len(), 6);
    assert_eq!(
        report.outcome_of("stack rag-system"),
        Some(&TeardownOutcome::Absent)
    );
}
