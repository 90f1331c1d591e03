//! Reconciliation behavior against in-memory fakes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pyrsia_reconcile::docker::{commands, ids};
use pyrsia_reconcile::{
    BuildOutcome, ConfigSearchPath, Icon, Integration, IntegrationEvent, IntegrationState,
    IntegrationsView, PullEvent, ReconcileError, ReplaceOutcome, StatusTag,
};
use pyrsia_testing::Harness;
use serde_json::Value;

const DAEMON_JSON: &str = "/home/test/.docker/daemon.json";

fn harness() -> Harness {
    let h = Harness::new();
    h.files.add(DAEMON_JSON);
    h.docker.add_image("alpine:3.19");
    h.docker.add_image("redis:7");
    h.node.manage("alpine:3.19");
    h
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_structural_nodes_before_first_pass() {
    let h = harness();
    let docker = h.docker_integration();

    assert_eq!(docker.state(), IntegrationState::Unknown);
    assert_eq!(docker.get_children(None), vec![ids::INTEGRATION]);
    assert_eq!(
        docker.get_children(Some(ids::INTEGRATION)),
        vec![ids::CONFIGS, ids::IMAGES]
    );
    assert!(docker.get_children(Some(ids::IMAGES)).is_empty());
    assert_eq!(h.signal.emitted(), 0);
}

#[tokio::test]
async fn test_pass_populates_managed_and_unmanaged_images() {
    let h = harness();
    let docker = h.docker_integration();

    let delta = docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.state(), IntegrationState::Up);
    assert_eq!(
        delta.created,
        vec![
            ids::config_file(&PathBuf::from(DAEMON_JSON)),
            ids::image("alpine:3.19"),
            ids::image("redis:7"),
        ]
    );

    assert_eq!(
        docker.get_children(Some(ids::IMAGES)),
        vec![ids::image("alpine:3.19"), ids::image("redis:7")]
    );
    assert_eq!(
        docker.get_children(Some(ids::CONFIGS)),
        vec![ids::config_file(&PathBuf::from(DAEMON_JSON))]
    );

    let alpine = docker.get_node(&ids::image("alpine:3.19")).unwrap();
    assert_eq!(alpine.status, Some(StatusTag::Managed));
    assert_eq!(alpine.icon, Icon::Pyrsia);
    assert_eq!(alpine.command.unwrap().command, commands::OPEN_TRANS_LOG);

    let redis = docker.get_node(&ids::image("redis:7")).unwrap();
    assert_eq!(redis.status, Some(StatusTag::Unmanaged));
    assert_eq!(redis.label, "redis:7");
    assert_eq!(redis.command.unwrap().command, commands::REQUEST_BUILD);

    assert_eq!(docker.config_files(), vec![PathBuf::from(DAEMON_JSON)]);
}

#[tokio::test]
async fn test_repeated_pass_is_idempotent() {
    let h = harness();
    let docker = h.docker_integration();

    docker.reconcile_pass().await.unwrap();
    let before: Vec<_> = docker
        .get_children(Some(ids::IMAGES))
        .iter()
        .filter_map(|id| docker.get_node(id))
        .collect();

    let delta = docker.reconcile_pass().await.unwrap();
    assert!(delta.is_empty(), "unexpected delta: {delta:?}");

    let after: Vec<_> = docker
        .get_children(Some(ids::IMAGES))
        .iter()
        .filter_map(|id| docker.get_node(id))
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_one_notification_per_pass() {
    let h = harness();
    let docker = h.docker_integration();
    let mut rx = h.signal.subscribe();

    docker.reconcile_pass().await.unwrap();
    assert_eq!(h.signal.emitted(), 1);
    assert!(rx.has_changed().unwrap());
    rx.borrow_and_update();

    docker.reconcile_pass().await.unwrap();
    assert_eq!(h.signal.emitted(), 2);
    assert!(rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_stale_nodes_are_evicted() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    h.docker.remove("redis:7");
    h.files.delete(&PathBuf::from(DAEMON_JSON));

    let delta = docker.reconcile_pass().await.unwrap();
    assert_eq!(
        delta.removed,
        vec![
            ids::config_file(&PathBuf::from(DAEMON_JSON)),
            ids::image("redis:7"),
        ]
    );
    assert!(docker.get_node(&ids::image("redis:7")).is_none());
    assert!(docker.get_children(Some(ids::CONFIGS)).is_empty());
    assert_eq!(
        docker.get_children(Some(ids::IMAGES)),
        vec![ids::image("alpine:3.19")]
    );
}

#[tokio::test]
async fn test_provenance_change_updates_node_in_place() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    h.node.manage("redis:7");
    let delta = docker.reconcile_pass().await.unwrap();
    assert_eq!(delta.updated, vec![ids::image("redis:7")]);
    assert!(delta.created.is_empty());
    assert_eq!(
        docker.get_node(&ids::image("redis:7")).unwrap().status,
        Some(StatusTag::Managed)
    );
}

#[tokio::test]
async fn test_node_configuration_update_reevaluates_provenance() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();
    assert_eq!(h.node.log_calls(), 2);

    // The new node has never seen alpine.
    h.node.unmanage("alpine:3.19");
    let delta = docker
        .handle_event(IntegrationEvent::NodeConfigurationUpdate)
        .await
        .unwrap();

    assert_eq!(h.node.log_calls(), 4);
    assert_eq!(delta.updated, vec![ids::image("alpine:3.19")]);
    assert!(delta.created.is_empty() && delta.removed.is_empty());
    assert_eq!(
        docker.get_node(&ids::image("alpine:3.19")).unwrap().status,
        Some(StatusTag::Unmanaged)
    );
    assert_eq!(docker.config_files(), vec![PathBuf::from(DAEMON_JSON)]);
}

#[tokio::test]
async fn test_node_going_down_collapses_to_warning_root() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.state(), IntegrationState::Up);

    h.node.set_healthy(false);
    docker.reconcile_pass().await.unwrap();

    assert_eq!(docker.state(), IntegrationState::Down);
    assert_eq!(docker.get_children(None), vec![ids::INTEGRATION]);
    assert!(docker.get_children(Some(ids::INTEGRATION)).is_empty());
    assert!(docker.get_node(&ids::image("alpine:3.19")).is_none());
    assert!(docker.get_node(ids::IMAGES).is_none());

    let root = docker.get_node(ids::INTEGRATION).unwrap();
    assert_eq!(root.icon, Icon::Warning);
    assert!(root.label.contains("unavailable"));

    h.node.set_healthy(true);
    docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.state(), IntegrationState::Up);
    let root = docker.get_node(ids::INTEGRATION).unwrap();
    assert_eq!(root.icon, Icon::Docker);
    assert_eq!(root.label, "Docker");
    assert_eq!(docker.get_children(Some(ids::IMAGES)).len(), 2);
}

#[tokio::test]
async fn test_docker_down_and_listing_failure_mean_down() {
    let h = harness();
    let docker = h.docker_integration();

    h.docker.set_up(false);
    docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.state(), IntegrationState::Down);

    h.docker.set_up(true);
    h.docker.set_fail_listing(true);
    docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.state(), IntegrationState::Down);
    assert_eq!(docker.get_children(None), vec![ids::INTEGRATION]);
}

#[tokio::test]
async fn test_failed_lookup_counts_as_unmanaged() {
    let h = harness();
    h.node.fail_lookup("alpine:3.19");
    let docker = h.docker_integration();

    docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.state(), IntegrationState::Up);
    assert_eq!(
        docker.get_node(&ids::image("alpine:3.19")).unwrap().status,
        Some(StatusTag::Unmanaged)
    );
}

#[tokio::test]
async fn test_untagged_images_are_skipped() {
    let h = harness();
    h.docker.add_image("<none>:<none>");
    let docker = h.docker_integration();

    docker.reconcile_pass().await.unwrap();
    assert_eq!(docker.get_children(Some(ids::IMAGES)).len(), 2);
}

#[tokio::test]
async fn test_missing_file_name_is_an_integrity_error() {
    let h = harness();
    let docker = h.docker_integration_with(vec![ConfigSearchPath::new("/home/test/.docker", "")]);

    let err = docker.reconcile_pass().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Integrity(_)));
    assert_eq!(docker.state(), IntegrationState::Unknown);
    assert_eq!(h.signal.emitted(), 0);
}

#[tokio::test]
async fn test_unknown_ids_are_safe() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    assert!(docker.get_node("pyrsia.docker.docker-image.nope").is_none());
    assert!(docker.get_children(Some("nope")).is_empty());

    let err = docker.request_build("nope").await.unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound(id) if id == "nope"));

    let err = docker.transparency_log(ids::IMAGES).await.unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound(_)));
}

#[tokio::test]
async fn test_request_build() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    let outcome = docker.request_build(&ids::image("redis:7")).await.unwrap();
    assert_eq!(
        outcome,
        BuildOutcome::Accepted {
            build_id: "build-1".to_string()
        }
    );
    assert_eq!(h.node.builds(), vec!["redis:7"]);

    h.node.set_accept_builds(false);
    let outcome = docker.request_build(&ids::image("redis:7")).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Rejected);
}

#[tokio::test]
async fn test_transparency_log_document() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    let document = docker
        .transparency_log(&ids::image("alpine:3.19"))
        .await
        .unwrap();
    let entries = document["alpine:3.19"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["package_specific_id"], Value::from("alpine:3.19"));
}

#[tokio::test]
async fn test_replace_images_with_node() {
    let h = harness();
    h.docker.add_image("postgres:16");
    h.node.manage("postgres:16");
    h.docker.add_container("postgres:16");
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    let mut reports = docker.replace_images_with_node().await.unwrap();
    reports.sort_by(|a, b| a.identity.cmp(&b.identity));

    let outcomes: Vec<_> = reports
        .iter()
        .map(|r| (r.identity.as_str(), r.outcome.clone()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("alpine:3.19", ReplaceOutcome::Replaced),
            ("postgres:16", ReplaceOutcome::HasContainers(1)),
            ("redis:7", ReplaceOutcome::NotManaged),
        ]
    );
    assert_eq!(h.docker.removed(), vec!["alpine:3.19"]);
    assert_eq!(h.docker.pulled(), vec!["alpine:3.19"]);

    assert!(docker.busy_images().is_empty());
    let alpine = docker.get_node(&ids::image("alpine:3.19")).unwrap();
    assert_eq!(alpine.status, Some(StatusTag::Managed));
    assert_eq!(alpine.label, "alpine:3.19");
}

#[tokio::test]
async fn test_failed_pull_is_reported() {
    let h = harness();
    h.docker.script_pull(vec![
        PullEvent::Progress("Pulling fs layer".to_string()),
        PullEvent::Finished(Err("manifest unknown".to_string())),
    ]);
    let docker = h.docker_integration();

    let reports = docker.replace_images_with_node().await.unwrap();
    let alpine = reports
        .iter()
        .find(|r| r.identity == "alpine:3.19")
        .unwrap();
    assert_eq!(
        alpine.outcome,
        ReplaceOutcome::Failed("manifest unknown".to_string())
    );
    assert!(docker.busy_images().is_empty());
    assert!(docker.get_node(&ids::image("alpine:3.19")).is_none());
}

#[tokio::test]
async fn test_busy_image_survives_pass() {
    let h = harness();
    let docker = h.docker_integration();
    docker.reconcile_pass().await.unwrap();

    let pull = h.docker.gate_next_pull();
    let replace = tokio::spawn({
        let docker = Arc::clone(&docker);
        async move { docker.replace_images_with_node().await }
    });

    wait_until(|| !h.docker.removed().is_empty()).await;
    assert_eq!(docker.busy_images(), vec!["alpine:3.19"]);

    // The image is gone from the engine but its node must stay.
    docker.reconcile_pass().await.unwrap();
    let node = docker.get_node(&ids::image("alpine:3.19")).unwrap();
    assert_eq!(node.status, Some(StatusTag::Updating));
    assert_eq!(node.label, "Pulling 'alpine:3.19'");
    assert!(node.command.is_none());

    pull.send(PullEvent::Progress("Downloading 12MB/40MB".to_string()))
        .await
        .unwrap();
    wait_until(|| {
        docker
            .get_node(&ids::image("alpine:3.19"))
            .and_then(|n| n.tooltip)
            .as_deref()
            == Some("Downloading 12MB/40MB")
    })
    .await;

    h.docker.add_image("alpine:3.19");
    pull.send(PullEvent::Finished(Ok(()))).await.unwrap();

    let reports = replace.await.unwrap().unwrap();
    assert!(reports
        .iter()
        .any(|r| r.identity == "alpine:3.19" && r.outcome == ReplaceOutcome::Replaced));
    assert!(docker.busy_images().is_empty());
    assert_eq!(
        docker.get_node(&ids::image("alpine:3.19")).unwrap().status,
        Some(StatusTag::Managed)
    );
}

#[tokio::test]
async fn test_concurrent_passes_converge() {
    let h = harness();
    let docker = h.docker_integration();

    let (a, b) = tokio::join!(docker.reconcile_pass(), docker.reconcile_pass());
    a.unwrap();
    b.unwrap();

    assert_eq!(h.signal.emitted(), 2);
    assert_eq!(docker.get_children(Some(ids::IMAGES)).len(), 2);
    assert!(docker.reconcile_pass().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_view_aggregates_docker_integration() {
    let h = harness();
    let docker = h.docker_integration();
    let view = IntegrationsView::new(h.signal.clone()).with_integration(docker.clone());

    let deltas = view.dispatch(IntegrationEvent::ModelUpdate).await.unwrap();
    assert_eq!(deltas.len(), 1);

    assert_eq!(view.get_children(None), vec![ids::INTEGRATION]);
    assert_eq!(
        view.get_children(Some(ids::IMAGES)),
        docker.get_children(Some(ids::IMAGES))
    );
    assert_eq!(
        view.get_node(&ids::image("redis:7")),
        docker.get_node(&ids::image("redis:7"))
    );
    assert_eq!(view.config_files(), vec![PathBuf::from(DAEMON_JSON)]);

    let mut rx = view.subscribe();
    rx.borrow_and_update();
    view.dispatch(IntegrationEvent::NodeConfigurationUpdate)
        .await
        .unwrap();
    assert!(rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_trigger_reconciliation_runs_in_background() {
    let h = harness();
    let docker = h.docker_integration();
    let view = IntegrationsView::new(h.signal.clone()).with_integration(docker.clone());

    let mut rx = view.subscribe();
    view.trigger_reconciliation();
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(docker.state(), IntegrationState::Up);
}
