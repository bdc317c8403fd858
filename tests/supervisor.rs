//! Startup order, shutdown order and failure handling of the supervisor.

mod common;

use std::sync::Arc;

use common::*;
use node_launcher::config::{ConfigError, NodeConfig, ValidationError};
use node_launcher::lifecycle::{QuitReason, QuitWaiter};
use node_launcher::server::{API_SERVER, GRPC_SERVER, GRPC_WEB_PROXY, ROSETTA_SERVER};
use node_launcher::subsystem::SubsystemError;
use node_launcher::{RunContext, Supervisor, SupervisorError};

struct Harness {
    events: Events,
    services: RecordingServices,
    nodes: RecordingNodes,
}

impl Harness {
    fn new() -> Self {
        let events = Events::default();
        Self {
            services: RecordingServices::new(events.clone()),
            nodes: RecordingNodes::new(events.clone()),
            events,
        }
    }

    /// Run with a quit reason already queued, so `run` returns right after startup.
    async fn run(self, config: NodeConfig) -> (Events, Result<QuitReason, SupervisorError>) {
        let (quit, trigger) = QuitWaiter::manual();
        let ctx = RunContext::new(config).unwrap().with_halt_trigger(trigger.clone());
        trigger.raise(QuitReason::Terminate);

        let supervisor = Supervisor::new(
            ctx,
            kvstore_creator(),
            Arc::new(self.nodes),
            Arc::new(self.services),
        )
        .with_startup_window(WINDOW);
        let result = supervisor.run(quit).await;
        (self.events, result)
    }
}

fn expected_cycle(started: &[&str]) -> Vec<String> {
    let mut expected: Vec<String> = started.iter().map(|s| format!("start:{s}")).collect();
    expected.extend(started.iter().rev().map(|s| format!("stop:{s}")));
    expected
}

#[tokio::test]
async fn everything_starts_in_order_and_stops_in_reverse() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    enable_all(&mut config, true);

    let (events, result) = Harness::new().run(config).await;

    assert_eq!(result.unwrap(), QuitReason::Terminate);
    let lifecycle: Vec<String> = events
        .all()
        .into_iter()
        .filter(|e| !e.starts_with("build:"))
        .collect();
    assert_eq!(
        lifecycle,
        expected_cycle(&[NODE, API_SERVER, GRPC_SERVER, GRPC_WEB_PROXY, ROSETTA_SERVER])
    );
}

#[tokio::test]
async fn only_enabled_services_run() {
    let cases: [(bool, bool, bool, bool, &[&str]); 5] = [
        (false, false, false, false, &[NODE]),
        (true, false, false, false, &[NODE, API_SERVER]),
        (false, true, false, false, &[NODE, GRPC_SERVER]),
        (false, true, true, false, &[NODE, GRPC_SERVER, GRPC_WEB_PROXY]),
        (true, false, false, true, &[NODE, API_SERVER, ROSETTA_SERVER]),
    ];

    for (api, grpc, grpc_web, rosetta, started) in cases {
        let home = tempfile::tempdir().unwrap();
        let mut config = node_config(home.path());
        config.api.enable = api;
        config.grpc.enable = grpc;
        config.grpc_web.enable = grpc_web;
        config.rosetta.enable = rosetta;

        let (events, result) = Harness::new().run(config).await;

        assert!(result.is_ok(), "{started:?}: {result:?}");
        let lifecycle: Vec<String> = events
            .all()
            .into_iter()
            .filter(|e| !e.starts_with("build:"))
            .collect();
        assert_eq!(lifecycle, expected_cycle(started), "{started:?}");
    }
}

#[tokio::test]
async fn grpc_web_without_grpc_is_rejected_before_anything_runs() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    config.grpc.enable = false;
    config.grpc_web.enable = true;

    match RunContext::new(config) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.contains(&ValidationError::GrpcWebWithoutGrpc));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn fast_failure_unwinds_what_already_started() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    enable_all(&mut config, true);

    let mut harness = Harness::new();
    harness.services = harness
        .services
        .with_behavior(GRPC_SERVER, Behavior::FailFast("address in use".into()));
    let (events, result) = harness.run(config).await;

    match result {
        Err(SupervisorError::Subsystem(SubsystemError::Failed { subsystem, message })) => {
            assert_eq!(subsystem, GRPC_SERVER);
            assert_eq!(message, "address in use");
        }
        other => panic!("expected the gRPC start error, got {other:?}"),
    }

    assert_eq!(
        events.all(),
        vec![
            format!("build:{NODE}"),
            format!("start:{NODE}"),
            format!("build:{API_SERVER}"),
            format!("start:{API_SERVER}"),
            format!("build:{GRPC_SERVER}"),
            format!("start:{GRPC_SERVER}"),
            format!("stop:{API_SERVER}"),
            format!("stop:{NODE}"),
        ]
    );
    assert_eq!(events.count(&format!("stop:{GRPC_SERVER}")), 0);
}

#[tokio::test]
async fn start_that_returns_inside_the_window_counts_as_running() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    config.api.enable = true;
    config.grpc.enable = false;
    config.grpc_web.enable = false;

    let mut harness = Harness::new();
    harness.services = harness.services.with_behavior(API_SERVER, Behavior::Return);
    let (events, result) = harness.run(config).await;

    assert!(result.is_ok());
    assert_eq!(events.count(&format!("stop:{API_SERVER}")), 1);
}

#[tokio::test]
async fn stop_failures_do_not_block_the_rest() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    enable_all(&mut config, true);

    let mut harness = Harness::new();
    harness.services = harness.services.with_failing_stop(GRPC_WEB_PROXY);
    let (events, result) = harness.run(config).await;

    assert_eq!(result.unwrap(), QuitReason::Terminate);
    assert_eq!(
        events.with_prefix("stop:"),
        vec![ROSETTA_SERVER, GRPC_WEB_PROXY, GRPC_SERVER, API_SERVER, NODE]
    );
}

#[tokio::test]
async fn node_without_local_client_cannot_back_the_api() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    config.api.enable = true;

    let mut harness = Harness::new();
    harness.nodes = harness.nodes.without_client();
    let (events, result) = harness.run(config).await;

    assert!(matches!(result, Err(SupervisorError::MissingLocalClient)));
    assert_eq!(events.all(), vec![format!("build:{NODE}")]);
}

#[tokio::test]
async fn node_without_local_client_runs_alone() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    enable_all(&mut config, false);

    let mut harness = Harness::new();
    harness.nodes = harness.nodes.without_client();
    let (events, result) = harness.run(config).await;

    assert!(result.is_ok());
    assert_eq!(events.with_prefix("stop:"), vec![NODE]);
}

#[tokio::test]
async fn missing_genesis_fails_before_the_node_is_built() {
    let home = tempfile::tempdir().unwrap();
    let mut config = NodeConfig::with_home(home.path());
    config.base.minimum_gas_prices = "0stake".into();
    config.base.app_db_backend = "memdb".into();

    let (events, result) = Harness::new().run(config).await;

    assert!(matches!(result, Err(SupervisorError::Genesis(_))));
    assert!(events.all().is_empty());
}

#[tokio::test]
async fn profiler_is_released_once_on_fast_failure() {
    let home = tempfile::tempdir().unwrap();
    let profile = home.path().join("cpu.prof");
    let mut config = node_config(home.path());
    config.base.cpu_profile = Some(profile.clone());
    config.api.enable = true;

    let mut harness = Harness::new();
    harness.services = harness
        .services
        .with_behavior(API_SERVER, Behavior::FailFast("boom".into()));
    let (_, result) = harness.run(config).await;
    assert!(matches!(result, Err(SupervisorError::Subsystem(_))));

    let written = std::fs::read_to_string(&profile).unwrap();
    assert!(written.starts_with("# cpu profile"));
    assert_eq!(written.lines().filter(|l| l.starts_with("# stopped")).count(), 1);
}

#[tokio::test]
async fn standalone_mode_only_builds_the_abci_listener() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    config.abci.with_consensus = false;
    enable_all(&mut config, true);

    let (events, result) = Harness::new().run(config).await;

    assert_eq!(result.unwrap(), QuitReason::Terminate);
    assert_eq!(
        events.all(),
        vec![
            format!("build:{ABCI_SERVER}"),
            format!("start:{ABCI_SERVER}"),
            format!("stop:{ABCI_SERVER}"),
        ]
    );
}

#[tokio::test]
async fn standalone_listener_stop_failure_is_fatal() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    config.abci.with_consensus = false;

    let mut harness = Harness::new();
    harness.services = harness.services.with_failing_stop(ABCI_SERVER);
    let (_, result) = harness.run(config).await;

    match result {
        Err(SupervisorError::Stop { subsystem, .. }) => assert_eq!(subsystem, ABCI_SERVER),
        other => panic!("expected a stop error, got {other:?}"),
    }
}
