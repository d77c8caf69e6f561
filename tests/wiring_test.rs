//! Startup wiring tests

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::io::Write;

use fleet::Fleet;
use fleet::app::load_catalog;
use fleet_core::FleetConfig;
use fleet_model::{ClusterSpec, ClusterStatus};
use fleet_reconciler::ReconcileAction;

const CATALOG: &str = r#"[
    {"id": "log_sink_0.1", "name": "Log sink", "version": "0.1", "channels": ["stable"]},
    {"id": "http_source_0.2", "name": "HTTP source", "version": "0.2"}
]"#;

fn catalog_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_build_loads_catalog_from_config() {
    let file = catalog_file(CATALOG);
    let mut config = FleetConfig::default();
    config.catalog.path = Some(file.path().to_path_buf());

    let fleet = Fleet::build(config).await.unwrap();

    let types = fleet.state.desired.list_connector_types().await.unwrap();
    assert_eq!(types.len(), 2);
}

#[tokio::test]
async fn test_missing_catalog_fails_startup() {
    let mut config = FleetConfig::default();
    config.catalog.path = Some("/nonexistent/catalog.json".into());

    let error = Fleet::build(config).await.err().unwrap();

    assert!(error.to_string().contains("failed to read catalog"));
}

#[tokio::test]
async fn test_malformed_catalog_is_reported() {
    let fleet = Fleet::build(FleetConfig::default()).await.unwrap();
    let file = catalog_file("{\"id\": 1}");

    let error = load_catalog(&fleet.state.desired, file.path()).await.unwrap_err();

    assert!(error.to_string().contains("bad catalog"));
}

#[tokio::test]
async fn test_empty_store_sweep_is_settled() {
    let fleet = Fleet::build(FleetConfig::default()).await.unwrap();

    let report = fleet.reconcile_once().await.unwrap();

    assert!(report.is_settled());
    assert_eq!(report.examined, 0);
}

#[tokio::test]
async fn test_sweep_requests_teardown_of_deleted_cluster() {
    let fleet = Fleet::build(FleetConfig::default()).await.unwrap();
    let cluster = fleet
        .state
        .desired
        .create_cluster(ClusterSpec::new("aws", "us-east-1").with_status(ClusterStatus::Ready))
        .await
        .unwrap();
    fleet.state.desired.delete_cluster(cluster.id).await.unwrap();

    let report = fleet.reconcile_once().await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.actions[0].planned.action, ReconcileAction::RequestDelete);
}
