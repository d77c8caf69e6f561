//! Behaviour every `DesiredStateStore` backend must share.
//!
//! Each scenario runs against the in-memory store and SurrealDB's `mem://`
//! engine.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use chrono::Utc;
use fleet_core::{ClusterId, Error, NamespaceId};
use fleet_model::{
    Cluster, ClusterDesiredState, ClusterSpec, ClusterStatus, Connector, ConnectorPatch,
    ConnectorSpec, ConnectorType, Namespace, NamespacePatch, NamespaceSpec,
};
use fleet_store::{DesiredStateStore, InMemoryStore, SurrealConfig, SurrealStore};

async fn backends() -> Vec<(&'static str, Arc<dyn DesiredStateStore>)> {
    let surreal = SurrealStore::connect(SurrealConfig::in_memory())
        .await
        .expect("mem:// engine should start");
    vec![
        ("memory", InMemoryStore::new_arc() as Arc<dyn DesiredStateStore>),
        ("surreal", Arc::new(surreal)),
    ]
}

async fn ready_cluster(store: &dyn DesiredStateStore) -> Cluster {
    let spec = ClusterSpec::new("aws", "us-east-1").with_status(ClusterStatus::Ready);
    store
        .create_cluster(Cluster::new(spec, Utc::now()).unwrap())
        .await
        .unwrap()
}

async fn namespace(store: &dyn DesiredStateStore, cluster_id: ClusterId, name: &str) -> Namespace {
    let spec = NamespaceSpec::new(cluster_id, name);
    store
        .create_namespace(Namespace::new(spec, Utc::now()).unwrap())
        .await
        .unwrap()
}

fn connector(namespace_id: NamespaceId, name: &str) -> Connector {
    let spec = ConnectorSpec::new(name, "log_sink_0.1", namespace_id, "kafka:9092");
    Connector::new(spec, Utc::now()).unwrap()
}

#[tokio::test]
async fn creates_start_at_version_one_and_read_back() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        assert_eq!(cluster.meta.resource_version, 1, "{backend}");

        let read = store.get_cluster(cluster.id).await.unwrap();
        assert_eq!(read.id, cluster.id, "{backend}");
        assert_eq!(read.status, ClusterStatus::Ready, "{backend}");
        assert_eq!(read.meta.resource_version, 1, "{backend}");
    }
}

#[tokio::test]
async fn missing_rows_are_not_found() {
    for (backend, store) in backends().await {
        let error = store.get_cluster(ClusterId::new()).await.unwrap_err();
        assert_eq!(error.code(), "not_found", "{backend}");
    }
}

#[tokio::test]
async fn duplicate_natural_keys_conflict() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        namespace(store.as_ref(), cluster.id, "team-a").await;

        let duplicate =
            Namespace::new(NamespaceSpec::new(cluster.id, "team-a"), Utc::now()).unwrap();
        let error = store.create_namespace(duplicate).await.unwrap_err();
        assert_eq!(error.code(), "conflict", "{backend}");

        let other_cluster = ready_cluster(store.as_ref()).await;
        namespace(store.as_ref(), other_cluster.id, "team-a").await;
    }
}

#[tokio::test]
async fn replace_is_compare_and_swap() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;

        let mut first = cluster.clone();
        first.meta.reported_version = 3;
        let written = store.replace_cluster(first, 1).await.unwrap();
        assert_eq!(written.meta.resource_version, 2, "{backend}");

        let mut stale = cluster.clone();
        stale.status = ClusterStatus::Failed;
        let error = store.replace_cluster(stale, 1).await.unwrap_err();
        assert!(
            matches!(error, Error::VersionMismatch { expected: 1, actual: 2, .. }),
            "{backend}: {error:?}"
        );

        let read = store.get_cluster(cluster.id).await.unwrap();
        assert_eq!(read.status, ClusterStatus::Ready, "{backend}");
        assert_eq!(read.meta.reported_version, 3, "{backend}");
    }
}

#[tokio::test]
async fn mark_desired_always_lands() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        let marked = store
            .mark_cluster_desired(cluster.id, ClusterDesiredState::Deleted)
            .await
            .unwrap();
        assert_eq!(marked.desired, ClusterDesiredState::Deleted, "{backend}");
        assert_eq!(marked.meta.resource_version, 2, "{backend}");
    }
}

#[tokio::test]
async fn namespace_patch_renames_and_frees_old_name() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        let ns = namespace(store.as_ref(), cluster.id, "team-a").await;

        let patch = NamespacePatch {
            name: Some("team-b".to_string()),
            ..NamespacePatch::default()
        };
        let renamed = store.update_namespace(ns.id, &patch, 1).await.unwrap();
        assert_eq!(renamed.name, "team-b", "{backend}");

        namespace(store.as_ref(), cluster.id, "team-a").await;
    }
}

#[tokio::test]
async fn connector_patch_requires_current_version() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        let ns = namespace(store.as_ref(), cluster.id, "team-a").await;
        let created = store.create_connector(connector(ns.id, "sink")).await.unwrap();

        let patch = ConnectorPatch {
            name: Some("renamed".to_string()),
            ..ConnectorPatch::default()
        };
        let error = store.update_connector(created.id, &patch, 9).await.unwrap_err();
        assert_eq!(error.code(), "version_mismatch", "{backend}");

        let updated = store.update_connector(created.id, &patch, 1).await.unwrap();
        assert_eq!(updated.name, "renamed", "{backend}");
        assert_eq!(updated.meta.resource_version, 2, "{backend}");
    }
}

#[tokio::test]
async fn assignment_respects_namespace_capacity() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        let ns = namespace(store.as_ref(), cluster.id, "team-a").await;

        for name in ["first", "second", "third"] {
            let created = store.create_connector(connector(ns.id, name)).await.unwrap();
            let mut placed = created.clone();
            placed.cluster_id = Some(cluster.id);
            let result = store.assign_connector(placed, 1, 2).await;
            if name == "third" {
                let error = result.unwrap_err();
                assert!(
                    matches!(error, Error::CapacityExceeded { current: 2, max: 2, .. }),
                    "{backend}: {error:?}"
                );
            } else {
                result.unwrap();
            }
        }

        assert_eq!(store.connector_count(ns.id).await.unwrap(), 2, "{backend}");
    }
}

#[tokio::test]
async fn soft_deleted_rows_leave_lists_but_stay_readable() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        let ns = namespace(store.as_ref(), cluster.id, "team-a").await;

        let mut deleted = ns.clone();
        deleted.meta.soft_delete(Utc::now());
        store.replace_namespace(deleted, 1).await.unwrap();

        let listed = store.list_namespaces(Some(cluster.id)).await.unwrap();
        assert!(listed.is_empty(), "{backend}");
        let read = store.get_namespace(ns.id).await.unwrap();
        assert!(read.meta.is_deleted(), "{backend}");

        namespace(store.as_ref(), cluster.id, "team-a").await;
    }
}

#[tokio::test]
async fn catalog_entries_upsert() {
    for (backend, store) in backends().await {
        store
            .put_connector_type(ConnectorType::new("log_sink_0.1", "Log sink", "0.1"))
            .await
            .unwrap();
        store
            .put_connector_type(ConnectorType::new("log_sink_0.1", "Log sink", "0.2"))
            .await
            .unwrap();

        let types = store.list_connector_types().await.unwrap();
        assert_eq!(types.len(), 1, "{backend}");
        let entry = store.get_connector_type(&"log_sink_0.1".into()).await.unwrap();
        assert_eq!(entry.version, "0.2", "{backend}");
    }
}

#[tokio::test]
async fn snapshot_holds_every_row() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;
        let ns = namespace(store.as_ref(), cluster.id, "team-a").await;
        let created = store.create_connector(connector(ns.id, "sink")).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        store
            .mark_cluster_desired(cluster.id, ClusterDesiredState::Deleted)
            .await
            .unwrap();

        assert_eq!(snapshot.clusters().count(), 1, "{backend}");
        assert_eq!(
            snapshot.cluster(cluster.id).map(|c| c.desired),
            Some(ClusterDesiredState::Ready),
            "{backend}"
        );
        assert!(snapshot.namespace(ns.id).is_some(), "{backend}");
        assert!(snapshot.connector(created.id).is_some(), "{backend}");
    }
}

#[tokio::test]
async fn concurrent_replaces_have_one_winner() {
    for (backend, store) in backends().await {
        let cluster = ready_cluster(store.as_ref()).await;

        let mut left = cluster.clone();
        left.meta.reported_version = 10;
        let mut right = cluster.clone();
        right.meta.reported_version = 20;

        let (a, b) =
            futures::join!(store.replace_cluster(left, 1), store.replace_cluster(right, 1));
        assert_eq!(
            usize::from(a.is_ok()) + usize::from(b.is_ok()),
            1,
            "{backend}"
        );
        let read = store.get_cluster(cluster.id).await.unwrap();
        assert_eq!(read.meta.resource_version, 2, "{backend}");
    }
}
