//! SurrealDB-backed store.
//!
//! Each row is a record `{ body, resource_version, deleted, cluster_id,
//! namespace_id, assigned }` keyed by the entity id. `body` is the entity as
//! JSON text; the other fields exist for conditional writes and filtering.
//! Natural keys are claimed through records in the `natural_key` table so
//! duplicates fail inside the same transaction as the write.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::config::StoreSettings;
use fleet_core::{
    ClusterId, ConnectorId, ConnectorTypeId, Error, NamespaceId, ResourceKind, Result,
};
use fleet_model::{
    Cluster, ClusterDesiredState, Connector, ConnectorDesiredState, ConnectorPatch,
    ConnectorType, Namespace, NamespacePatch,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;

use crate::snapshot::StoreSnapshot;
use crate::store::{check_version, ensure_live, next_version, DesiredStateStore};

const CLUSTER: &str = "cluster";
const NAMESPACE: &str = "namespace";
const CONNECTOR: &str = "connector";
const CONNECTOR_TYPE: &str = "connector_type";

/// Attempts for desired-state-only writes racing other writers.
const MARK_DESIRED_ATTEMPTS: usize = 5;

const ROW_FIELDS: &str = "body, resource_version, deleted, cluster_id, namespace_id, assigned";

const CLAIM_NATURAL_KEY: &str = "CREATE type::thing('natural_key', $claim) SET owner = $id;";

/// Connection settings for the SurrealDB store.
#[derive(Debug, Clone)]
pub struct SurrealConfig {
    /// Connection URL (e.g., "mem://", "rocksdb://data/fleet.db")
    pub url: String,
    pub namespace: String,
    pub database: String,
}

impl SurrealConfig {
    /// In-memory engine, for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".to_string(),
            namespace: "fleet".to_string(),
            database: "test".to_string(),
        }
    }
}

impl From<&StoreSettings> for SurrealConfig {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            url: settings.url.clone(),
            namespace: settings.namespace.clone(),
            database: settings.database.clone(),
        }
    }
}

/// Map a SurrealDB failure onto the store's error taxonomy.
pub fn from_surrealdb_error(operation: &str, err: impl fmt::Display) -> Error {
    Error::storage(operation, err.to_string())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RowRecord {
    #[serde(default)]
    body: String,
    #[serde(default)]
    resource_version: u64,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    cluster_id: Option<String>,
    #[serde(default)]
    namespace_id: Option<String>,
    #[serde(default)]
    assigned: bool,
}

impl RowRecord {
    fn encode<T: Serialize>(entity: &T, resource_version: u64) -> Result<Self> {
        let body = serde_json::to_string(entity)
            .map_err(|e| Error::storage("encode row", e.to_string()))?;
        Ok(Self {
            body,
            resource_version,
            ..Self::default()
        })
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::storage("decode row", e.to_string()))
    }
}

trait Row: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    const KIND: ResourceKind;

    fn key(&self) -> String;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
    fn touch(&mut self);
    fn deleted(&self) -> bool;

    /// Natural key claimed while the row is live.
    fn natural_key(&self) -> Option<String> {
        None
    }

    fn record(&self) -> Result<RowRecord> {
        let mut record = RowRecord::encode(self, self.version())?;
        record.deleted = self.deleted();
        Ok(record)
    }
}

impl Row for Cluster {
    const TABLE: &'static str = CLUSTER;
    const KIND: ResourceKind = ResourceKind::Cluster;

    fn key(&self) -> String {
        self.id.to_string()
    }
    fn version(&self) -> u64 {
        self.meta.resource_version
    }
    fn set_version(&mut self, version: u64) {
        self.meta.resource_version = version;
    }
    fn touch(&mut self) {
        self.meta.updated_at = Utc::now();
    }
    fn deleted(&self) -> bool {
        self.meta.is_deleted()
    }
}

impl Row for Namespace {
    const TABLE: &'static str = NAMESPACE;
    const KIND: ResourceKind = ResourceKind::Namespace;

    fn key(&self) -> String {
        self.id.to_string()
    }
    fn version(&self) -> u64 {
        self.meta.resource_version
    }
    fn set_version(&mut self, version: u64) {
        self.meta.resource_version = version;
    }
    fn touch(&mut self) {
        self.meta.updated_at = Utc::now();
    }
    fn deleted(&self) -> bool {
        self.meta.is_deleted()
    }
    fn natural_key(&self) -> Option<String> {
        (!self.deleted()).then(|| format!("{NAMESPACE}/{}", Namespace::natural_key(self)))
    }
    fn record(&self) -> Result<RowRecord> {
        let mut record = RowRecord::encode(self, self.version())?;
        record.deleted = self.deleted();
        record.cluster_id = Some(self.cluster_id.to_string());
        Ok(record)
    }
}

impl Row for Connector {
    const TABLE: &'static str = CONNECTOR;
    const KIND: ResourceKind = ResourceKind::Connector;

    fn key(&self) -> String {
        self.id.to_string()
    }
    fn version(&self) -> u64 {
        self.meta.resource_version
    }
    fn set_version(&mut self, version: u64) {
        self.meta.resource_version = version;
    }
    fn touch(&mut self) {
        self.meta.updated_at = Utc::now();
    }
    fn deleted(&self) -> bool {
        self.meta.is_deleted()
    }
    fn natural_key(&self) -> Option<String> {
        (!self.deleted()).then(|| format!("{CONNECTOR}/{}", Connector::natural_key(self)))
    }
    fn record(&self) -> Result<RowRecord> {
        let mut record = RowRecord::encode(self, self.version())?;
        record.deleted = self.deleted();
        record.cluster_id = self.cluster_id.map(|id| id.to_string());
        record.namespace_id = Some(self.namespace_id.to_string());
        record.assigned = self.is_assigned();
        Ok(record)
    }
}

/// Optional extra guard on a conditional write.
struct CapacityGuard {
    namespace_id: NamespaceId,
    max: usize,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: usize,
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotRecord {
    #[serde(default)]
    clusters: Vec<RowRecord>,
    #[serde(default)]
    namespaces: Vec<RowRecord>,
    #[serde(default)]
    connectors: Vec<RowRecord>,
}

/// Store backed by any SurrealDB engine (`mem://`, `rocksdb://...`, remote).
#[derive(Debug, Clone)]
pub struct SurrealStore {
    db: Arc<Surreal<Any>>,
    config: SurrealConfig,
}

impl SurrealStore {
    /// Connect and select the namespace and database.
    pub async fn connect(config: SurrealConfig) -> Result<Self> {
        let db = Surreal::<Any>::init();

        db.connect(config.url.as_str())
            .await
            .map_err(|e| from_surrealdb_error("connect", e))?;

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(|e| from_surrealdb_error("select database", e))?;

        tracing::info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "connected to surrealdb"
        );

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    pub fn config(&self) -> &SurrealConfig {
        &self.config
    }

    async fn fetch<T: Row>(&self, key: String) -> Result<Option<T>> {
        let mut response = self
            .db
            .query(format!("SELECT {ROW_FIELDS} FROM type::thing($tb, $id)"))
            .bind(("tb", T::TABLE))
            .bind(("id", key))
            .await
            .map_err(|e| from_surrealdb_error("select row", e))?;
        let records: Vec<RowRecord> = response
            .take(0)
            .map_err(|e| from_surrealdb_error("select row", e))?;

        records
            .first()
            .map(|record| {
                let mut row: T = record.decode()?;
                row.set_version(record.resource_version);
                Ok(row)
            })
            .transpose()
    }

    async fn require<T: Row>(&self, key: String) -> Result<T> {
        self.fetch::<T>(key.clone())
            .await?
            .ok_or_else(|| Error::not_found(T::KIND, key))
    }

    async fn list<T: Row>(
        &self,
        filter: &str,
        binds: Vec<(&'static str, String)>,
    ) -> Result<Vec<T>> {
        let mut query = self.db.query(format!(
            "SELECT {ROW_FIELDS} FROM type::table($tb) WHERE deleted = false{filter}"
        ));
        query = query.bind(("tb", T::TABLE));
        for bind in binds {
            query = query.bind(bind);
        }
        let mut response = query
            .await
            .map_err(|e| from_surrealdb_error("list rows", e))?;
        let records: Vec<RowRecord> = response
            .take(0)
            .map_err(|e| from_surrealdb_error("list rows", e))?;

        decode_sorted(&records)
    }

    async fn insert<T: Row>(&self, mut row: T) -> Result<T> {
        let key = row.key();
        row.set_version(next_version(T::KIND, &key, 0)?);
        row.touch();

        let mut statements = vec!["BEGIN TRANSACTION;".to_string()];
        if row.natural_key().is_some() {
            statements.push(CLAIM_NATURAL_KEY.to_string());
        }
        statements.push("CREATE type::thing($tb, $id) CONTENT $row;".to_string());
        statements.push("COMMIT TRANSACTION;".to_string());

        let mut response = self
            .db
            .query(statements.join("\n"))
            .bind(("tb", T::TABLE))
            .bind(("id", key.clone()))
            .bind(("claim", row.natural_key().unwrap_or_default()))
            .bind(("row", row.record()?))
            .await
            .map_err(|e| from_surrealdb_error("create row", e))?;

        let errors = collect_errors(&mut response);
        if errors.is_empty() {
            return Ok(row);
        }
        if errors.contains("already exists") {
            let reason = if errors.contains("natural_key") {
                "a resource with this name already exists"
            } else {
                "a resource with this id already exists"
            };
            let conflict_key = row.natural_key().unwrap_or(key);
            return Err(Error::conflict(T::KIND, conflict_key, reason));
        }
        Err(Error::storage(format!("create {}", T::KIND), errors))
    }

    /// Conditional whole-row write at `expected + 1`.
    async fn swap<T: Row>(
        &self,
        previous: &T,
        mut row: T,
        expected: u64,
        capacity: Option<CapacityGuard>,
    ) -> Result<T> {
        let key = row.key();
        row.set_version(next_version(T::KIND, &key, expected)?);
        row.touch();

        let claim = row.natural_key();
        let release = previous.natural_key();
        let key_changed = claim != release;

        let mut statements = vec!["BEGIN TRANSACTION;".to_string()];
        if capacity.is_some() {
            statements.push(
                "LET $count = array::len((SELECT VALUE id FROM connector \
                 WHERE namespace_id = $ns AND assigned = true AND deleted = false \
                 AND id != type::thing($tb, $id)));"
                    .to_string(),
            );
            statements.push("IF $count >= $max { THROW 'capacity_exceeded' };".to_string());
        }
        if key_changed && claim.is_some() {
            statements.push(CLAIM_NATURAL_KEY.to_string());
        }
        statements.push(
            "LET $updated = (UPDATE type::thing($tb, $id) CONTENT $row \
             WHERE resource_version = $expected RETURN AFTER);"
                .to_string(),
        );
        statements.push("IF array::len($updated) = 0 { THROW 'version_mismatch' };".to_string());
        if key_changed && release.is_some() {
            statements.push("DELETE type::thing('natural_key', $release);".to_string());
        }
        statements.push("COMMIT TRANSACTION;".to_string());

        let (namespace, max) = capacity
            .as_ref()
            .map_or((String::new(), 0), |guard| (guard.namespace_id.to_string(), guard.max));

        let mut response = self
            .db
            .query(statements.join("\n"))
            .bind(("tb", T::TABLE))
            .bind(("id", key.clone()))
            .bind(("row", row.record()?))
            .bind(("expected", expected))
            .bind(("claim", claim.clone().unwrap_or_default()))
            .bind(("release", release.unwrap_or_default()))
            .bind(("ns", namespace))
            .bind(("max", max))
            .await
            .map_err(|e| from_surrealdb_error("update row", e))?;

        let errors = collect_errors(&mut response);
        if errors.is_empty() {
            return Ok(row);
        }
        if errors.contains("version_mismatch") || errors.contains("can be retried") {
            let stored = self.require::<T>(key.clone()).await?;
            return Err(Error::version_mismatch(T::KIND, key, expected, stored.version()));
        }
        if let Some(guard) = capacity.filter(|_| errors.contains("capacity_exceeded")) {
            let current = self.connector_count(guard.namespace_id).await?;
            return Err(Error::capacity_exceeded(
                guard.namespace_id.to_string(),
                current,
                guard.max,
            ));
        }
        if errors.contains("already exists") {
            return Err(Error::conflict(
                T::KIND,
                claim.unwrap_or(key),
                "a resource with this name already exists",
            ));
        }
        Err(Error::storage(format!("update {}", T::KIND), errors))
    }

    async fn replace<T: Row>(&self, row: T, expected: u64) -> Result<T> {
        let previous = self.require::<T>(row.key()).await?;
        check_version(T::KIND, &row.key(), expected, previous.version())?;
        self.swap(&previous, row, expected, None).await
    }

    /// Read-modify-write retried against concurrent writers.
    async fn modify<T, F>(&self, key: String, change: F) -> Result<T>
    where
        T: Row,
        F: Fn(&mut T) -> Result<()> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let previous = self.require::<T>(key.clone()).await?;
            let expected = previous.version();
            let mut row = previous.clone();
            change(&mut row)?;
            match self.swap(&previous, row, expected, None).await {
                Err(Error::VersionMismatch { .. }) if attempt < MARK_DESIRED_ATTEMPTS => {}
                result => return result,
            }
        }
    }
}

fn collect_errors(response: &mut surrealdb::Response) -> String {
    let errors: BTreeMap<usize, String> = response
        .take_errors()
        .into_iter()
        .map(|(index, error)| (index, error.to_string()))
        .collect();
    errors.into_values().collect::<Vec<_>>().join("; ")
}

/// Decode rows and order them by id; ULID text sorts by creation time.
fn decode_sorted<T: Row>(records: &[RowRecord]) -> Result<Vec<T>> {
    let mut rows = records
        .iter()
        .map(|record| {
            let mut row: T = record.decode()?;
            row.set_version(record.resource_version);
            Ok(row)
        })
        .collect::<Result<Vec<T>>>()?;
    rows.sort_by_cached_key(T::key);
    Ok(rows)
}

#[async_trait]
impl DesiredStateStore for SurrealStore {
    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        self.insert(cluster).await
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<Cluster> {
        self.require(id.to_string()).await
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.list("", Vec::new()).await
    }

    async fn mark_cluster_desired(
        &self,
        id: ClusterId,
        desired: ClusterDesiredState,
    ) -> Result<Cluster> {
        self.modify(id.to_string(), move |cluster: &mut Cluster| {
            ensure_live(ResourceKind::Cluster, &cluster.id.to_string(), cluster.meta.is_deleted())?;
            if cluster.desired != desired {
                cluster.desired = desired;
                cluster.meta.mark_desired_changed(Utc::now());
            }
            Ok(())
        })
        .await
    }

    async fn replace_cluster(&self, cluster: Cluster, expected_version: u64) -> Result<Cluster> {
        self.replace(cluster, expected_version).await
    }

    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace> {
        self.insert(namespace).await
    }

    async fn get_namespace(&self, id: NamespaceId) -> Result<Namespace> {
        self.require(id.to_string()).await
    }

    async fn list_namespaces(&self, cluster_id: Option<ClusterId>) -> Result<Vec<Namespace>> {
        match cluster_id {
            Some(id) => {
                self.list(" AND cluster_id = $cluster", vec![("cluster", id.to_string())])
                    .await
            }
            None => self.list("", Vec::new()).await,
        }
    }

    async fn update_namespace(
        &self,
        id: NamespaceId,
        patch: &NamespacePatch,
        expected_version: u64,
    ) -> Result<Namespace> {
        let previous: Namespace = self.require(id.to_string()).await?;
        let found = previous.version();
        check_version(ResourceKind::Namespace, &id.to_string(), expected_version, found)?;
        ensure_live(ResourceKind::Namespace, &id.to_string(), previous.meta.is_deleted())?;
        let mut next = previous.clone();
        patch.apply_to(&mut next)?;
        self.swap(&previous, next, expected_version, None).await
    }

    async fn replace_namespace(
        &self,
        namespace: Namespace,
        expected_version: u64,
    ) -> Result<Namespace> {
        self.replace(namespace, expected_version).await
    }

    async fn create_connector(&self, connector: Connector) -> Result<Connector> {
        self.insert(connector).await
    }

    async fn get_connector(&self, id: ConnectorId) -> Result<Connector> {
        self.require(id.to_string()).await
    }

    async fn list_connectors(&self, namespace_id: Option<NamespaceId>) -> Result<Vec<Connector>> {
        match namespace_id {
            Some(id) => {
                self.list(" AND namespace_id = $namespace", vec![("namespace", id.to_string())])
                    .await
            }
            None => self.list("", Vec::new()).await,
        }
    }

    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
        expected_version: u64,
    ) -> Result<Connector> {
        let previous: Connector = self.require(id.to_string()).await?;
        let found = previous.version();
        check_version(ResourceKind::Connector, &id.to_string(), expected_version, found)?;
        ensure_live(ResourceKind::Connector, &id.to_string(), previous.meta.is_deleted())?;
        let mut next = previous.clone();
        patch.apply_to(&mut next, Utc::now())?;
        self.swap(&previous, next, expected_version, None).await
    }

    async fn mark_connector_desired(
        &self,
        id: ConnectorId,
        desired: ConnectorDesiredState,
    ) -> Result<Connector> {
        self.modify(id.to_string(), move |connector: &mut Connector| {
            ensure_live(
                ResourceKind::Connector,
                &connector.id.to_string(),
                connector.meta.is_deleted(),
            )?;
            if connector.desired != desired {
                connector.desired = desired;
                connector.meta.mark_desired_changed(Utc::now());
            }
            Ok(())
        })
        .await
    }

    async fn replace_connector(
        &self,
        connector: Connector,
        expected_version: u64,
    ) -> Result<Connector> {
        self.replace(connector, expected_version).await
    }

    async fn assign_connector(
        &self,
        connector: Connector,
        expected_version: u64,
        max_per_namespace: usize,
    ) -> Result<Connector> {
        let previous: Connector = self.require(connector.id.to_string()).await?;
        check_version(
            ResourceKind::Connector,
            &connector.id.to_string(),
            expected_version,
            previous.version(),
        )?;
        let guard = CapacityGuard {
            namespace_id: connector.namespace_id,
            max: max_per_namespace,
        };
        self.swap(&previous, connector, expected_version, Some(guard))
            .await
    }

    async fn connector_count(&self, namespace_id: NamespaceId) -> Result<usize> {
        let mut response = self
            .db
            .query(
                "SELECT count() FROM connector \
                 WHERE namespace_id = $ns AND assigned = true AND deleted = false GROUP ALL",
            )
            .bind(("ns", namespace_id.to_string()))
            .await
            .map_err(|e| from_surrealdb_error("count connectors", e))?;
        let rows: Vec<CountRow> = response
            .take(0)
            .map_err(|e| from_surrealdb_error("count connectors", e))?;
        Ok(rows.first().map_or(0, |row| row.count))
    }

    async fn put_connector_type(&self, connector_type: ConnectorType) -> Result<ConnectorType> {
        let record = RowRecord::encode(&connector_type, 1)?;
        self.db
            .query("UPSERT type::thing($tb, $id) CONTENT $row")
            .bind(("tb", CONNECTOR_TYPE))
            .bind(("id", connector_type.id.to_string()))
            .bind(("row", record))
            .await
            .map_err(|e| from_surrealdb_error("put connector type", e))?
            .check()
            .map_err(|e| from_surrealdb_error("put connector type", e))?;
        Ok(connector_type)
    }

    async fn get_connector_type(&self, id: &ConnectorTypeId) -> Result<ConnectorType> {
        let mut response = self
            .db
            .query(format!("SELECT {ROW_FIELDS} FROM type::thing($tb, $id)"))
            .bind(("tb", CONNECTOR_TYPE))
            .bind(("id", id.to_string()))
            .await
            .map_err(|e| from_surrealdb_error("select connector type", e))?;
        let records: Vec<RowRecord> = response
            .take(0)
            .map_err(|e| from_surrealdb_error("select connector type", e))?;
        records
            .first()
            .map(RowRecord::decode)
            .transpose()?
            .ok_or_else(|| Error::not_found(ResourceKind::ConnectorType, id.to_string()))
    }

    async fn list_connector_types(&self) -> Result<Vec<ConnectorType>> {
        let mut response = self
            .db
            .query(format!("SELECT {ROW_FIELDS} FROM type::table($tb)"))
            .bind(("tb", CONNECTOR_TYPE))
            .await
            .map_err(|e| from_surrealdb_error("list connector types", e))?;
        let records: Vec<RowRecord> = response
            .take(0)
            .map_err(|e| from_surrealdb_error("list connector types", e))?;
        let mut types = records
            .iter()
            .map(RowRecord::decode)
            .collect::<Result<Vec<ConnectorType>>>()?;
        types.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(types)
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let mut response = self
            .db
            .query(format!(
                "RETURN {{ \
                 clusters: (SELECT {ROW_FIELDS} FROM cluster), \
                 namespaces: (SELECT {ROW_FIELDS} FROM namespace), \
                 connectors: (SELECT {ROW_FIELDS} FROM connector) \
                 }}"
            ))
            .await
            .map_err(|e| from_surrealdb_error("snapshot", e))?;
        let record: Option<SnapshotRecord> = response
            .take(0)
            .map_err(|e| from_surrealdb_error("snapshot", e))?;
        let record = record.unwrap_or_default();

        Ok(StoreSnapshot::from_rows(
            decode_sorted(&record.clusters)?,
            decode_sorted(&record.namespaces)?,
            decode_sorted(&record.connectors)?,
            Utc::now(),
        ))
    }
}
