//! Layered configuration.
//!
//! Defaults, then an optional TOML file, then `FLEET_*` environment
//! variables. The result is validated before anything is wired up.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Store URL that selects the in-process store.
pub const MEMORY_STORE_URL: &str = "memory";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub reconciler: ReconcilerSettings,
    pub assignment: AssignmentSettings,
    pub ingest: IngestSettings,
    pub catalog: CatalogSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind_address: String,
    pub cors_origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            cors_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub url: String,
    pub namespace: String,
    pub database: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: MEMORY_STORE_URL.to_string(),
            namespace: "fleet".to_string(),
            database: "control_plane".to_string(),
        }
    }
}

impl StoreSettings {
    /// True when the in-process store is selected.
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_STORE_URL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub staleness_threshold_secs: u64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            staleness_threshold_secs: 900,
        }
    }
}

impl ReconcilerSettings {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub const fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignmentSettings {
    pub max_connectors_per_namespace: usize,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            max_connectors_per_namespace: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    pub max_cas_retries: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { max_cas_retries: 3 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub filter: Option<String>,
    pub json: bool,
}

impl FleetConfig {
    /// Load defaults, the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())?.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::invalid_config(format!("invalid TOML: {e}")))
    }

    /// Apply `FLEET_*` overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FLEET_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = lookup("FLEET_CORS_ORIGIN") {
            self.server.cors_origin = value;
        }
        if let Some(value) = lookup("FLEET_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = lookup("FLEET_RECONCILE_INTERVAL_SECS") {
            self.reconciler.interval_secs = parse_number("FLEET_RECONCILE_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("FLEET_STALENESS_THRESHOLD_SECS") {
            self.reconciler.staleness_threshold_secs =
                parse_number("FLEET_STALENESS_THRESHOLD_SECS", &value)?;
        }
        if let Some(value) = lookup("FLEET_MAX_CONNECTORS_PER_NAMESPACE") {
            self.assignment.max_connectors_per_namespace =
                parse_number("FLEET_MAX_CONNECTORS_PER_NAMESPACE", &value)?;
        }
        if let Some(value) = lookup("FLEET_CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(value));
        }
        Ok(self)
    }

    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;
        if self.reconciler.interval_secs == 0 {
            return Err(Error::invalid_config("reconciler.interval_secs must be positive"));
        }
        if self.reconciler.staleness_threshold_secs == 0 {
            return Err(Error::invalid_config(
                "reconciler.staleness_threshold_secs must be positive",
            ));
        }
        if self.assignment.max_connectors_per_namespace == 0 {
            return Err(Error::invalid_config(
                "assignment.max_connectors_per_namespace must be positive",
            ));
        }
        if self.store.url.trim().is_empty() {
            return Err(Error::invalid_config("store.url must not be empty"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server.bind_address.parse().map_err(|e| {
            Error::invalid_config(format!(
                "server.bind_address '{}' is not a socket address: {e}",
                self.server.bind_address
            ))
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::invalid_config(format!("cannot render config: {e}")))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("{key}='{value}': {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.store.is_memory());
        assert_eq!(config.reconciler.interval(), Duration::from_secs(30));
        assert_eq!(config.assignment.max_connectors_per_namespace, 4);
        assert_eq!(config.ingest.max_cas_retries, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[reconciler]\ninterval_secs = 5\n\n[store]\nurl = \"mem://\"\n"
        )
        .unwrap();

        let config = FleetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.reconciler.interval_secs, 5);
        assert_eq!(config.reconciler.staleness_threshold_secs, 900);
        assert_eq!(config.store.url, "mem://");
        assert_eq!(config.store.namespace, "fleet");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = FleetConfig::from_toml("[reconciler]\nintervl = 5\n").unwrap_err();
        assert_eq!(err.code(), "invalid_config");
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("FLEET_BIND_ADDRESS", "0.0.0.0:9000"),
            ("FLEET_MAX_CONNECTORS_PER_NAMESPACE", "10"),
            ("FLEET_CATALOG_PATH", "/etc/fleet/catalog.json"),
        ]
        .into_iter()
        .collect();

        let config = FleetConfig::from_toml("[assignment]\nmax_connectors_per_namespace = 2\n")
            .unwrap()
            .with_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.assignment.max_connectors_per_namespace, 10);
        assert_eq!(
            config.catalog.path,
            Some(PathBuf::from("/etc/fleet/catalog.json"))
        );
    }

    #[test]
    fn test_bad_env_number_is_invalid_config() {
        let result = FleetConfig::default().with_overrides(|key| {
            (key == "FLEET_RECONCILE_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_validation_rejects_zero_and_bad_address() {
        let mut config = FleetConfig::default();
        config.reconciler.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = FleetConfig::default();
        config.assignment.max_connectors_per_namespace = 0;
        assert!(config.validate().is_err());

        let mut config = FleetConfig::default();
        config.server.bind_address = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_rendering_parses_back() {
        let config = FleetConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(FleetConfig::from_toml(&rendered).unwrap(), config);
    }
}
