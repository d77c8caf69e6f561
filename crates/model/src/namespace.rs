//! Namespaces group connectors on exactly one cluster.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use fleet_core::{ClusterId, Error, NamespaceId, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::meta::RowMeta;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").ok());

const MAX_NAME_LEN: usize = 63;

/// Validate a namespace name. Empty names are handled by the caller.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_configuration(format!(
            "/name: must be at most {MAX_NAME_LEN} characters"
        )));
    }
    let matches = NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name));
    if !matches {
        return Err(Error::invalid_configuration(format!(
            "/name: '{name}' must start and end with an alphanumeric character \
             and contain only alphanumerics, '-', '_' or '.'"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    /// Empty means generate one.
    #[serde(default)]
    pub name: String,
    pub cluster_id: ClusterId,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl NamespaceSpec {
    pub fn new(cluster_id: ClusterId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster_id,
            annotations: BTreeMap::new(),
        }
    }
}

/// Changes to a namespace; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespacePatch {
    pub name: Option<String>,
    pub annotations: Option<BTreeMap<String, String>>,
}

impl NamespacePatch {
    pub fn apply_to(&self, namespace: &mut Namespace) -> Result<()> {
        if let Some(name) = &self.name {
            namespace.name = if name.is_empty() {
                generated_name(namespace.id)
            } else {
                validate_name(name)?;
                name.clone()
            };
        }
        if let Some(annotations) = &self.annotations {
            namespace.annotations = annotations.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NamespaceId,
    pub name: String,
    pub cluster_id: ClusterId,
    pub annotations: BTreeMap<String, String>,
    pub meta: RowMeta,
}

impl Namespace {
    pub fn new(spec: NamespaceSpec, now: DateTime<Utc>) -> Result<Self> {
        let id = NamespaceId::new();
        let name = if spec.name.is_empty() {
            generated_name(id)
        } else {
            validate_name(&spec.name)?;
            spec.name
        };

        Ok(Self {
            id,
            name,
            cluster_id: spec.cluster_id,
            annotations: spec.annotations,
            meta: RowMeta::new(now),
        })
    }

    /// Natural key among live namespaces.
    pub fn natural_key(&self) -> String {
        format!("{}/{}", self.cluster_id, self.name)
    }
}

fn generated_name(id: NamespaceId) -> String {
    format!("ns-{}", id.to_string().to_lowercase())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_empty_name_is_generated() {
        let namespace =
            Namespace::new(NamespaceSpec::new(ClusterId::new(), ""), Utc::now()).unwrap();
        assert!(namespace.name.starts_with("ns-"));
        assert_eq!(namespace.name, namespace.name.to_lowercase());
        assert!(validate_name(&namespace.name).is_ok());
    }

    #[test]
    fn test_name_pattern() {
        assert!(validate_name("team-a").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name("my.ns_01").is_ok());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_patch_renames_and_replaces_annotations() {
        let mut namespace =
            Namespace::new(NamespaceSpec::new(ClusterId::new(), "before"), Utc::now()).unwrap();
        let patch = NamespacePatch {
            name: Some("after".to_string()),
            annotations: Some([("owner".to_string(), "team-a".to_string())].into()),
        };

        patch.apply_to(&mut namespace).unwrap();

        assert_eq!(namespace.name, "after");
        assert_eq!(namespace.annotations.get("owner").map(String::as_str), Some("team-a"));
    }

    #[test]
    fn test_patch_rejects_bad_name_without_changes() {
        let mut namespace =
            Namespace::new(NamespaceSpec::new(ClusterId::new(), "keep"), Utc::now()).unwrap();
        let patch = NamespacePatch {
            name: Some("bad name".to_string()),
            annotations: None,
        };

        assert!(patch.apply_to(&mut namespace).is_err());
        assert_eq!(namespace.name, "keep");
    }
}
