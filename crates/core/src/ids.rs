//! Typed identifiers.
//!
//! Clusters, namespaces and connectors are keyed by ULIDs so ids sort by
//! creation time. Connector types come from an external catalog and keep
//! whatever string id the catalog gives them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, ResourceKind};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Create a new unique id.
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s)
                    .map(Self)
                    .map_err(|e| Error::invalid_id($kind, s, e.to_string()))
            }
        }
    };
}

ulid_id!(
    /// Identifier of a data-plane cluster.
    ClusterId => ResourceKind::Cluster
);

ulid_id!(
    /// Identifier of a namespace inside a cluster.
    NamespaceId => ResourceKind::Namespace
);

ulid_id!(
    /// Identifier of a connector instance.
    ConnectorId => ResourceKind::Connector
);

/// Identifier of a connector type in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorTypeId(String);

impl ConnectorTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConnectorTypeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_id(
                ResourceKind::ConnectorType,
                s,
                "connector type id must not be empty",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for ConnectorTypeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
