//! Connector type catalog entries.

use std::collections::BTreeMap;
use std::fmt;

use fleet_core::{ConnectorTypeId, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema;

/// Release channel a connector is deployed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
    Alpha,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
            Self::Alpha => "alpha",
        })
    }
}

/// An immutable catalog entry describing one kind of connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorType {
    pub id: ConnectorTypeId,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub icon_href: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub featured_rank: i32,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// JSON schema for the connector's type-specific configuration.
    #[serde(default)]
    pub schema: Value,
}

impl ConnectorType {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: ConnectorTypeId::new(id),
            name: name.into(),
            version: version.into(),
            channels: vec![Channel::Stable],
            description: String::new(),
            deprecated: false,
            icon_href: None,
            labels: Vec::new(),
            annotations: BTreeMap::new(),
            featured_rank: 0,
            capabilities: Vec::new(),
            schema: Value::Null,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// An empty channel list means every channel is offered.
    pub fn supports_channel(&self, channel: Channel) -> bool {
        self.channels.is_empty() || self.channels.contains(&channel)
    }

    /// Check that a new connector of this type may be created.
    pub fn admit(&self, channel: Channel, configuration: &Value) -> Result<()> {
        if self.deprecated {
            return Err(Error::invalid_configuration(format!(
                "connector type '{}' is deprecated",
                self.id
            )));
        }
        if !self.supports_channel(channel) {
            return Err(Error::invalid_configuration(format!(
                "connector type '{}' is not offered on channel '{channel}'",
                self.id
            )));
        }
        self.check_configuration(configuration)
    }

    /// Validate a configuration payload against the type's schema.
    pub fn check_configuration(&self, configuration: &Value) -> Result<()> {
        let violations = schema::validate(&self.schema, configuration)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration {
                violations: violations.iter().map(ToString::to_string).collect(),
            })
        }
    }

    /// Fail early on a schema that can never validate anything.
    pub fn check_schema(&self) -> Result<()> {
        schema::compile(&self.schema)
            .map(|_| ())
            .map_err(|e| Error::invalid_config(format!("connector type '{}': {e}", self.id)))
    }
}

/// Parse a catalog file: a JSON array of connector types.
pub fn parse_catalog(raw: &str) -> Result<Vec<ConnectorType>> {
    let types: Vec<ConnectorType> = serde_json::from_str(raw)
        .map_err(|e| Error::invalid_config(format!("invalid catalog: {e}")))?;
    types.iter().try_for_each(ConnectorType::check_schema)?;
    Ok(types)
}
