//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A store or model operation failed.
    #[error(transparent)]
    Control(#[from] fleet_core::Error),

    #[error("invalid reconciler configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Control(inner) => inner.code(),
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use fleet_core::ResourceKind;

    use super::*;

    #[test]
    fn test_wraps_core_errors_transparently() {
        let inner = fleet_core::Error::not_found(ResourceKind::Cluster, "c1");
        let error = Error::from(inner.clone());
        assert_eq!(error.to_string(), inner.to_string());
        assert_eq!(error.code(), "not_found");
    }

    #[test]
    fn test_invalid_config_display() {
        let error = Error::invalid_config("interval must be positive");
        assert_eq!(
            error.to_string(),
            "invalid reconciler configuration: interval must be positive"
        );
    }
}
