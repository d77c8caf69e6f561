//! Result type definition.

use crate::error::Error;

/// The standard Result type for control plane operations.
pub type Result<T> = std::result::Result<T, Error>;
