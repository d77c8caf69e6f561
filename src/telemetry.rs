//! Tracing setup.

use anyhow::{Context, Result};
use fleet_core::config::LogSettings;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "info,fleet=debug,tower_http=info";

/// `RUST_LOG` wins over `log.filter`, which wins over [`DEFAULT_FILTER`].
pub fn env_filter(settings: &LogSettings) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = settings.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).with_context(|| format!("invalid log filter '{directives}'"))
}

pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let json = settings.json.then(|| fmt::layer().json());
    let plain = (!settings.json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter(settings)?)
        .with(json)
        .with(plain)
        .try_init()
        .context("tracing already initialised")
}
