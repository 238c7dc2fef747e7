//! Tracing setup with a reloadable level filter.
//!
//! The subscriber is installed before configuration is read, so it starts at
//! `info` and the configured `logging.level` is swapped in afterwards.
//! `RUST_LOG` always wins over the configured level.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn env_override() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let filter = env_override().unwrap_or_else(|| EnvFilter::new(level));
    let (filter_layer, handle) = reload::Layer::new(filter);
    if FILTER_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Replaces the active filter with `level` unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if env_override().is_some() {
        tracing::debug!(level, "RUST_LOG set, keeping environment filter");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(err) = handle.modify(|filter| *filter = EnvFilter::new(level)) {
        tracing::warn!(error = %err, level, "Failed to apply logging level");
    }
}
