use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::{ArmSyncConfig, Error};

const ARMSYNC_CONFIG_ENV_NAME: &str = "ARMSYNC_CONFIG_PATH";
const DEFAULT_LOG_FILTER: &str = "armsync=info";

/// Get config path from input or env ARMSYNC_CONFIG_PATH.
pub fn get_apps_config_path(config: Option<PathBuf>) -> Option<PathBuf> {
    if config.is_some() {
        config
    } else {
        std::env::var(ARMSYNC_CONFIG_ENV_NAME)
            .map(|s| {
                warn!("### ENV VAR {s} is used ###");
                PathBuf::from(s)
            })
            .ok()
    }
}

/// Loads the config at `config_path`, or the default config without one.
pub fn resolve_config(config_path: Option<&Path>) -> Result<ArmSyncConfig, Error> {
    match config_path {
        Some(path) => ArmSyncConfig::try_new(path),
        None => Ok(ArmSyncConfig::default()),
    }
}

/// Logs to stderr, filtered by `RUST_LOG` (`armsync=info` when unset).
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
