pub mod analyze;
pub mod cache;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chat_topics::config::AnalysisConfig;
use chat_topics::storage::path_utils;

/// Resolve configuration: explicit path, else the user config dir, else
/// defaults.
pub fn resolve_config(explicit: Option<&str>) -> Result<AnalysisConfig> {
    let path: PathBuf = match explicit {
        Some(p) => PathBuf::from(p),
        None => path_utils::config_path(),
    };
    AnalysisConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
