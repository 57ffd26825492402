//! # Router Configuration
//!
//! Defaults, environment overrides and a serde form for embedding in a
//! host application's own config file.

use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable toggling filters (`0`, `false`, `off` disable them)
pub const FILTERS_ENV: &str = "WAYPOST_FILTERS";

/// Environment variable naming the filter cache directory
pub const CACHE_DIR_ENV: &str = "WAYPOST_CACHE_DIR";

/// Router settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Run global, pattern, route and controller filters
    pub filters_enabled: bool,
    /// Directory for the controller filter cache; uncached when `None`
    pub cache_dir: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            filters_enabled: true,
            cache_dir: None,
        }
    }
}

impl RouterConfig {
    /// Defaults with `WAYPOST_FILTERS` / `WAYPOST_CACHE_DIR` applied
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(FILTERS_ENV) {
            self.filters_enabled = !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        self
    }
}
