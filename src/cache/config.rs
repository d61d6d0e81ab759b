//! Cache configuration.
//!
//! Controls the memoizing cache via the `[cache]` table of `quire.toml`.

use serde::Deserialize;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, every lookup runs its producer directly.
    pub enabled: bool,
    /// Compute the category list before the listener accepts requests.
    pub warm_on_startup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warm_on_startup: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            warm_on_startup: settings.warm_on_startup,
        }
    }
}
