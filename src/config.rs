//! Cache configuration.
//!
//! Hosts embed `CacheConfig` in their own settings tree; every field has a
//! default so a bare `[cache]` section (or none at all) works.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_EVICT_STALE_ON_LOAD: bool = true;

/// Configuration for cache entries and pools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL in seconds applied when neither the caller nor storage supplies one.
    pub default_ttl_secs: u64,
    /// Delete stored records found past their effective expiry while loading
    /// (tagged entries only).
    pub evict_stale_on_load: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
            evict_stale_on_load: DEFAULT_EVICT_STALE_ON_LOAD,
        }
    }
}

impl CacheConfig {
    /// The default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}
