//! Sync core configuration.
//!
//! A plain `Default`-able struct consumed by value at construction, in the
//! style of [`crate::config::NetworkConfig`] — no global config singleton,
//! per SPEC_FULL.md §9.

use std::path::PathBuf;
use std::time::Duration;

/// Process-wide tunables for the sync core (§6).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// If `false`, [`super::manager::SyncManager`] is a no-op: no maintenance
    /// loop runs and event intake methods return immediately.
    pub is_sync_enabled: bool,
    /// Target peer pool size.
    pub sync_peer_count: usize,
    /// Per-batch hash request cap.
    pub max_hashes_ask: u32,
    /// Read timeout the transport should use (consumed by the transport, not
    /// by the core itself — carried here for convenience of a single config
    /// struct).
    pub peer_channel_read_timeout: Duration,
    /// Not consumed by the core; listed for context per §6.
    pub database_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let database_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rill");

        Self {
            is_sync_enabled: true,
            sync_peer_count: 8,
            max_hashes_ask: 192,
            peer_channel_read_timeout: Duration::from_secs(30),
            database_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_enabled() {
        assert!(SyncConfig::default().is_sync_enabled);
    }

    #[test]
    fn default_max_hashes_ask_matches_spec_scenarios() {
        assert_eq!(SyncConfig::default().max_hashes_ask, 192);
    }

    #[test]
    fn default_peer_channel_read_timeout_is_30s() {
        assert_eq!(SyncConfig::default().peer_channel_read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_is_clone_and_debug() {
        let cfg = SyncConfig::default();
        let cfg2 = cfg.clone();
        let debug = format!("{cfg2:?}");
        assert!(debug.contains("SyncConfig"));
    }
}
