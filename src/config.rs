//! Hot-reloadable configuration snapshot.
//!
//! Mirrors `umbra-relay`'s `RelayConfig` in shape, but is distributed via
//! `ConfigHandle` so a host-side property-reload notification can replace
//! the whole snapshot atomically (spec §5: "callers always read via a
//! single volatile load").

use std::sync::Arc;

use arc_swap::ArcSwap;

/// One escalation level for the auto-block manager.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLevelConfig {
    pub block_duration_seconds: i64,
    pub go_next_level_trigger_times: u32,
    pub reduce_one_trigger_time_interval_millis: i64,
}

/// Auto-block configuration: the global threshold to enter level 0, plus
/// the ordered list of escalation levels.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoBlockConfig {
    pub enabled: bool,
    pub block_trigger_times: u32,
    pub levels: Vec<BlockLevelConfig>,
}

impl Default for AutoBlockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_trigger_times: 5,
            levels: vec![
                BlockLevelConfig {
                    block_duration_seconds: 60,
                    go_next_level_trigger_times: 3,
                    reduce_one_trigger_time_interval_millis: 0,
                },
                BlockLevelConfig {
                    block_duration_seconds: 300,
                    go_next_level_trigger_times: 3,
                    reduce_one_trigger_time_interval_millis: 0,
                },
            ],
        }
    }
}

/// Process-wide configuration snapshot (spec §6, "Configuration"
/// block). Every field is hot-reloadable: a new `GraphConfig` replaces
/// the old one wholesale via [`ConfigHandle::store`].
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    /// `<= 0` means unbounded.
    pub max_content_length: i64,
    /// `<= 0` means unbounded.
    pub max_response_reason_length: i64,
    pub allow_send_request_after_declined_or_ignored_or_expired: bool,
    pub allow_recall_pending_friend_request_by_sender: bool,
    pub delete_expired_requests_when_cron_triggered: bool,
    pub expired_user_friend_requests_cleanup_cron: String,
    /// `<= 0` disables expiry projection.
    pub friend_request_expire_after_seconds: i64,
    pub auto_block: AutoBlockConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_content_length: 300,
            max_response_reason_length: 300,
            allow_send_request_after_declined_or_ignored_or_expired: true,
            allow_recall_pending_friend_request_by_sender: true,
            delete_expired_requests_when_cron_triggered: false,
            expired_user_friend_requests_cleanup_cron: "0 0 3 * * *".to_string(),
            friend_request_expire_after_seconds: 30 * 24 * 3600,
            auto_block: AutoBlockConfig::default(),
        }
    }
}

/// A cloneable, atomically-swappable handle to the current config
/// snapshot. Clone is cheap (an `Arc` bump); every service holds one.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<GraphConfig>>,
}

impl ConfigHandle {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Single volatile load of the current snapshot.
    pub fn load(&self) -> Arc<GraphConfig> {
        self.inner.load_full()
    }

    /// Atomically replace the snapshot, e.g. on a property-reload
    /// notification from the host.
    pub fn store(&self, config: GraphConfig) {
        self.inner.store(Arc::new(config));
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_reload_is_visible_to_existing_handle() {
        let handle = ConfigHandle::default();
        assert_eq!(handle.load().max_content_length, 300);

        let mut updated = (*handle.load()).clone();
        updated.max_content_length = 500;
        handle.store(updated);

        assert_eq!(handle.load().max_content_length, 500);
    }

    #[test]
    fn clone_shares_the_same_snapshot() {
        let handle = ConfigHandle::default();
        let cloned = handle.clone();

        let mut updated = (*handle.load()).clone();
        updated.max_content_length = 42;
        handle.store(updated);

        assert_eq!(cloned.load().max_content_length, 42);
    }
}
