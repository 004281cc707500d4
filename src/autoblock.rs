//! Auto-Block Manager (C5): an in-memory escalating penalty tracker
//! keyed by opaque client identity (spec §4.4).

use dashmap::DashMap;

use crate::config::AutoBlockConfig;
use crate::time::MonotonicClock;

/// Current penalty state for one tracked client. `None` level means
/// the client has triggered penalties but is not currently blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockStatus {
    level: Option<usize>,
    trigger_times: u32,
    last_trigger_nanos: i64,
}

/// What `tryBlock` did, so callers can react (e.g. reject the inbound
/// request and notify the client of the new block window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// No block is in effect.
    NotBlocked,
    /// The client is blocked at `level` for `duration_seconds`; `escalated`
    /// is true if this call itself advanced the level.
    Blocked {
        level: usize,
        duration_seconds: i64,
        escalated: bool,
    },
}

/// Escalating rate-limiter described in spec §4.4. All time comparisons
/// use a monotonic nanosecond clock so NTP adjustments can never make a
/// penalty window run backwards.
pub struct AutoBlockManager {
    statuses: DashMap<String, BlockStatus>,
    clock: MonotonicClock,
}

impl AutoBlockManager {
    pub fn new() -> Self {
        Self {
            statuses: DashMap::new(),
            clock: MonotonicClock::default(),
        }
    }

    /// Atomically updates the tracked state for `id` per the five-step
    /// algorithm in spec §4.4. `config` is read once at the top of the
    /// call so a concurrent hot-reload never splits one call across two
    /// configuration snapshots. `on_client_blocked` fires synchronously
    /// when a block takes effect or escalates (spec §5: "no suspension
    /// occurs inside the auto-block critical section" — callers must
    /// keep this callback non-suspending).
    pub fn try_block(
        &self,
        id: &str,
        config: &AutoBlockConfig,
        mut on_client_blocked: impl FnMut(&str, i64),
    ) -> BlockOutcome {
        let now = self.clock.now_nanos();
        let mut entry = self.statuses.entry(id.to_string()).or_insert(BlockStatus {
            level: None,
            trigger_times: 0,
            last_trigger_nanos: now,
        });

        // Capture `previous` before the overwrite — the source bug spec
        // §9 calls out and requires fixing here.
        let previous_last_trigger = entry.last_trigger_nanos;

        if let Some(level) = entry.level {
            let level_config = &config.levels[level];
            if level_config.reduce_one_trigger_time_interval_millis > 0 {
                let elapsed_millis = (now - previous_last_trigger) / 1_000_000;
                let decay =
                    (elapsed_millis / level_config.reduce_one_trigger_time_interval_millis) as u32;
                entry.trigger_times = entry.trigger_times.saturating_sub(decay);
            }
        }

        entry.last_trigger_nanos = now;

        if let Some(level) = entry.level {
            entry.trigger_times += 1;
            let level_config = &config.levels[level];
            let mut escalated = false;
            let mut effective_level = level;
            if entry.trigger_times >= level_config.go_next_level_trigger_times
                && level + 1 < config.levels.len()
            {
                effective_level = level + 1;
                entry.level = Some(effective_level);
                entry.trigger_times = 0;
                escalated = true;
            }
            let duration = config.levels[effective_level].block_duration_seconds;
            on_client_blocked(id, duration);
            BlockOutcome::Blocked {
                level: effective_level,
                duration_seconds: duration,
                escalated,
            }
        } else if entry.trigger_times + 1 >= config.block_trigger_times {
            entry.level = Some(0);
            entry.trigger_times = 0;
            let duration = config.levels[0].block_duration_seconds;
            on_client_blocked(id, duration);
            BlockOutcome::Blocked {
                level: 0,
                duration_seconds: duration,
                escalated: true,
            }
        } else {
            entry.trigger_times += 1;
            BlockOutcome::NotBlocked
        }
    }

    /// Removes all tracked state for `id`.
    pub fn unblock(&self, id: &str) {
        self.statuses.remove(id);
    }

    /// Periodic sweep: evicts any entry whose decay would bring
    /// `triggerTimes` to zero or below (spec §4.4). Iteration is weakly
    /// consistent with concurrent `tryBlock`/`unblock` calls.
    pub fn evict_expired(&self, config: &AutoBlockConfig) {
        let now = self.clock.now_nanos();
        let stale: Vec<String> = self
            .statuses
            .iter()
            .filter_map(|entry| {
                let status = *entry.value();
                let level = status.level?;
                let level_config = config.levels.get(level)?;
                if level_config.reduce_one_trigger_time_interval_millis <= 0 {
                    return None;
                }
                let elapsed_millis = (now - status.last_trigger_nanos) / 1_000_000;
                let decay =
                    (elapsed_millis / level_config.reduce_one_trigger_time_interval_millis) as u32;
                if status.trigger_times.saturating_sub(decay) == 0 {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();

        for id in stale {
            self.statuses.remove(&id);
        }
    }
}

impl Default for AutoBlockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockLevelConfig;

    fn test_config() -> AutoBlockConfig {
        AutoBlockConfig {
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

    #[test]
    fn escalates_through_levels_then_stops() {
        let manager = AutoBlockManager::new();
        let config = test_config();
        let mut blocked_at = Vec::new();

        for _ in 0..5 {
            manager.try_block("x", &config, |_, _| {});
        }
        let outcome = manager.try_block("x", &config, |id, duration| {
            blocked_at.push((id.to_string(), duration));
        });
        // The 6th call is the one that crosses block_trigger_times=5.
        assert!(matches!(outcome, BlockOutcome::Blocked { level: 0, duration_seconds: 60, .. }));

        for _ in 0..2 {
            manager.try_block("x", &config, |_, _| {});
        }
        let outcome = manager.try_block("x", &config, |id, duration| {
            blocked_at.push((id.to_string(), duration));
        });
        assert!(matches!(
            outcome,
            BlockOutcome::Blocked { level: 1, duration_seconds: 300, .. }
        ));

        for _ in 0..10 {
            manager.try_block("x", &config, |_, _| {});
        }
        let outcome = manager.try_block("x", &config, |_, _| {});
        assert!(matches!(
            outcome,
            BlockOutcome::Blocked { level: 1, duration_seconds: 300, .. }
        ));
    }

    #[test]
    fn unblock_clears_state() {
        let manager = AutoBlockManager::new();
        let config = test_config();
        for _ in 0..5 {
            manager.try_block("x", &config, |_, _| {});
        }
        manager.unblock("x");
        let outcome = manager.try_block("x", &config, |_, _| {});
        assert_eq!(outcome, BlockOutcome::NotBlocked);
    }
}
