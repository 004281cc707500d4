//! The ID generator seam (spec §6: "To the ID generator").
//!
//! The cluster-wide generator itself lives outside this crate; callers in
//! production wire their own [`IdGenerator`] impl in front of it.
//! [`SnowflakeIdGenerator`] is the crate's own reference implementation,
//! used by default and in tests.

use std::sync::atomic::{AtomicI64, Ordering};

/// The kind of entity an ID is being minted for, passed through to the
/// generator so a real cluster-wide service can route to the right
/// sequence/shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    FriendRequest,
    RelationshipGroup,
}

/// Mints globally-unique 64-bit IDs, non-blocking.
pub trait IdGenerator: Send + Sync {
    fn next_large_gap_id(&self, service_type: ServiceType) -> i64;
}

const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_700_000_000_000;

/// A single-process snowflake-style generator: 41 bits of millis since a
/// fixed epoch, 10 bits of node id, 12 bits of per-millisecond sequence.
/// Not cluster-coordinated — production deployments supply their own
/// [`IdGenerator`] backed by the real service named in spec §6.
pub struct SnowflakeIdGenerator {
    node_id: i64,
    state: AtomicI64,
}

impl SnowflakeIdGenerator {
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: (node_id & 0x3FF) as i64,
            state: AtomicI64::new(0),
        }
    }

    fn next_raw(&self) -> i64 {
        loop {
            let now = crate::time::now_millis() - SNOWFLAKE_EPOCH_MILLIS;
            let prev = self.state.load(Ordering::Relaxed);
            let prev_millis = prev >> 12;
            let seq = if prev_millis == now {
                (prev & 0xFFF) + 1
            } else {
                0
            };
            if seq > 0xFFF {
                // Exhausted this millisecond's sequence space; spin to the next tick.
                continue;
            }
            let next = (now << 12) | seq;
            if self
                .state
                .compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return (now << 22) | (self.node_id << 12) | seq;
            }
        }
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_large_gap_id(&self, _service_type: ServiceType) -> i64 {
        self.next_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let gen = SnowflakeIdGenerator::new(1);
        let a = gen.next_large_gap_id(ServiceType::FriendRequest);
        let b = gen.next_large_gap_id(ServiceType::FriendRequest);
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn different_nodes_do_not_collide_in_the_same_millisecond() {
        let a = SnowflakeIdGenerator::new(1);
        let b = SnowflakeIdGenerator::new(2);
        assert_ne!(
            a.next_large_gap_id(ServiceType::FriendRequest),
            b.next_large_gap_id(ServiceType::FriendRequest)
        );
    }
}
