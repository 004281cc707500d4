//! Version Registry (C1): per-user, per-stream last-updated timestamps
//! used by clients to decide whether to fetch (spec §4.5).
//!
//! Advances are best-effort: a failed or lost advance must never fail
//! the owning mutation. Concurrent updaters use last-writer-wins on
//! wall-clock, matching `umbra-relay`'s `DashMap`-keyed state in
//! `state.rs`.

use dashmap::DashMap;

use crate::time::now_millis;

/// The four independent streams a client can incrementally sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    SentRequests,
    ReceivedRequests,
    RelationshipGroups,
    GroupMembership,
}

/// Holds a `(ownerId, stream)`-keyed monotonically-advancing timestamp.
#[derive(Default)]
pub struct VersionRegistry {
    rows: DashMap<(i64, Stream), i64>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version for `(owner, stream)`, or 0 if never bumped.
    pub fn get(&self, owner: i64, stream: Stream) -> i64 {
        self.rows.get(&(owner, stream)).map(|v| *v).unwrap_or(0)
    }

    /// Advance `(owner, stream)` to `max(current, now)`. Last-writer-wins
    /// on wall-clock: a bump that races a later bump never regresses the
    /// row (spec §3, VersionRow: "advancing monotonically").
    pub fn bump(&self, owner: i64, stream: Stream) -> i64 {
        let now = now_millis();
        let mut entry = self.rows.entry((owner, stream)).or_insert(0);
        if now > *entry {
            *entry = now;
        }
        *entry
    }

    /// Best-effort bump: logs and swallows nothing to propagate, since
    /// the map itself cannot fail. Kept as a distinct entry point so
    /// call sites read the same way the spec describes them (§4.1,
    /// §4.3: "best-effort — failure is logged but does not fail the
    /// call").
    pub fn bump_best_effort(&self, owner: i64, stream: Stream) {
        self.bump(owner, stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbumped_stream_reads_zero() {
        let reg = VersionRegistry::new();
        assert_eq!(reg.get(1, Stream::SentRequests), 0);
    }

    #[test]
    fn bump_advances_and_is_non_decreasing() {
        let reg = VersionRegistry::new();
        let first = reg.bump(1, Stream::ReceivedRequests);
        assert!(first > 0);
        let second = reg.bump(1, Stream::ReceivedRequests);
        assert!(second >= first);
    }

    #[test]
    fn streams_and_owners_are_independent() {
        let reg = VersionRegistry::new();
        reg.bump(1, Stream::SentRequests);
        assert_eq!(reg.get(1, Stream::ReceivedRequests), 0);
        assert_eq!(reg.get(2, Stream::SentRequests), 0);
    }
}
