//! Relationship Store seam (C2).
//!
//! The store that persists the symmetric `(ownerId, relatedUserId)`
//! relationship rows and their block flags lives outside this core
//! (spec §1, "out of scope"). The one operation this core calls —
//! `friendTwoUsers` — is modeled as a trait so the ACCEPT transaction
//! can call it without owning its storage.

use async_trait::async_trait;

use crate::store::{Session, StoreResult};

/// Which of a newly-confirmed pair's group indexes received the
/// relationship, one per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendedIndexes {
    pub requester_side_index: i32,
    pub recipient_side_index: i32,
}

/// The relationship-store operation this core depends on (spec §3, C2:
/// "Consumed here via one operation: `friendTwoUsers`").
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Checks whether `blocker` currently has `blocked` blocked.
    async fn is_blocked(&self, blocker: i64, blocked: i64) -> StoreResult<bool>;

    /// Materializes the symmetric relationship between `requester_id`
    /// and `recipient_id`, threaded through the caller's ACCEPT
    /// transaction `session`. Returns the group index each side's
    /// relationship landed in (typically each user's default group).
    async fn friend_two_users(
        &self,
        requester_id: i64,
        recipient_id: i64,
        session: Session,
    ) -> StoreResult<FriendedIndexes>;
}

/// Minimal in-memory [`RelationshipStore`] used by tests and as a
/// template for a real adapter. Relationships always land in each
/// user's default group; block flags are tracked in a `DashMap`.
pub struct InMemoryRelationshipStore {
    blocks: dashmap::DashSet<(i64, i64)>,
}

impl Default for InMemoryRelationshipStore {
    fn default() -> Self {
        Self {
            blocks: dashmap::DashSet::new(),
        }
    }
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, blocker: i64, blocked: i64) {
        self.blocks.insert((blocker, blocked));
    }

    pub fn unblock(&self, blocker: i64, blocked: i64) {
        self.blocks.remove(&(blocker, blocked));
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn is_blocked(&self, blocker: i64, blocked: i64) -> StoreResult<bool> {
        Ok(self.blocks.contains(&(blocker, blocked)))
    }

    async fn friend_two_users(
        &self,
        _requester_id: i64,
        _recipient_id: i64,
        _session: Session,
    ) -> StoreResult<FriendedIndexes> {
        Ok(FriendedIndexes {
            requester_side_index: crate::model::DEFAULT_GROUP_INDEX,
            recipient_side_index: crate::model::DEFAULT_GROUP_INDEX,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unblocked_pair_is_not_blocked() {
        let store = InMemoryRelationshipStore::new();
        assert!(!store.is_blocked(1, 2).await.unwrap());
    }

    #[tokio::test]
    async fn block_is_directional() {
        let store = InMemoryRelationshipStore::new();
        store.block(1, 2);
        assert!(store.is_blocked(1, 2).await.unwrap());
        assert!(!store.is_blocked(2, 1).await.unwrap());
    }
}
