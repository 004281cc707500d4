//! Social-graph core: friend requests, relationship groups, and the
//! auto-block manager that defends the request path against abusive
//! traffic.
//!
//! See `DESIGN.md` for how each module is grounded.

pub mod autoblock;
pub mod config;
pub mod error;
pub mod expiry;
pub mod friend_request;
pub mod groups;
pub mod ids;
pub mod model;
pub mod proto;
pub mod relationship;
pub mod scheduler;
pub mod store;
pub mod time;
pub mod version;

pub use autoblock::AutoBlockManager;
pub use config::{ConfigHandle, GraphConfig};
pub use error::{GraphError, Result};
pub use friend_request::FriendRequestService;
pub use groups::RelationshipGroupService;
pub use ids::{IdGenerator, SnowflakeIdGenerator};
pub use model::{FriendRequest, RelationshipGroup, RelationshipGroupMember, RequestStatus};
pub use relationship::{InMemoryRelationshipStore, RelationshipStore};
pub use scheduler::{LeaderCheck, ScheduledJobHandle, TaskScheduler, TokioCronScheduler};
pub use store::memory::InMemoryStore;
pub use store::Store;
pub use version::VersionRegistry;

use std::sync::Arc;

use groups::RelationshipStoreProvider;

/// Wires the friend-request and relationship-group services against a
/// shared store and version registry.
///
/// The relationship-store provider is handed to the group service only
/// (spec §9's late-binding seam); the friend-request service is given
/// the same resolved instance back via [`RelationshipGroupService::relationship_store`]
/// so both services share one lazily-constructed relationship store
/// without either owning its construction.
pub struct SocialGraph {
    pub friend_requests: FriendRequestService,
    pub groups: RelationshipGroupService,
}

impl SocialGraph {
    pub fn new(
        store: Arc<dyn Store>,
        relationship_provider: Box<dyn RelationshipStoreProvider>,
        ids: Arc<dyn IdGenerator>,
        config: ConfigHandle,
    ) -> Self {
        let versions = Arc::new(VersionRegistry::new());
        let groups = RelationshipGroupService::new(store.clone(), versions.clone(), relationship_provider);
        let relationship = groups.relationship_store();
        let friend_requests = FriendRequestService::new(store, relationship, versions, ids, config);
        Self { friend_requests, groups }
    }

    /// Registers the expired-request housekeeping job; see
    /// [`FriendRequestService::schedule_expiry_cleanup`].
    pub fn schedule_expiry_cleanup(
        &self,
        scheduler: &dyn TaskScheduler,
        leader: Arc<dyn LeaderCheck>,
    ) -> std::result::Result<ScheduledJobHandle, cron::error::Error> {
        self.friend_requests.schedule_expiry_cleanup(scheduler, leader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wires_shared_relationship_store_lazily() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let relationship = Arc::new(InMemoryRelationshipStore::new());
        let provider_relationship = relationship.clone();
        let ids: Arc<dyn IdGenerator> = Arc::new(SnowflakeIdGenerator::new(1));

        let graph = SocialGraph::new(
            store,
            Box::new(move || -> Arc<dyn RelationshipStore> { provider_relationship.clone() }),
            ids,
            ConfigHandle::default(),
        );

        relationship.block(8, 7);
        let err = graph
            .friend_requests
            .auth_and_create_request(7, 8, None, None)
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::BlockedUserToSendFriendRequest);
    }
}
