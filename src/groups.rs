//! Relationship-Group Service (C3): owns the named buckets and their
//! members (spec §4.3).

use std::sync::Arc;

use once_cell::sync::OnceCell;
use rand::Rng;

use crate::error::{GraphError, Result};
use crate::model::{MemberKey, RelationshipGroup, RelationshipGroupMember, DEFAULT_GROUP_INDEX};
use crate::relationship::RelationshipStore;
use crate::store::{DeleteResult, GroupFieldUpdate, Session, Store, StoreError, UpdateResult};
use crate::time::now_millis;
use crate::version::{Stream, VersionRegistry};

const RANDOM_INDEX_MAX_ATTEMPTS: u32 = 8;

/// Supplies the relationship store lazily, breaking the circular
/// dependency between the group service and the relationship service
/// (spec §9): the group service is constructed with a provider, not an
/// instance, and resolves it on first use.
pub trait RelationshipStoreProvider: Send + Sync {
    fn get(&self) -> Arc<dyn RelationshipStore>;
}

impl<F> RelationshipStoreProvider for F
where
    F: Fn() -> Arc<dyn RelationshipStore> + Send + Sync,
{
    fn get(&self) -> Arc<dyn RelationshipStore> {
        self()
    }
}

pub struct RelationshipGroupService {
    store: Arc<dyn Store>,
    versions: Arc<VersionRegistry>,
    relationship_provider: Box<dyn RelationshipStoreProvider>,
    relationship: OnceCell<Arc<dyn RelationshipStore>>,
}

impl RelationshipGroupService {
    pub fn new(
        store: Arc<dyn Store>,
        versions: Arc<VersionRegistry>,
        relationship_provider: Box<dyn RelationshipStoreProvider>,
    ) -> Self {
        Self {
            store,
            versions,
            relationship_provider,
            relationship: OnceCell::new(),
        }
    }

    /// Resolves the relationship-store provider on first call and
    /// caches the result; every later call, including from other
    /// services wired against the same group service, reuses the
    /// cached instance instead of invoking the provider again.
    pub fn relationship_store(&self) -> Arc<dyn RelationshipStore> {
        self.relationship
            .get_or_init(|| self.relationship_provider.get())
            .clone()
    }

    pub async fn create_group(
        &self,
        owner_id: i64,
        group_index: Option<i32>,
        name: String,
        creation_date: Option<i64>,
        session: Option<Session>,
    ) -> Result<RelationshipGroup> {
        let creation_date = creation_date.unwrap_or_else(now_millis);

        if let Some(index) = group_index {
            let group = RelationshipGroup {
                owner_id,
                index,
                name,
                creation_date,
            };
            self.store
                .insert_group(group.clone(), session)
                .await
                .map_err(|e| map_insert_error(e, session.is_some()))?;
            return Ok(group);
        }

        // No caller-supplied index: mint a random positive 31-bit index and
        // retry on collision. A transaction cannot be resumed after a
        // constraint violation, so retrying is only safe outside one.
        if session.is_some() {
            let index = random_group_index();
            let group = RelationshipGroup {
                owner_id,
                index,
                name,
                creation_date,
            };
            self.store
                .insert_group(group.clone(), session)
                .await
                .map_err(|_| GraphError::Fatal("duplicate group index inside transaction".to_string()))?;
            return Ok(group);
        }

        for attempt in 0..RANDOM_INDEX_MAX_ATTEMPTS {
            let index = random_group_index();
            let group = RelationshipGroup {
                owner_id,
                index,
                name: name.clone(),
                creation_date,
            };
            match self.store.insert_group(group.clone(), None).await {
                Ok(()) => return Ok(group),
                Err(StoreError::DuplicateKey) => {
                    tracing::debug!(owner_id, attempt, "Random group index collided, retrying");
                    continue;
                }
                Err(e) => return Err(GraphError::Store(e.to_string())),
            }
        }
        Err(GraphError::Fatal("exhausted random group index attempts".to_string()))
    }

    /// Implements the four-by-two case table in spec §4.3. Returns the
    /// index a new membership row landed in, or `None` if the call was
    /// a no-op.
    pub async fn upsert_group_member(
        &self,
        owner_id: i64,
        related_user_id: i64,
        new_index: Option<i32>,
        delete_index: Option<i32>,
        session: Option<Session>,
    ) -> Result<Option<i32>> {
        match (new_index, delete_index) {
            (Some(new_index), None) => {
                let member = RelationshipGroupMember {
                    owner_id,
                    group_index: new_index,
                    related_user_id,
                    join_date: now_millis(),
                };
                let result = self
                    .store
                    .upsert_member(member, session)
                    .await
                    .map_err(|e| GraphError::Store(e.to_string()))?;
                Ok(if result.modified > 0 { Some(new_index) } else { None })
            }
            (Some(new_index), Some(delete_index)) if new_index == delete_index => Ok(None),
            (Some(new_index), Some(delete_index)) => {
                self.move_member(owner_id, related_user_id, delete_index, new_index, false, session)
                    .await?;
                Ok(Some(new_index))
            }
            (None, Some(delete_index)) if delete_index == DEFAULT_GROUP_INDEX => Ok(None),
            (None, Some(delete_index)) => {
                self.move_member(owner_id, related_user_id, delete_index, DEFAULT_GROUP_INDEX, false, session)
                    .await?;
                Ok(Some(DEFAULT_GROUP_INDEX))
            }
            (None, None) => Ok(None),
        }
    }

    /// Inserts into `to` before deleting from `from`, so a concurrent
    /// reader never observes the relationship absent from every group
    /// (spec §5, §8 invariant).
    pub async fn move_member(
        &self,
        owner_id: i64,
        related_user_id: i64,
        from: i32,
        to: i32,
        suppress_duplicate: bool,
        session: Option<Session>,
    ) -> Result<()> {
        let member = RelationshipGroupMember {
            owner_id,
            group_index: to,
            related_user_id,
            join_date: now_millis(),
        };
        match self.store.upsert_member(member, session).await {
            Ok(_) => {}
            Err(StoreError::DuplicateKey) if suppress_duplicate => {}
            Err(e) => return Err(GraphError::Store(e.to_string())),
        }

        self.store
            .delete_member_by_id(
                MemberKey {
                    owner_id,
                    group_index: from,
                    related_user_id,
                },
                session,
            )
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        self.versions.bump_best_effort(owner_id, Stream::RelationshipGroups);
        Ok(())
    }

    /// Forbids deleting the default group (spec §8 scenario 6). Not
    /// transactional by design: the operation is idempotent and safe to
    /// re-run after a partial failure.
    pub async fn delete_group_and_move_members(
        &self,
        owner_id: i64,
        delete_index: i32,
        new_index: i32,
    ) -> Result<()> {
        if delete_index == DEFAULT_GROUP_INDEX {
            return Err(GraphError::IllegalArgument(
                "the default group cannot be deleted".to_string(),
            ));
        }
        if delete_index == new_index {
            return Ok(());
        }

        let members = self
            .store
            .find_members(owner_id, delete_index)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        let mirrored: Vec<RelationshipGroupMember> = members
            .into_iter()
            .map(|m| RelationshipGroupMember {
                owner_id,
                group_index: new_index,
                related_user_id: m.related_user_id,
                join_date: m.join_date,
            })
            .collect();

        self.store
            .insert_all_of_same_type(mirrored)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        self.store
            .delete_members_by_owner_and_group(owner_id, delete_index)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        self.store
            .delete_group(owner_id, delete_index)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        self.versions.bump_best_effort(owner_id, Stream::RelationshipGroups);
        self.versions.bump_best_effort(owner_id, Stream::GroupMembership);
        Ok(())
    }

    /// Size-dispatched per spec §4.3: a single key, many keys under one
    /// owner, and many owners (fanned out and merged) are each handled
    /// with the narrowest store call available.
    pub async fn delete_related_users_from_all_groups(
        &self,
        keys: &[(i64, i64)],
        session: Option<Session>,
        bump_versions: bool,
    ) -> Result<DeleteResult> {
        if keys.is_empty() {
            return Ok(DeleteResult::default());
        }

        let mut owners: Vec<i64> = keys.iter().map(|(owner, _)| *owner).collect();
        owners.sort_unstable();
        owners.dedup();

        if owners.len() == 1 {
            let owner_id = owners[0];
            let related_ids: Vec<i64> = keys.iter().map(|(_, related)| *related).collect();
            let result = self
                .store
                .delete_members_by_owner_and_related_users(owner_id, &related_ids, session)
                .await
                .map_err(|e| GraphError::Store(e.to_string()))?;
            if bump_versions {
                self.versions.bump_best_effort(owner_id, Stream::GroupMembership);
            }
            return Ok(result);
        }

        let futures = owners.into_iter().map(|owner_id| {
            let related_ids: Vec<i64> = keys
                .iter()
                .filter(|(owner, _)| *owner == owner_id)
                .map(|(_, related)| *related)
                .collect();
            let store = self.store.clone();
            let versions = self.versions.clone();
            async move {
                let result = store
                    .delete_members_by_owner_and_related_users(owner_id, &related_ids, None)
                    .await;
                if bump_versions {
                    versions.bump_best_effort(owner_id, Stream::GroupMembership);
                }
                result
            }
        });

        let results = futures::future::join_all(futures).await;
        let mut merged = DeleteResult::default();
        for result in results {
            merged = merged.merge(result.map_err(|e| GraphError::Store(e.to_string()))?);
        }
        Ok(merged)
    }

    pub async fn rename_group(&self, owner_id: i64, index: i32, name: String) -> Result<()> {
        let result = self
            .store
            .rename_group(owner_id, index, name)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;
        if result.modified == 0 {
            return Err(GraphError::GroupNotFound);
        }
        self.versions.bump_best_effort(owner_id, Stream::RelationshipGroups);
        Ok(())
    }

    pub async fn batch_update_groups(
        &self,
        keys: &[(i64, i32)],
        update: GroupFieldUpdate,
    ) -> Result<UpdateResult> {
        self.store
            .batch_update_groups(keys, update)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }

    pub async fn list_groups(&self, owner_id: i64) -> Result<Vec<RelationshipGroup>> {
        self.store
            .list_groups(owner_id)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }

    pub async fn count_groups(&self, owner_id: i64) -> Result<u64> {
        self.store
            .count_groups(owner_id)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }

    pub async fn find_members(&self, owner_id: i64, group_index: i32) -> Result<Vec<RelationshipGroupMember>> {
        self.store
            .find_members(owner_id, group_index)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }

    pub async fn find_group_indexes(&self, owner_id: i64, related_user_id: i64) -> Result<Vec<i32>> {
        self.store
            .find_group_indexes(owner_id, related_user_id)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }
}

fn random_group_index() -> i32 {
    rand::thread_rng().gen_range(1..=i32::MAX)
}

fn map_insert_error(err: StoreError, in_session: bool) -> GraphError {
    match err {
        StoreError::DuplicateKey if in_session => {
            GraphError::Fatal("duplicate group index inside transaction".to_string())
        }
        StoreError::DuplicateKey => {
            GraphError::IllegalArgument("group index already in use".to_string())
        }
        other => GraphError::Store(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::InMemoryRelationshipStore;
    use crate::store::memory::InMemoryStore;

    fn service() -> RelationshipGroupService {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let versions = Arc::new(VersionRegistry::new());
        let relationship: Arc<dyn RelationshipStore> = Arc::new(InMemoryRelationshipStore::new());
        RelationshipGroupService::new(
            store,
            versions,
            Box::new(move || relationship.clone()),
        )
    }

    #[tokio::test]
    async fn move_then_remove_leaves_member_in_destination_only() {
        let service = service();
        service
            .create_group(1, Some(3), "a".to_string(), None, None)
            .await
            .unwrap();
        service
            .create_group(1, Some(4), "b".to_string(), None, None)
            .await
            .unwrap();
        service
            .move_member(1, 2, 3, 4, true, None)
            .await
            .unwrap();
        // Re-running with suppress_duplicate is idempotent (spec §8 scenario 5).
        service
            .move_member(1, 2, 3, 4, true, None)
            .await
            .unwrap();

        assert!(service.find_members(1, 3).await.unwrap().is_empty());
        let dest = service.find_members(1, 4).await.unwrap();
        assert_eq!(dest.len(), 1);
        assert_eq!(dest[0].related_user_id, 2);
    }

    #[tokio::test]
    async fn deleting_default_group_is_rejected() {
        let service = service();
        let err = service
            .delete_group_and_move_members(1, DEFAULT_GROUP_INDEX, 5)
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::IllegalArgument("the default group cannot be deleted".to_string()));
    }

    #[tokio::test]
    async fn delete_and_move_mirrors_members_into_destination() {
        let service = service();
        service
            .create_group(1, Some(3), "a".to_string(), None, None)
            .await
            .unwrap();
        service
            .upsert_group_member(1, 2, Some(3), None, None)
            .await
            .unwrap();

        service.delete_group_and_move_members(1, 3, DEFAULT_GROUP_INDEX).await.unwrap();

        assert!(service.find_members(1, 3).await.unwrap().is_empty());
        let dest = service.find_members(1, DEFAULT_GROUP_INDEX).await.unwrap();
        assert_eq!(dest.len(), 1);
        assert!(service.list_groups(1).await.unwrap().iter().all(|g| g.index != 3));
    }
}
