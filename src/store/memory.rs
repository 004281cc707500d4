//! In-memory reference [`Store`] implementation.
//!
//! Grounded on `umbra-relay`'s `DashMap`-backed concurrent state
//! (`state.rs`, `bridge/store.rs`): one `DashMap` per collection, no
//! external persistence. Transactions are emulated with a single
//! `tokio::sync::Mutex` guarding the whole store for the duration of
//! the transaction body — sufficient to give the ACCEPT path the
//! all-or-nothing semantics spec §5 requires without a real
//! multi-document transaction engine.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::model::{FriendRequest, MemberKey, RelationshipGroup, RelationshipGroupMember, RequestStatus};

use super::{
    DeleteResult, GroupFieldUpdate, Projection, RequestFieldUpdate, Session, Store, StoreError,
    StoreResult, TxnFuture, TxnOutcome, UpdateResult,
};

/// Single-process, non-persistent [`Store`]. Useful as the default for
/// tests and as a template for a real document-store adapter.
pub struct InMemoryStore {
    requests: DashMap<i64, FriendRequest>,
    groups: DashMap<(i64, i32), RelationshipGroup>,
    members: DashMap<(i64, i32, i64), RelationshipGroupMember>,
    txn_lock: tokio::sync::Mutex<()>,
    next_session: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            requests: DashMap::new(),
            groups: DashMap::new(),
            members: DashMap::new(),
            txn_lock: tokio::sync::Mutex::new(()),
            next_session: AtomicU64::new(1),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn project(&self, request: &FriendRequest, _projection: Projection) -> FriendRequest {
        // The in-memory store always holds the complete row; projection
        // only matters for a document-store adapter that would otherwise
        // transfer unused fields over the wire.
        request.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(&self, request: FriendRequest) -> StoreResult<()> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    async fn find_by_id(
        &self,
        id: i64,
        projection: Projection,
        _session: Option<Session>,
    ) -> StoreResult<Option<FriendRequest>> {
        Ok(self.requests.get(&id).map(|r| self.project(&r, projection)))
    }

    async fn update_status_if_pending(
        &self,
        id: i64,
        new_status: RequestStatus,
        reason: Option<String>,
        response_date: Option<i64>,
        _session: Option<Session>,
    ) -> StoreResult<UpdateResult> {
        let Some(mut entry) = self.requests.get_mut(&id) else {
            return Ok(UpdateResult::default());
        };
        if entry.status != RequestStatus::Pending {
            return Ok(UpdateResult { matched: 1, modified: 0 });
        }
        entry.status = new_status;
        if reason.is_some() {
            entry.reason = reason;
        }
        entry.response_date = response_date;
        Ok(UpdateResult { matched: 1, modified: 1 })
    }

    async fn batch_update(
        &self,
        ids: &[i64],
        update: RequestFieldUpdate,
    ) -> StoreResult<UpdateResult> {
        let mut result = UpdateResult::default();
        for id in ids {
            if let Some(mut entry) = self.requests.get_mut(id) {
                result.matched += 1;
                if let Some(status) = update.status {
                    entry.status = status;
                }
                if let Some(reason) = update.reason.clone() {
                    entry.reason = reason;
                }
                if let Some(response_date) = update.response_date {
                    entry.response_date = response_date;
                }
                result.modified += 1;
            }
        }
        Ok(result)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> StoreResult<DeleteResult> {
        let mut result = DeleteResult::default();
        for id in ids {
            result.matched_count += 1;
            if self.requests.remove(id).is_some() {
                result.deleted_count += 1;
            }
        }
        Ok(result)
    }

    async fn delete_expired(&self, threshold: i64) -> StoreResult<DeleteResult> {
        let stale: Vec<i64> = self
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending && r.creation_date < threshold)
            .map(|r| r.id)
            .collect();
        self.delete_by_ids(&stale).await
    }

    async fn query_requests(
        &self,
        user_id: i64,
        by_requester: bool,
    ) -> StoreResult<Vec<FriendRequest>> {
        Ok(self
            .requests
            .iter()
            .filter(|r| {
                if by_requester {
                    r.requester_id == user_id
                } else {
                    r.recipient_id == user_id
                }
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn list_requests(
        &self,
        requester_id: Option<i64>,
        recipient_id: Option<i64>,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<FriendRequest>> {
        Ok(self
            .requests
            .iter()
            .filter(|r| {
                requester_id.map_or(true, |id| r.requester_id == id)
                    && recipient_id.map_or(true, |id| r.recipient_id == id)
                    && status.map_or(true, |s| r.status == s)
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn count_requests(
        &self,
        requester_id: Option<i64>,
        recipient_id: Option<i64>,
        status: Option<RequestStatus>,
    ) -> StoreResult<u64> {
        Ok(self.list_requests(requester_id, recipient_id, status).await?.len() as u64)
    }

    async fn in_transaction(
        &self,
        body: Box<dyn FnOnce(Session) -> TxnFuture + Send>,
    ) -> StoreResult<TxnOutcome> {
        let _guard = self.txn_lock.lock().await;
        let session = Session {
            id: self.next_session.fetch_add(1, Ordering::Relaxed),
        };
        body(session).await
    }

    async fn insert_group(
        &self,
        group: RelationshipGroup,
        _session: Option<Session>,
    ) -> StoreResult<()> {
        let key = (group.owner_id, group.index);
        match self.groups.entry(key) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey),
            Entry::Vacant(slot) => {
                slot.insert(group);
                Ok(())
            }
        }
    }

    async fn find_group(&self, owner_id: i64, index: i32) -> StoreResult<Option<RelationshipGroup>> {
        Ok(self.groups.get(&(owner_id, index)).map(|g| g.clone()))
    }

    async fn delete_group(&self, owner_id: i64, index: i32) -> StoreResult<DeleteResult> {
        let removed = self.groups.remove(&(owner_id, index)).is_some();
        Ok(DeleteResult {
            matched_count: 1,
            deleted_count: if removed { 1 } else { 0 },
        })
    }

    async fn rename_group(&self, owner_id: i64, index: i32, name: String) -> StoreResult<UpdateResult> {
        let Some(mut entry) = self.groups.get_mut(&(owner_id, index)) else {
            return Ok(UpdateResult::default());
        };
        entry.name = name;
        Ok(UpdateResult { matched: 1, modified: 1 })
    }

    async fn batch_update_groups(
        &self,
        keys: &[(i64, i32)],
        update: GroupFieldUpdate,
    ) -> StoreResult<UpdateResult> {
        let mut result = UpdateResult::default();
        for key in keys {
            if let Some(mut entry) = self.groups.get_mut(key) {
                result.matched += 1;
                if let Some(name) = update.name.clone() {
                    entry.name = name;
                }
                if let Some(creation_date) = update.creation_date {
                    entry.creation_date = creation_date;
                }
                result.modified += 1;
            }
        }
        Ok(result)
    }

    async fn list_groups(&self, owner_id: i64) -> StoreResult<Vec<RelationshipGroup>> {
        Ok(self
            .groups
            .iter()
            .filter(|g| g.owner_id == owner_id)
            .map(|g| g.clone())
            .collect())
    }

    async fn count_groups(&self, owner_id: i64) -> StoreResult<u64> {
        Ok(self.list_groups(owner_id).await?.len() as u64)
    }

    async fn upsert_member(
        &self,
        member: RelationshipGroupMember,
        _session: Option<Session>,
    ) -> StoreResult<UpdateResult> {
        let key = (member.owner_id, member.group_index, member.related_user_id);
        // The triple already identifies the membership row, so a key
        // that's already present is a true no-op: leave its join_date
        // alone and report nothing modified.
        if self.members.contains_key(&key) {
            return Ok(UpdateResult { matched: 1, modified: 0 });
        }
        self.members.insert(key, member);
        Ok(UpdateResult { matched: 0, modified: 1 })
    }

    async fn delete_member_by_id(&self, key: MemberKey, _session: Option<Session>) -> StoreResult<DeleteResult> {
        let removed = self
            .members
            .remove(&(key.owner_id, key.group_index, key.related_user_id))
            .is_some();
        Ok(DeleteResult {
            matched_count: 1,
            deleted_count: if removed { 1 } else { 0 },
        })
    }

    async fn delete_members_by_owner_and_group(
        &self,
        owner_id: i64,
        group_index: i32,
    ) -> StoreResult<DeleteResult> {
        let keys: Vec<_> = self
            .members
            .iter()
            .filter(|m| m.owner_id == owner_id && m.group_index == group_index)
            .map(|m| (m.owner_id, m.group_index, m.related_user_id))
            .collect();
        let mut result = DeleteResult::default();
        for key in keys {
            result.matched_count += 1;
            if self.members.remove(&key).is_some() {
                result.deleted_count += 1;
            }
        }
        Ok(result)
    }

    async fn delete_members_by_owner_and_related_users(
        &self,
        owner_id: i64,
        related_user_ids: &[i64],
        _session: Option<Session>,
    ) -> StoreResult<DeleteResult> {
        let keys: Vec<_> = self
            .members
            .iter()
            .filter(|m| m.owner_id == owner_id && related_user_ids.contains(&m.related_user_id))
            .map(|m| (m.owner_id, m.group_index, m.related_user_id))
            .collect();
        let mut result = DeleteResult::default();
        for key in keys {
            result.matched_count += 1;
            if self.members.remove(&key).is_some() {
                result.deleted_count += 1;
            }
        }
        Ok(result)
    }

    async fn find_members(
        &self,
        owner_id: i64,
        group_index: i32,
    ) -> StoreResult<Vec<RelationshipGroupMember>> {
        Ok(self
            .members
            .iter()
            .filter(|m| m.owner_id == owner_id && m.group_index == group_index)
            .map(|m| m.clone())
            .collect())
    }

    async fn find_group_indexes(&self, owner_id: i64, related_user_id: i64) -> StoreResult<Vec<i32>> {
        Ok(self
            .members
            .iter()
            .filter(|m| m.owner_id == owner_id && m.related_user_id == related_user_id)
            .map(|m| m.group_index)
            .collect())
    }

    async fn insert_all_of_same_type(
        &self,
        members: Vec<RelationshipGroupMember>,
    ) -> StoreResult<UpdateResult> {
        let mut result = UpdateResult::default();
        for member in members {
            let key = (member.owner_id, member.group_index, member.related_user_id);
            result.matched += 1;
            if !self.members.contains_key(&key) {
                self.members.insert(key, member);
                result.modified += 1;
            }
            // Duplicate-key is swallowed here: bulk member moves are
            // idempotent by design (spec §7).
        }
        Ok(result)
    }
}
