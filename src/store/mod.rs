//! The store seam (spec §6, "To the Store (C2)").
//!
//! The persistent document store itself is an external collaborator.
//! This module defines the operations this core requires of it and
//! ships an in-memory reference implementation ([`memory::InMemoryStore`])
//! grounded on `umbra-relay`'s `DashMap`-backed `BridgeStore`/`RelayState`.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{FriendRequest, MemberKey, RelationshipGroup, RelationshipGroupMember, RequestStatus};

/// Which fields a `findById` caller actually needs, mirroring the three
/// shapes named in spec §6. The in-memory store always has the full
/// row in hand, so it ignores this and returns everything; a real
/// document-store implementation would use it to limit the wire
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// `{requesterId, recipientId, status}`
    PartyAndStatus,
    /// `{requesterId, recipientId, status, creationDate}`
    PartyStatusAndCreation,
    /// `{recipientId}`
    RecipientOnly,
}

/// Outcome of a conditional update: how many rows matched the filter,
/// and of those, how many were actually modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Outcome of a delete: rows that matched the filter vs. rows actually
/// removed (bulk operations tolerating partial pre-removal report both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub matched_count: u64,
    pub deleted_count: u64,
}

impl DeleteResult {
    pub fn merge(self, other: DeleteResult) -> DeleteResult {
        DeleteResult {
            matched_count: self.matched_count + other.matched_count,
            deleted_count: self.deleted_count + other.deleted_count,
        }
    }
}

/// A set of optional field updates for the friend-request batch-update
/// admin path (spec §4.1, "batched update of arbitrary fields").
#[derive(Debug, Clone, Default)]
pub struct RequestFieldUpdate {
    pub status: Option<RequestStatus>,
    pub reason: Option<Option<String>>,
    pub response_date: Option<Option<i64>>,
}

/// A set of optional field updates for the relationship-group admin
/// batch-update path (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct GroupFieldUpdate {
    pub name: Option<String>,
    pub creation_date: Option<i64>,
}

/// Store-level failures, distinguished so callers can retry or recover
/// instead of surfacing a generic error (spec §6: "all constraint
/// violations surface as `DuplicateKeyException`, a distinct, catchable
/// category").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate key")]
    DuplicateKey,
    #[error("transient transaction error")]
    Transient,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opaque handle threading a single store-level transaction through a
/// sequence of mutations. Obtained only via [`Store::in_transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub(crate) id: u64,
}

/// Operations this core requires of the persistent document store
/// (spec §6). Every operation is async; every call is a suspension
/// point (spec §5).
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert(&self, request: FriendRequest) -> StoreResult<()>;

    async fn find_by_id(
        &self,
        id: i64,
        projection: Projection,
        session: Option<Session>,
    ) -> StoreResult<Option<FriendRequest>>;

    async fn update_status_if_pending(
        &self,
        id: i64,
        new_status: RequestStatus,
        reason: Option<String>,
        response_date: Option<i64>,
        session: Option<Session>,
    ) -> StoreResult<UpdateResult>;

    async fn batch_update(
        &self,
        ids: &[i64],
        update: RequestFieldUpdate,
    ) -> StoreResult<UpdateResult>;

    async fn delete_by_ids(&self, ids: &[i64]) -> StoreResult<DeleteResult>;

    /// Deletes rows whose `field` (creation date) is older than
    /// `threshold` and whose stored status is still PENDING — the
    /// optional housekeeping sweep (spec §9).
    async fn delete_expired(&self, threshold: i64) -> StoreResult<DeleteResult>;

    async fn query_requests(
        &self,
        user_id: i64,
        by_requester: bool,
    ) -> StoreResult<Vec<FriendRequest>>;

    async fn list_requests(
        &self,
        requester_id: Option<i64>,
        recipient_id: Option<i64>,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<FriendRequest>>;

    async fn count_requests(
        &self,
        requester_id: Option<i64>,
        recipient_id: Option<i64>,
        status: Option<RequestStatus>,
    ) -> StoreResult<u64>;

    /// Runs `body` as a single store-level transaction. A body that
    /// returns `Err(StoreError::Transient)` is the caller's cue to
    /// retry per its own backoff policy (spec §5); this method itself
    /// never retries.
    async fn in_transaction(
        &self,
        body: Box<dyn FnOnce(Session) -> TxnFuture + Send>,
    ) -> StoreResult<TxnOutcome>;

    async fn insert_group(
        &self,
        group: RelationshipGroup,
        session: Option<Session>,
    ) -> StoreResult<()>;

    async fn find_group(&self, owner_id: i64, index: i32) -> StoreResult<Option<RelationshipGroup>>;

    async fn delete_group(&self, owner_id: i64, index: i32) -> StoreResult<DeleteResult>;

    async fn rename_group(&self, owner_id: i64, index: i32, name: String) -> StoreResult<UpdateResult>;

    async fn batch_update_groups(
        &self,
        keys: &[(i64, i32)],
        update: GroupFieldUpdate,
    ) -> StoreResult<UpdateResult>;

    async fn list_groups(&self, owner_id: i64) -> StoreResult<Vec<RelationshipGroup>>;

    async fn count_groups(&self, owner_id: i64) -> StoreResult<u64>;

    async fn upsert_member(
        &self,
        member: RelationshipGroupMember,
        session: Option<Session>,
    ) -> StoreResult<UpdateResult>;

    async fn delete_member_by_id(&self, key: MemberKey, session: Option<Session>) -> StoreResult<DeleteResult>;

    async fn delete_members_by_owner_and_group(
        &self,
        owner_id: i64,
        group_index: i32,
    ) -> StoreResult<DeleteResult>;

    async fn delete_members_by_owner_and_related_users(
        &self,
        owner_id: i64,
        related_user_ids: &[i64],
        session: Option<Session>,
    ) -> StoreResult<DeleteResult>;

    async fn find_members(
        &self,
        owner_id: i64,
        group_index: i32,
    ) -> StoreResult<Vec<RelationshipGroupMember>>;

    async fn find_group_indexes(&self, owner_id: i64, related_user_id: i64) -> StoreResult<Vec<i32>>;

    /// Bulk insert tolerating duplicate-key partial success (spec §6:
    /// "tolerating duplicate-key partial success").
    async fn insert_all_of_same_type(
        &self,
        members: Vec<RelationshipGroupMember>,
    ) -> StoreResult<UpdateResult>;
}

/// Boxed future returned by an `in_transaction` body.
pub type TxnFuture = std::pin::Pin<Box<dyn std::future::Future<Output = StoreResult<TxnOutcome>> + Send>>;

/// Whatever a transaction body wants to hand back to its caller,
/// type-erased since [`Store`] must stay object-safe.
pub type TxnOutcome = Box<dyn std::any::Any + Send>;
