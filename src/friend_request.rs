//! Friend-Request Service (C4): request lifecycle, authorization, and
//! projection-time expiry (spec §4.1).

use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigHandle;
use crate::error::{GraphError, Result};
use crate::expiry::{default_response_date, is_expired, project};
use crate::ids::{IdGenerator, ServiceType};
use crate::model::{FriendRequest, RequestStatus};
use crate::relationship::RelationshipStore;
use crate::scheduler::{LeaderCheck, ScheduledJobHandle, TaskScheduler};
use crate::store::{Projection, RequestFieldUpdate, Store, StoreError, TxnFuture};
use crate::time::{clamp_to_now, now_millis};
use crate::version::{Stream, VersionRegistry};

/// Fixed retry policy for the ACCEPT transaction's transient-error path
/// (spec §5: "bounded attempts, bounded backoff").
const TRANSACTION_MAX_ATTEMPTS: u32 = 3;
const TRANSACTION_BACKOFF_BASE: Duration = Duration::from_millis(20);

/// Optional admin-path overrides for [`FriendRequestService::create_request`].
#[derive(Debug, Clone, Default)]
pub struct CreateRequestInput {
    pub id: Option<i64>,
    pub content: String,
    pub status: Option<RequestStatus>,
    pub creation_date: Option<i64>,
    pub response_date: Option<i64>,
    pub reason: Option<String>,
}

/// An action a recipient can take on a pending request (spec §4.1,
/// `authAndHandleRequest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleAction {
    Accept,
    Ignore,
    Decline,
}

/// Result of a successful ACCEPT: the updated request plus the group
/// index each side's new relationship landed in.
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub request: FriendRequest,
    pub requester_side_index: i32,
    pub recipient_side_index: i32,
}

/// A version-stamped batch of requests for incremental sync (spec
/// §4.1, `queryRequestsWithVersion`).
#[derive(Debug, Clone)]
pub struct VersionedRequests {
    pub requests: Vec<FriendRequest>,
    pub server_version: i64,
}

#[derive(Clone)]
pub struct FriendRequestService {
    store: Arc<dyn Store>,
    relationship: Arc<dyn RelationshipStore>,
    versions: Arc<VersionRegistry>,
    ids: Arc<dyn IdGenerator>,
    config: ConfigHandle,
}

impl FriendRequestService {
    pub fn new(
        store: Arc<dyn Store>,
        relationship: Arc<dyn RelationshipStore>,
        versions: Arc<VersionRegistry>,
        ids: Arc<dyn IdGenerator>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            store,
            relationship,
            versions,
            ids,
            config,
        }
    }

    fn validate_bounds(&self, content: &str, reason: Option<&str>) -> Result<()> {
        let config = self.config.load();
        if config.max_content_length > 0 && content.len() as i64 > config.max_content_length {
            return Err(GraphError::IllegalArgument("content exceeds maxContentLength".to_string()));
        }
        if let Some(reason) = reason {
            if config.max_response_reason_length > 0
                && reason.len() as i64 > config.max_response_reason_length
            {
                return Err(GraphError::IllegalArgument(
                    "reason exceeds maxResponseReasonLength".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Admin path: create a request with arbitrary caller-supplied
    /// fields (spec §4.1, `createRequest`).
    pub async fn create_request(
        &self,
        requester_id: i64,
        recipient_id: i64,
        input: CreateRequestInput,
    ) -> Result<FriendRequest> {
        if requester_id == recipient_id {
            return Err(GraphError::IllegalArgument("requesterId must differ from recipientId".to_string()));
        }
        self.validate_bounds(&input.content, input.reason.as_deref())?;

        let id = input.id.unwrap_or_else(|| self.ids.next_large_gap_id(ServiceType::FriendRequest));
        let creation_date = match input.creation_date {
            Some(supplied) => clamp_to_now(supplied),
            None => now_millis(),
        };
        let status = input.status.unwrap_or(RequestStatus::Pending);
        let expire_after = self.config.load().friend_request_expire_after_seconds;
        let response_date = match input.response_date {
            Some(supplied) => Some(clamp_to_now(supplied)),
            None => default_response_date(status, creation_date, expire_after),
        };

        let request = FriendRequest {
            id,
            requester_id,
            recipient_id,
            content: input.content,
            status,
            reason: input.reason,
            creation_date,
            response_date,
        };

        self.store
            .insert(request.clone())
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        self.versions.bump_best_effort(recipient_id, Stream::ReceivedRequests);
        self.versions.bump_best_effort(requester_id, Stream::SentRequests);

        Ok(request)
    }

    /// User path: validates policy before delegating to [`Self::create_request`]
    /// (spec §4.1, `authAndCreateRequest`).
    pub async fn auth_and_create_request(
        &self,
        requester_id: i64,
        recipient_id: i64,
        content: Option<String>,
        creation_date: Option<i64>,
    ) -> Result<FriendRequest> {
        if self
            .relationship
            .is_blocked(recipient_id, requester_id)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?
        {
            return Err(GraphError::BlockedUserToSendFriendRequest);
        }

        let expire_after = self.config.load().friend_request_expire_after_seconds;
        let allow_after_terminal = self
            .config
            .load()
            .allow_send_request_after_declined_or_ignored_or_expired;

        let existing = self.store.query_requests(requester_id, true).await.map_err(|e| GraphError::Store(e.to_string()))?;
        let conflicts = existing.into_iter().filter(|r| r.recipient_id == recipient_id).any(|r| {
            let projected = project(&r, expire_after);
            if allow_after_terminal {
                projected.status == RequestStatus::Pending
            } else {
                matches!(
                    projected.status,
                    RequestStatus::Pending | RequestStatus::Declined | RequestStatus::Ignored | RequestStatus::Expired
                )
            }
        });
        if conflicts {
            return Err(GraphError::CreateExistingFriendRequest);
        }

        self.create_request(
            requester_id,
            recipient_id,
            CreateRequestInput {
                content: content.unwrap_or_default(),
                creation_date,
                ..Default::default()
            },
        )
        .await
    }

    /// Returns `NOT_SENDER_TO_RECALL` both when the request doesn't
    /// exist and when the caller isn't its sender, so existence is
    /// never leaked (spec §7).
    pub async fn auth_and_recall_request(&self, request_id: i64, caller_id: i64) -> Result<FriendRequest> {
        if !self.config.load().allow_recall_pending_friend_request_by_sender {
            return Err(GraphError::RecallingDisabled);
        }

        let stored = self
            .store
            .find_by_id(request_id, Projection::PartyStatusAndCreation, None)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?
            .ok_or(GraphError::NotSenderToRecall)?;

        if stored.requester_id != caller_id {
            return Err(GraphError::NotSenderToRecall);
        }

        if stored.status != RequestStatus::Pending {
            return Err(GraphError::RecallNonPending(stored.status.to_string()));
        }

        let expire_after = self.config.load().friend_request_expire_after_seconds;
        if is_expired(&stored, expire_after) {
            return Err(GraphError::RecallNonPending(RequestStatus::Expired.to_string()));
        }

        let result = self
            .store
            .update_status_if_pending(request_id, RequestStatus::Canceled, None, Some(now_millis()), None)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        if result.modified == 0 {
            return Err(GraphError::RecallNonPending(RequestStatus::Pending.to_string()));
        }

        self.versions.bump_best_effort(stored.requester_id, Stream::SentRequests);
        self.versions.bump_best_effort(stored.recipient_id, Stream::ReceivedRequests);

        Ok(FriendRequest {
            status: RequestStatus::Canceled,
            response_date: Some(now_millis()),
            ..stored
        })
    }

    /// Authorization mirror of [`Self::auth_and_recall_request`], keyed
    /// on `recipientId` (spec §4.1, `authAndHandleRequest`).
    pub async fn auth_and_handle_request(
        &self,
        request_id: i64,
        caller_id: i64,
        action: HandleAction,
        reason: Option<String>,
    ) -> Result<FriendRequest> {
        self.validate_bounds("", reason.as_deref())?;

        let stored = self
            .store
            .find_by_id(request_id, Projection::PartyStatusAndCreation, None)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?
            .ok_or(GraphError::NotRecipientToUpdate)?;

        if stored.recipient_id != caller_id {
            return Err(GraphError::NotRecipientToUpdate);
        }
        if stored.status != RequestStatus::Pending {
            return Err(GraphError::UpdateNonPending(stored.status.to_string()));
        }
        let expire_after = self.config.load().friend_request_expire_after_seconds;
        if is_expired(&stored, expire_after) {
            return Err(GraphError::UpdateNonPending(RequestStatus::Expired.to_string()));
        }

        match action {
            HandleAction::Decline => self.update_pending_status(request_id, RequestStatus::Declined, reason).await,
            HandleAction::Ignore => self.update_pending_status(request_id, RequestStatus::Ignored, reason).await,
            HandleAction::Accept => {
                let outcome = self.accept_with_retry(request_id, stored.requester_id, stored.recipient_id).await?;
                Ok(outcome.request)
            }
        }
    }

    /// Runs the CAS + `friendTwoUsers` pair inside one store
    /// transaction, retrying on `TRANSIENT_TRANSACTION` per a fixed
    /// backoff (spec §5, §4.1 ACCEPT path).
    pub async fn accept_with_retry(
        &self,
        request_id: i64,
        requester_id: i64,
        recipient_id: i64,
    ) -> Result<AcceptOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let store = self.store.clone();
            let relationship = self.relationship.clone();

            let txn_result = store
                .in_transaction(Box::new(move |session| {
                    let fut: TxnFuture = Box::pin(async move {
                        let cas = store
                            .update_status_if_pending(
                                request_id,
                                RequestStatus::Accepted,
                                None,
                                Some(now_millis()),
                                Some(session),
                            )
                            .await?;
                        if cas.modified == 0 {
                            return Ok(Box::new(None::<(i32, i32)>) as Box<dyn std::any::Any + Send>);
                        }

                        let indexes = relationship
                            .friend_two_users(requester_id, recipient_id, session)
                            .await?;

                        Ok(Box::new(Some((indexes.requester_side_index, indexes.recipient_side_index)))
                            as Box<dyn std::any::Any + Send>)
                    });
                    fut
                }))
                .await;

            match txn_result {
                Ok(outcome) => {
                    let indexes = *outcome
                        .downcast::<Option<(i32, i32)>>()
                        .map_err(|_| GraphError::Fatal("transaction returned unexpected type".to_string()))?;
                    let Some((requester_side_index, recipient_side_index)) = indexes else {
                        return Err(GraphError::UpdateNonPending(RequestStatus::Pending.to_string()));
                    };

                    self.versions.bump_best_effort(requester_id, Stream::SentRequests);
                    self.versions.bump_best_effort(recipient_id, Stream::ReceivedRequests);

                    let request = self
                        .store
                        .find_by_id(request_id, Projection::PartyStatusAndCreation, None)
                        .await
                        .map_err(|e| GraphError::Store(e.to_string()))?
                        .ok_or_else(|| GraphError::Fatal("request vanished after commit".to_string()))?;

                    return Ok(AcceptOutcome {
                        request,
                        requester_side_index,
                        recipient_side_index,
                    });
                }
                Err(StoreError::Transient) if attempt < TRANSACTION_MAX_ATTEMPTS => {
                    tracing::warn!(request_id, attempt, "Transient transaction error on ACCEPT, retrying");
                    tokio::time::sleep(TRANSACTION_BACKOFF_BASE * attempt).await;
                    continue;
                }
                Err(StoreError::Transient) => {
                    return Err(GraphError::TransactionRetriesExhausted);
                }
                Err(e) => return Err(GraphError::Store(e.to_string())),
            }
        }
    }

    /// Internal CAS helper shared by DECLINE/IGNORE. Rejects
    /// `PENDING` as a target status (spec §4.1).
    async fn update_pending_status(
        &self,
        request_id: i64,
        new_status: RequestStatus,
        reason: Option<String>,
    ) -> Result<FriendRequest> {
        if new_status == RequestStatus::Pending {
            return Err(GraphError::IllegalArgument("cannot transition to PENDING".to_string()));
        }

        let result = self
            .store
            .update_status_if_pending(request_id, new_status, reason, Some(now_millis()), None)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;

        if result.modified == 0 {
            return Err(GraphError::UpdateNonPending(RequestStatus::Pending.to_string()));
        }

        let stored = self
            .store
            .find_by_id(request_id, Projection::PartyStatusAndCreation, None)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?
            .ok_or_else(|| GraphError::Fatal("request vanished after CAS".to_string()))?;

        self.versions.bump_best_effort(stored.recipient_id, Stream::ReceivedRequests);

        Ok(stored)
    }

    /// Incremental-sync read path (spec §4.1, `queryRequestsWithVersion`).
    pub async fn query_requests_with_version(
        &self,
        user_id: i64,
        are_sent_by_user: bool,
        last_updated_date: Option<i64>,
    ) -> Result<VersionedRequests> {
        let stream = if are_sent_by_user {
            Stream::SentRequests
        } else {
            Stream::ReceivedRequests
        };
        let server_version = self.versions.get(user_id, stream);

        if let Some(last_updated_date) = last_updated_date {
            if last_updated_date >= server_version {
                return Err(GraphError::AlreadyUpToDate);
            }
        }

        let expire_after = self.config.load().friend_request_expire_after_seconds;
        let requests: Vec<FriendRequest> = self
            .store
            .query_requests(user_id, are_sent_by_user)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?
            .iter()
            .map(|r| project(r, expire_after))
            .collect();

        if requests.is_empty() {
            return Err(GraphError::NoContent);
        }

        Ok(VersionedRequests {
            requests,
            server_version,
        })
    }

    pub async fn list_requests(
        &self,
        requester_id: Option<i64>,
        recipient_id: Option<i64>,
        status: Option<RequestStatus>,
    ) -> Result<Vec<FriendRequest>> {
        self.store
            .list_requests(requester_id, recipient_id, status)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }

    pub async fn count_requests(
        &self,
        requester_id: Option<i64>,
        recipient_id: Option<i64>,
        status: Option<RequestStatus>,
    ) -> Result<u64> {
        self.store
            .count_requests(requester_id, recipient_id, status)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))
    }

    pub async fn batch_update(&self, ids: &[i64], update: RequestFieldUpdate) -> Result<u64> {
        let result = self
            .store
            .batch_update(ids, update)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;
        Ok(result.modified)
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        let result = self
            .store
            .delete_by_ids(ids)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;
        Ok(result.deleted_count)
    }

    /// Driven by the optional leader-gated cron (spec §9): deletes
    /// rows that have been PENDING past the expiry window. Correctness
    /// never depends on this running.
    pub async fn delete_expired_requests(&self) -> Result<u64> {
        let expire_after = self.config.load().friend_request_expire_after_seconds;
        if expire_after <= 0 {
            return Ok(0);
        }
        let threshold = now_millis() - expire_after * 1000;
        let result = self
            .store
            .delete_expired(threshold)
            .await
            .map_err(|e| GraphError::Store(e.to_string()))?;
        Ok(result.deleted_count)
    }

    /// Registers the expired-request cleanup job against `scheduler` on
    /// `expiredUserFriendRequestsCleanupCron` (spec §6: "the scheduler
    /// invokes `fn` only on the cluster leader when
    /// `deleteExpiredRequestsWhenCronTriggered` is true and `expireAfter
    /// > 0`"). Both conditions are hot-reloadable, so the job re-checks
    /// them on every firing rather than once at registration time.
    pub fn schedule_expiry_cleanup(
        &self,
        scheduler: &dyn TaskScheduler,
        leader: Arc<dyn LeaderCheck>,
    ) -> std::result::Result<ScheduledJobHandle, cron::error::Error> {
        let cron_expr = self.config.load().expired_user_friend_requests_cleanup_cron.clone();
        let service = self.clone();

        scheduler.reschedule(
            "friend-request-expiry-cleanup",
            &cron_expr,
            leader,
            Arc::new(move || {
                let service = service.clone();
                Box::pin(async move {
                    let config = service.config.load();
                    if !config.delete_expired_requests_when_cron_triggered
                        || config.friend_request_expire_after_seconds <= 0
                    {
                        tracing::debug!("Skipping expired-request cleanup: disabled by config");
                        return;
                    }
                    match service.delete_expired_requests().await {
                        Ok(deleted) => tracing::debug!(deleted, "Expired-request cleanup swept rows"),
                        Err(err) => tracing::warn!(error = %err, "Expired-request cleanup failed"),
                    }
                })
            }),
        )
    }
}
