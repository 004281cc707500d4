//! Black-box tests for the six concrete literal-value scenarios named
//! in the design doc's testable-properties section, exercised through
//! the public API end to end.

use std::sync::Arc;

use umbra_graph::config::{AutoBlockConfig, BlockLevelConfig, ConfigHandle, GraphConfig};
use umbra_graph::friend_request::{CreateRequestInput, HandleAction};
use umbra_graph::groups::RelationshipGroupService;
use umbra_graph::model::{RequestStatus, DEFAULT_GROUP_INDEX};
use umbra_graph::store::memory::InMemoryStore;
use umbra_graph::store::Store;
use umbra_graph::version::VersionRegistry;
use umbra_graph::{AutoBlockManager, FriendRequestService, GraphError, IdGenerator, InMemoryRelationshipStore, RelationshipStore, SnowflakeIdGenerator};

fn friend_request_service(config: ConfigHandle) -> FriendRequestService {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let relationship: Arc<dyn RelationshipStore> = Arc::new(InMemoryRelationshipStore::new());
    let versions = Arc::new(VersionRegistry::new());
    let ids: Arc<dyn IdGenerator> = Arc::new(SnowflakeIdGenerator::new(1));
    FriendRequestService::new(store, relationship, versions, ids, config)
}

fn group_service() -> RelationshipGroupService {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let versions = Arc::new(VersionRegistry::new());
    let relationship: Arc<dyn RelationshipStore> = Arc::new(InMemoryRelationshipStore::new());
    RelationshipGroupService::new(store, versions, Box::new(move || relationship.clone()))
}

/// Scenario 1: recall race. Exactly one of {recall, accept} succeeds;
/// the other sees the same non-pending state it lost the race on.
#[tokio::test]
async fn recall_race_exactly_one_side_wins() {
    let service = friend_request_service(ConfigHandle::default());
    let request = service
        .create_request(
            7,
            8,
            CreateRequestInput {
                id: Some(1000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(request.id, 1000);

    let recall = service.auth_and_recall_request(1000, 7).await;
    let accept = service
        .auth_and_handle_request(1000, 8, HandleAction::Accept, None)
        .await;

    assert!(recall.is_ok());
    assert!(matches!(accept, Err(GraphError::UpdateNonPending(_))));
}

/// Scenario 2: projected expiry. The store row still reads PENDING
/// directly, but any read through the service returns EXPIRED with a
/// projected responseDate.
#[tokio::test]
async fn projected_expiry_leaves_store_row_untouched() {
    let mut config = GraphConfig::default();
    config.friend_request_expire_after_seconds = 3600;
    let service = friend_request_service(ConfigHandle::new(config));

    let now = umbra_graph::time::now_millis();
    service
        .create_request(
            7,
            8,
            CreateRequestInput {
                id: Some(2000),
                creation_date: Some(now - 4000 * 1000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = service.query_requests_with_version(8, false, None).await.unwrap();
    let projected = &result.requests[0];
    assert_eq!(projected.status, RequestStatus::Expired);
    assert_eq!(projected.response_date, Some(projected.creation_date + 3_600_000));

    let direct = service
        .list_requests(None, None, None)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == 2000)
        .unwrap();
    assert_eq!(direct.status, RequestStatus::Pending);
}

/// Scenario 3: resend policy. Declined request blocks a resend while
/// the flag is false, and is permitted once flipped to true.
#[tokio::test]
async fn resend_policy_gated_by_config_flag() {
    let mut config = GraphConfig::default();
    config.allow_send_request_after_declined_or_ignored_or_expired = false;
    let handle = ConfigHandle::new(config);
    let service = friend_request_service(handle.clone());

    let request = service
        .auth_and_create_request(7, 8, Some("hi".to_string()), None)
        .await
        .unwrap();
    service
        .auth_and_handle_request(request.id, 8, HandleAction::Decline, None)
        .await
        .unwrap();

    let err = service
        .auth_and_create_request(7, 8, Some("again".to_string()), None)
        .await
        .unwrap_err();
    assert_eq!(err, GraphError::CreateExistingFriendRequest);

    let mut updated = (*handle.load()).clone();
    updated.allow_send_request_after_declined_or_ignored_or_expired = true;
    handle.store(updated);

    service
        .auth_and_create_request(7, 8, Some("again".to_string()), None)
        .await
        .unwrap();
}

/// Scenario 4: block escalation across two levels, capped at the
/// highest configured level.
#[tokio::test]
async fn block_escalation_stops_at_max_level() {
    let config = AutoBlockConfig {
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
    };
    let manager = AutoBlockManager::new();
    let mut durations = Vec::new();

    for _ in 0..5 {
        manager.try_block("client-x", &config, |_, duration| durations.push(duration));
    }
    assert_eq!(durations, vec![60]);

    for _ in 0..3 {
        manager.try_block("client-x", &config, |_, duration| durations.push(duration));
    }
    assert_eq!(durations, vec![60, 60, 60, 300]);

    for _ in 0..10 {
        manager.try_block("client-x", &config, |_, duration| durations.push(duration));
    }
    assert!(durations.iter().skip(4).all(|&d| d == 300));
}

/// Scenario 5: group move idempotence. Re-running a suppressed move
/// leaves the member in only the destination group.
#[tokio::test]
async fn group_move_is_idempotent_under_suppression() {
    let service = group_service();
    service.create_group(1, Some(3), "a".to_string(), None, None).await.unwrap();
    service.create_group(1, Some(4), "b".to_string(), None, None).await.unwrap();

    service.move_member(1, 2, 3, 4, true, None).await.unwrap();
    service.move_member(1, 2, 3, 4, true, None).await.unwrap();

    assert!(service.find_members(1, 3).await.unwrap().is_empty());
    let dest = service.find_members(1, 4).await.unwrap();
    assert_eq!(dest.len(), 1);
    assert_eq!(dest[0].related_user_id, 2);
}

/// Scenario 6: deleting the default group is always rejected.
#[tokio::test]
async fn deleting_default_group_is_illegal_argument() {
    let service = group_service();
    let err = service
        .delete_group_and_move_members(1, DEFAULT_GROUP_INDEX, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::IllegalArgument(_)));
}
