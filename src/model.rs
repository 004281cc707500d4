//! Core data model (spec §3).

use serde::{Deserialize, Serialize};

/// The index of the group every user gets for free and can never delete.
pub const DEFAULT_GROUP_INDEX: i32 = 0;

/// Lifecycle state of a friend request. `Expired` is never stored — it
/// only ever appears as the output of the expiry projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Ignored,
    Canceled,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::Declined => "DECLINED",
            RequestStatus::Ignored => "IGNORED",
            RequestStatus::Canceled => "CANCELED",
            RequestStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// A friend request row (spec §3, `FriendRequest`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
    pub requester_id: i64,
    pub recipient_id: i64,
    pub content: String,
    pub status: RequestStatus,
    pub reason: Option<String>,
    pub creation_date: i64,
    pub response_date: Option<i64>,
}

/// A named bucket of confirmed relationships owned by one user (spec
/// §3, `RelationshipGroup`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGroup {
    pub owner_id: i64,
    pub index: i32,
    pub name: String,
    pub creation_date: i64,
}

/// Membership of `related_user_id` in one of `owner_id`'s groups (spec
/// §3, `RelationshipGroupMember`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGroupMember {
    pub owner_id: i64,
    pub group_index: i32,
    pub related_user_id: i64,
    pub join_date: i64,
}

/// Identifies one row for [`RelationshipGroupMember`] batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub owner_id: i64,
    pub group_index: i32,
    pub related_user_id: i64,
}
