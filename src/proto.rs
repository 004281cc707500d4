//! Protocol-buffer seam (spec §6): a pure converter applying the
//! expiry projector before handing a request to the wire layer.
//!
//! The real protobuf codegen lives outside this core (spec §1, "out of
//! scope"). `FriendRequestProto` is the serde-serializable shape a real
//! `prost`-generated type would mirror.

use serde::{Deserialize, Serialize};

use crate::expiry::project;
use crate::model::FriendRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequestProto {
    pub id: i64,
    pub requester_id: i64,
    pub recipient_id: i64,
    pub content: String,
    pub status: String,
    pub reason: Option<String>,
    pub creation_date: i64,
    pub response_date: Option<i64>,
}

/// Converts `request` to its wire shape, applying the expiry
/// projection first (spec §6: "a pure `toProto(request,
/// expireAfterSeconds)` converter that applies the expiry projector").
pub fn to_proto(request: &FriendRequest, expire_after_seconds: i64) -> FriendRequestProto {
    let projected = project(request, expire_after_seconds);
    FriendRequestProto {
        id: projected.id,
        requester_id: projected.requester_id,
        recipient_id: projected.recipient_id,
        content: projected.content,
        status: projected.status.to_string(),
        reason: projected.reason,
        creation_date: projected.creation_date,
        response_date: projected.response_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestStatus;
    use crate::time::now_millis;

    #[test]
    fn projects_expiry_before_converting() {
        let request = FriendRequest {
            id: 1,
            requester_id: 7,
            recipient_id: 8,
            content: "hi".to_string(),
            status: RequestStatus::Pending,
            reason: None,
            creation_date: now_millis() - 4_000_000,
            response_date: None,
        };
        let proto = to_proto(&request, 3600);
        assert_eq!(proto.status, "EXPIRED");
    }

    #[test]
    fn wire_shape_round_trips_through_json() {
        let request = FriendRequest {
            id: 1,
            requester_id: 7,
            recipient_id: 8,
            content: "hi".to_string(),
            status: RequestStatus::Pending,
            reason: None,
            creation_date: now_millis(),
            response_date: None,
        };
        let proto = to_proto(&request, 3600);
        let encoded = serde_json::to_string(&proto).unwrap();
        let decoded: FriendRequestProto = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, proto);
    }
}
