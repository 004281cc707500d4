//! Expiry Projector (C6): a pure read-time projection, never a store
//! mutation (spec §4.2).

use crate::model::{FriendRequest, RequestStatus};
use crate::time::now_millis;

/// If `expire_after_seconds <= 0`, projection is disabled and `request`
/// is returned unchanged.
///
/// Otherwise, a stored `PENDING` request whose age exceeds the window
/// is returned with `status = EXPIRED` and `responseDate` projected to
/// `creationDate + expireAfter`. The store itself is never touched.
pub fn project(request: &FriendRequest, expire_after_seconds: i64) -> FriendRequest {
    if expire_after_seconds <= 0 || request.status != RequestStatus::Pending {
        return request.clone();
    }

    let expire_after_millis = expire_after_seconds * 1000;
    let age = now_millis() - request.creation_date;
    if age > expire_after_millis {
        let mut projected = request.clone();
        projected.status = RequestStatus::Expired;
        projected.response_date = Some(request.creation_date + expire_after_millis);
        projected
    } else {
        request.clone()
    }
}

/// `true` iff `project` would return `EXPIRED` for this request — used
/// by callers that only need the verdict (e.g. the resend-policy
/// check in spec §4.1 step 2).
pub fn is_expired(request: &FriendRequest, expire_after_seconds: i64) -> bool {
    project(request, expire_after_seconds).status == RequestStatus::Expired
}

/// The `responseDate` a newly-created, non-PENDING admin row should
/// default to (spec §4.2): `now` for the four terminal non-expiry
/// statuses, `creationDate + expireAfter` for EXPIRED, and `None` for
/// PENDING unless explicitly supplied.
pub fn default_response_date(
    status: RequestStatus,
    creation_date: i64,
    expire_after_seconds: i64,
) -> Option<i64> {
    match status {
        RequestStatus::Pending => None,
        RequestStatus::Expired => Some(creation_date + expire_after_seconds.max(0) * 1000),
        _ => Some(now_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(creation_date: i64) -> FriendRequest {
        FriendRequest {
            id: 1000,
            requester_id: 7,
            recipient_id: 8,
            content: String::new(),
            status: RequestStatus::Pending,
            reason: None,
            creation_date,
            response_date: None,
        }
    }

    #[test]
    fn projects_expired_past_the_window() {
        let now = now_millis();
        let request = pending(now - 4000 * 1000);
        let projected = project(&request, 3600);
        assert_eq!(projected.status, RequestStatus::Expired);
        assert_eq!(projected.response_date, Some(request.creation_date + 3_600_000));
    }

    #[test]
    fn leaves_fresh_requests_pending() {
        let now = now_millis();
        let request = pending(now);
        let projected = project(&request, 3600);
        assert_eq!(projected.status, RequestStatus::Pending);
    }

    #[test]
    fn disabled_window_never_projects() {
        let request = pending(now_millis() - 10_000_000);
        let projected = project(&request, 0);
        assert_eq!(projected.status, RequestStatus::Pending);
    }

    #[test]
    fn does_not_mutate_non_pending_status() {
        let mut request = pending(now_millis() - 10_000_000);
        request.status = RequestStatus::Declined;
        let projected = project(&request, 1);
        assert_eq!(projected.status, RequestStatus::Declined);
    }
}
