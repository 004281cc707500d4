//! Closed response-code error type for the social-graph core.
//!
//! Every failure surfaced to a caller is a single code plus optional
//! free-form detail. See spec §7 for the exact catalogue.

use thiserror::Error;

/// The closed set of errors the core can return to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("recipient has blocked the requester")]
    BlockedUserToSendFriendRequest,

    #[error("an existing friend request already covers this pair")]
    CreateExistingFriendRequest,

    #[error("recalling pending requests is disabled")]
    RecallingDisabled,

    #[error("caller is not the sender of this request")]
    NotSenderToRecall,

    #[error("caller is not the recipient of this request")]
    NotRecipientToUpdate,

    #[error("request is not pending (actual status: {0})")]
    RecallNonPending(String),

    #[error("request is not pending (actual status: {0})")]
    UpdateNonPending(String),

    #[error("client is already up to date")]
    AlreadyUpToDate,

    #[error("no content to return")]
    NoContent,

    #[error("group not found")]
    GroupNotFound,

    #[error("store transaction exceeded its retry budget")]
    TransactionRetriesExhausted,

    #[error("store error: {0}")]
    Store(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    /// Stable string tag for the error, suitable for logging or wire
    /// serialization without leaking the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::IllegalArgument(_) => "ILLEGAL_ARGUMENT",
            GraphError::BlockedUserToSendFriendRequest => "BLOCKED_USER_TO_SEND_FRIEND_REQUEST",
            GraphError::CreateExistingFriendRequest => "CREATE_EXISTING_FRIEND_REQUEST",
            GraphError::RecallingDisabled => "RECALLING_DISABLED",
            GraphError::NotSenderToRecall => "NOT_SENDER_TO_RECALL",
            GraphError::NotRecipientToUpdate => "NOT_RECIPIENT_TO_UPDATE",
            GraphError::RecallNonPending(_) => "RECALL_NON_PENDING",
            GraphError::UpdateNonPending(_) => "UPDATE_NON_PENDING",
            GraphError::AlreadyUpToDate => "ALREADY_UP_TO_DATE",
            GraphError::NoContent => "NO_CONTENT",
            GraphError::GroupNotFound => "GROUP_NOT_FOUND",
            GraphError::TransactionRetriesExhausted => "TRANSIENT_TRANSACTION",
            GraphError::Store(_) => "STORE_ERROR",
            GraphError::Fatal(_) => "FATAL",
        }
    }
}
