//! The closed chat error taxonomy.
//!
//! Every failure that crosses the event boundary is one of these variants;
//! handlers convert a [`ChatError`] into an [`ErrorEvent`] and send it to the
//! invoking connection only.  The set of wire tags is closed so clients can
//! branch on `type` exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::types::{MessageId, ThreadId};

#[derive(Error, Debug)]
pub enum ChatError {
    /// One or more required fields were missing from the request.
    #[error("missing required field(s): {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    /// A referenced user does not exist in the user directory.
    /// `found`/`expected` report how many of the referenced users resolved.
    #[error("user lookup resolved {found} of {expected} users")]
    UserNotFound { expected: usize, found: usize },

    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),

    /// Generic missing-entity failure (e.g. an unknown conversation).
    #[error("{0} not found")]
    NotFound(String),

    /// A message needs text content or at least one attachment.
    #[error("message has neither content nor media")]
    EmptyMessage,

    /// Thread title empty after trimming.
    #[error("thread title must not be empty")]
    InvalidTitle,

    /// Authorship or participation check failed.
    #[error("not allowed: {0}")]
    Unauthorized(String),

    /// Media upload failed while sending a direct message.
    #[error("media upload failed: {0}")]
    MediaUpload(String),

    /// Media upload failed on a thread path (create / reply).
    #[error("media upload failed: {0}")]
    MediaUploadFailed(String),

    /// Conversation linkage failed after the message was constructed; the
    /// message is rolled back so the whole send is retriable from scratch.
    #[error("could not link message to a conversation: {0}")]
    ChatHandling(String),

    /// Not a true error: the user has no conversations yet.
    #[error("no conversations yet")]
    ConversationNotYet,

    #[error("thread search failed: {0}")]
    SearchError(String),

    #[error("user search failed: {0}")]
    SearchFailed(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ChatError {
    /// Machine-readable wire tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation { .. } => "VALIDATION_ERROR",
            ChatError::UserNotFound { .. } => "USER_NOT_FOUND",
            ChatError::MessageNotFound(_) => "MESSAGE_NOT_FOUND",
            ChatError::ThreadNotFound(_) => "THREAD_NOT_FOUND",
            ChatError::NotFound(_) => "NOT_FOUND",
            ChatError::EmptyMessage => "EMPTY_MESSAGE",
            ChatError::InvalidTitle => "INVALID_TITLE",
            ChatError::Unauthorized(_) => "UNAUTHORIZED",
            ChatError::MediaUpload(_) => "MEDIA_UPLOAD_ERROR",
            ChatError::MediaUploadFailed(_) => "MEDIA_UPLOAD_FAILED",
            ChatError::ChatHandling(_) => "CHAT_HANDLING_ERROR",
            ChatError::ConversationNotYet => "CONVERSATION_NOT_YET",
            ChatError::SearchError(_) => "SEARCH_ERROR",
            ChatError::SearchFailed(_) => "SEARCH_FAILED",
            ChatError::FetchFailed(_) => "FETCH_FAILED",
            ChatError::DeleteFailed(_) => "DELETE_FAILED",
            ChatError::UpdateFailed(_) => "UPDATE_FAILED",
            ChatError::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }

    /// Structured diagnostics attached to the wire payload, where a variant
    /// carries more than its message text.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ChatError::Validation { missing } => Some(json!({ "missing": missing })),
            ChatError::UserNotFound { expected, found } => {
                Some(json!({ "expected": expected, "found": found }))
            }
            ChatError::MessageNotFound(id) => Some(json!({ "message_id": id })),
            ChatError::ThreadNotFound(id) => Some(json!({ "thread_id": id })),
            ChatError::MediaUpload(cause)
            | ChatError::MediaUploadFailed(cause)
            | ChatError::ChatHandling(cause)
            | ChatError::SearchError(cause)
            | ChatError::SearchFailed(cause)
            | ChatError::FetchFailed(cause)
            | ChatError::DeleteFailed(cause)
            | ChatError::UpdateFailed(cause)
            | ChatError::Unexpected(cause) => Some(json!({ "cause": cause })),
            _ => None,
        }
    }

    /// Convert into the wire-level error event.
    pub fn to_event(&self) -> ErrorEvent {
        ErrorEvent {
            kind: self.kind().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// The `error {type, message, details?}` payload sent to the invoking
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
