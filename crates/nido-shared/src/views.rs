//! Populated result shapes handed back to clients.
//!
//! These are the "display enriched" forms: wherever the stored aggregates
//! hold bare user ids, the views carry the directory fields a client renders
//! (display name, email, role).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaDescriptor;
use crate::types::{ConversationId, MessageId, ThreadId, UserId};

/// Public directory fields for a user.  Never includes credentials or any
/// other sensitive field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: String,
}

/// A message with its sender (and receiver, for direct messages) populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub id: MessageId,
    pub sender: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserView>,
    pub content: Option<String>,
    pub media: Vec<MediaDescriptor>,
    pub reply_to: Option<MessageId>,
    /// Set when the message is a thread reply rather than a direct message.
    pub thread: Option<ThreadId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A direct conversation as listed by `get_chats`: both participants
/// populated, plus only the single most recent message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatView {
    pub id: ConversationId,
    pub participants: Vec<UserView>,
    pub last_message: Option<MessageView>,
    pub created_at: DateTime<Utc>,
}

/// What part of a thread a search hit matched on.  Title takes priority
/// when both the title and a reply match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum SearchMatch {
    Title,
    Reply { message_id: MessageId },
    Participant { user_id: UserId },
}

/// A fully populated thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadView {
    pub id: ThreadId,
    pub creator: UserView,
    pub title: String,
    pub participants: Vec<UserView>,
    pub messages: Vec<MessageView>,
    pub media: Vec<MediaDescriptor>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_match: Option<SearchMatch>,
}

/// Offset-pagination summary attached to thread listings and searches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            ((total + limit as u64 - 1) / limit as u64) as u32
        };
        Self { page, limit, total, total_pages }
    }
}
