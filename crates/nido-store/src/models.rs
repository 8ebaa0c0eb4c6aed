//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the view-building layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nido_shared::media::MediaDescriptor;
use nido_shared::types::{ConversationId, MessageId, ThreadId, UserId};

// ---------------------------------------------------------------------------
// User (directory mirror)
// ---------------------------------------------------------------------------

/// A user known to the external directory.  The core only reads these for
/// existence checks and display-field population.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single message, owned by exactly one aggregate (its conversation or its
/// thread).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    /// Present for direct messages, absent for thread replies.
    pub receiver: Option<UserId>,
    /// Owning conversation, when the message is a direct message.
    pub conversation: Option<ConversationId>,
    /// Owning thread, when the message is a thread reply.
    pub thread: Option<ThreadId>,
    pub content: Option<String>,
    pub media: Vec<MediaDescriptor>,
    /// Reference to an earlier message.  Validated at creation time only;
    /// may dangle after the referenced message is deleted.
    pub reply_to: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a message about to be inserted.  The id and timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: UserId,
    pub receiver: Option<UserId>,
    pub content: Option<String>,
    pub media: Vec<MediaDescriptor>,
    pub reply_to: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// DirectConversation
// ---------------------------------------------------------------------------

/// The two-party conversation aggregate.  The participant pair is stored
/// normalized (low/high by uuid ordering) so the unordered-pair lookup is a
/// plain equality query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [UserId; 2],
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether the given user is one of the two participants.
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// A many-party discussion aggregate.  Replies are messages with
/// `thread = Some(id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: ThreadId,
    pub creator: UserId,
    pub title: String,
    /// Participants in join order, creator first.
    pub participants: Vec<UserId>,
    /// Media attached to the thread itself, distinct from reply media.
    pub media: Vec<MediaDescriptor>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Row-parsing helpers shared by the CRUD modules
// ---------------------------------------------------------------------------

pub(crate) fn parse_uuid_col(idx: usize, s: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp_col(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_media_col(idx: usize, s: &str) -> rusqlite::Result<Vec<MediaDescriptor>> {
    serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
