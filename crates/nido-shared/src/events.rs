//! The JSON event protocol.
//!
//! Every WebSocket text frame carries exactly one event, framed as
//! `{"event": "<name>", "data": {...}}`.  [`ClientEvent`] is what the server
//! accepts, [`ServerEvent`] is everything it emits (acks, deliveries and
//! broadcasts alike).

use serde::{Deserialize, Serialize};

use crate::error::ErrorEvent;
use crate::types::{ConversationId, MessageId, ThreadId, UserId};
use crate::views::{ChatView, MessageView, Pagination, ThreadView, UserView};

/// An attachment as submitted by a client: raw bytes (base64 on the wire)
/// plus enough metadata for the media ingestion adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaPayload {
    #[serde(with = "crate::b64")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessagePayload {
    pub sender: Option<UserId>,
    pub receiver: Option<UserId>,
    pub content: Option<String>,
    pub media: Option<MediaPayload>,
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateThreadPayload {
    pub creator: Option<UserId>,
    pub title: Option<String>,
    /// Optional opening post; when present it becomes the thread's first
    /// reply message.
    pub content: Option<String>,
    #[serde(default)]
    pub participants: Vec<UserId>,
    pub media: Option<MediaPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyToThreadPayload {
    pub thread_id: ThreadId,
    pub sender: Option<UserId>,
    pub content: Option<String>,
    pub media: Option<MediaPayload>,
}

/// Events a client may send over its connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage(SendMessagePayload),
    DeleteMessage {
        message_id: MessageId,
    },
    UpdateMessage {
        message_id: MessageId,
        content: String,
    },
    GetMessages {
        conversation_id: ConversationId,
        limit: Option<u32>,
        cursor: Option<MessageId>,
    },
    GetChats {
        page: Option<u32>,
        limit: Option<u32>,
    },
    SearchUsers {
        term: String,
        page: Option<u32>,
        limit: Option<u32>,
    },
    CreateThread(CreateThreadPayload),
    ReplyToThread(ReplyToThreadPayload),
    DeleteThread {
        thread_id: ThreadId,
    },
    UpdateThread {
        thread_id: ThreadId,
        title: String,
    },
    GetThreads {
        page: Option<u32>,
        limit: Option<u32>,
    },
    SearchThreads {
        term: String,
        page: Option<u32>,
        limit: Option<u32>,
        #[serde(default)]
        include_messages: bool,
        #[serde(default)]
        include_users: bool,
    },
    RequestOnlineUsers,
}

/// Events the server emits.  Whether a given event is an ack to the invoking
/// connection, a targeted delivery or a broadcast is decided by the caller;
/// the frame shape is identical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Send ack to the message author.
    MessageSent { message: MessageView },
    /// Delivery to the receiver's live connection.
    ReceiveMessage { message: MessageView },
    MessagesPaginated {
        messages: Vec<MessageView>,
        has_more: bool,
        next_cursor: Option<MessageId>,
    },
    ChatsPaginated {
        chats: Vec<ChatView>,
        page: u32,
        limit: u32,
        has_more: bool,
    },
    UsersPaginated {
        users: Vec<UserView>,
        total_users: u64,
        total_pages: u32,
        page: u32,
        limit: u32,
    },
    Error(ErrorEvent),
    MessageUpdated { message: MessageView },
    MessageDeleted { message_id: MessageId },
    OnlineUsersChanged { online: Vec<UserId> },
    ThreadCreated { thread: ThreadView },
    ThreadUpdated { thread: ThreadView },
    ThreadDeleted { thread_id: ThreadId },
    ThreadReplyAdded {
        thread_id: ThreadId,
        message: MessageView,
    },
    /// Legacy unpaginated listing, kept for older clients.
    AllThreads { threads: Vec<ThreadView> },
    PaginatedThreads {
        threads: Vec<ThreadView>,
        pagination: Pagination,
    },
    SearchResults {
        threads: Vec<ThreadView>,
        pagination: Pagination,
        term: String,
    },
}

impl ClientEvent {
    pub fn from_json(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;

    #[test]
    fn client_event_round_trip() {
        let event = ClientEvent::SendMessage(SendMessagePayload {
            sender: Some(UserId::new()),
            receiver: Some(UserId::new()),
            content: Some("hi".to_string()),
            media: None,
            reply_to: None,
        });

        let frame = event.to_json().unwrap();
        assert!(frame.contains("\"event\":\"send_message\""));

        let restored = ClientEvent::from_json(&frame).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn unit_variant_frames() {
        let frame = ClientEvent::RequestOnlineUsers.to_json().unwrap();
        assert!(frame.contains("request_online_users"));
        let restored = ClientEvent::from_json(&frame).unwrap();
        assert_eq!(restored, ClientEvent::RequestOnlineUsers);
    }

    #[test]
    fn search_flags_default_off() {
        let frame = r#"{"event":"search_threads","data":{"term":"alice","page":1,"limit":10}}"#;
        match ClientEvent::from_json(frame).unwrap() {
            ClientEvent::SearchThreads {
                term,
                include_messages,
                include_users,
                ..
            } => {
                assert_eq!(term, "alice");
                assert!(!include_messages);
                assert!(!include_users);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn error_event_frame_shape() {
        let event = ServerEvent::Error(ChatError::EmptyMessage.to_event());
        let frame = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["type"], "EMPTY_MESSAGE");
    }

    #[test]
    fn media_payload_carries_base64() {
        let event = ClientEvent::SendMessage(SendMessagePayload {
            sender: Some(UserId::new()),
            receiver: Some(UserId::new()),
            content: None,
            media: Some(MediaPayload {
                bytes: vec![1, 2, 3],
                mime_type: "image/png".to_string(),
                filename: "pic.png".to_string(),
            }),
            reply_to: None,
        });

        let frame = event.to_json().unwrap();
        assert!(frame.contains("AQID"));
        assert_eq!(ClientEvent::from_json(&frame).unwrap(), event);
    }
}
