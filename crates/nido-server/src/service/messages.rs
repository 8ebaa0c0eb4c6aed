//! Direct-message operations: send, edit, delete, history pagination and
//! the conversation list.

use nido_shared::error::ChatError;
use nido_shared::events::{SendMessagePayload, ServerEvent};
use nido_shared::types::{ConversationId, MessageId, UserId};
use nido_store::StoreError;

use super::views;
use super::{clamp_limit, normalize_content, page_offset, page_or_first, ChatService};

fn unexpected(e: StoreError) -> ChatError {
    ChatError::Unexpected(e.to_string())
}

impl ChatService {
    /// `send_message`: validate, upload media, persist-and-link in one
    /// step, deliver to the receiver if online, and return the ack for the
    /// sender.
    ///
    /// Validation order matters and is observable through the error kinds:
    /// field presence, directory existence, emptiness, reply reference,
    /// media upload, then persistence.
    pub async fn send_message(
        &self,
        payload: SendMessagePayload,
    ) -> Result<ServerEvent, ChatError> {
        let (sender, receiver) = match (payload.sender, payload.receiver) {
            (Some(s), Some(r)) => (s, r),
            (s, r) => {
                let mut missing = Vec::new();
                if s.is_none() {
                    missing.push("sender".to_string());
                }
                if r.is_none() {
                    missing.push("receiver".to_string());
                }
                return Err(ChatError::Validation { missing });
            }
        };

        let found = {
            let store = self.store();
            store.user_exists(sender).map_err(unexpected)? as usize
                + store.user_exists(receiver).map_err(unexpected)? as usize
        };
        if found < 2 {
            return Err(ChatError::UserNotFound { expected: 2, found });
        }

        let content = normalize_content(payload.content);
        if content.is_none() && payload.media.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        // Absence of reply_to is normal; a present-but-unknown reference is
        // an error (the referent may have been deleted concurrently).
        if let Some(reply_to) = payload.reply_to {
            if !self.store().message_exists(reply_to).map_err(unexpected)? {
                return Err(ChatError::MessageNotFound(reply_to));
            }
        }

        let media = match payload.media {
            Some(m) => vec![self
                .media()
                .ingest(&m.bytes, &m.mime_type, &m.filename)
                .await
                .map_err(|e| ChatError::MediaUpload(e.to_string()))?],
            None => Vec::new(),
        };

        // Find-or-create the conversation and insert the message in one
        // transaction; any failure rolls both back.
        let message = self
            .store()
            .send_direct_message(sender, receiver, content, media, payload.reply_to)
            .map_err(|e| ChatError::ChatHandling(e.to_string()))?;

        let view = {
            let store = self.store();
            views::message_view(&store, &message)
        };

        // Fire-and-forget delivery; there is no offline queue.
        let delivered = self.presence().send_to(
            receiver,
            ServerEvent::ReceiveMessage {
                message: view.clone(),
            },
        );
        tracing::info!(message = message.id, %sender, %receiver, delivered, "direct message sent");

        Ok(ServerEvent::MessageSent { message: view })
    }

    /// `update_message`: author-only content replacement, broadcast to all
    /// connections.
    pub fn update_message(
        &self,
        requester: UserId,
        message_id: MessageId,
        content: String,
    ) -> Result<(), ChatError> {
        let content = normalize_content(Some(content)).ok_or(ChatError::Validation {
            missing: vec!["content".to_string()],
        })?;

        let view = {
            let store = self.store();
            let message = store.get_message(message_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::MessageNotFound(message_id),
                other => unexpected(other),
            })?;
            if message.sender != requester {
                return Err(ChatError::Unauthorized(
                    "only the sender can edit a message".to_string(),
                ));
            }

            let updated = store
                .update_message_content(message_id, &content)
                .map_err(|e| ChatError::UpdateFailed(e.to_string()))?;
            views::message_view(&store, &updated)
        };

        self.presence()
            .broadcast(ServerEvent::MessageUpdated { message: view });
        Ok(())
    }

    /// `delete_message`: author-only.  Ownership is relational, so the row
    /// delete detaches the message from its conversation or thread alike.
    pub fn delete_message(&self, requester: UserId, message_id: MessageId) -> Result<(), ChatError> {
        {
            let store = self.store();
            let message = store.get_message(message_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::MessageNotFound(message_id),
                other => unexpected(other),
            })?;
            if message.sender != requester {
                return Err(ChatError::Unauthorized(
                    "only the sender can delete a message".to_string(),
                ));
            }

            store
                .delete_message(message_id)
                .map_err(|e| ChatError::DeleteFailed(e.to_string()))?;
        }

        tracing::info!(message = message_id, %requester, "message deleted");
        self.presence()
            .broadcast(ServerEvent::MessageDeleted { message_id });
        Ok(())
    }

    /// `get_messages`: cursor-paginated history for one conversation,
    /// restricted to its participants, newest first.
    pub fn get_messages(
        &self,
        requester: UserId,
        conversation_id: ConversationId,
        limit: Option<u32>,
        cursor: Option<MessageId>,
    ) -> Result<ServerEvent, ChatError> {
        let limit = clamp_limit(limit, 50, 100);

        let store = self.store();
        // Existence and participation fold into one access-control answer:
        // a requester the directory no longer knows cannot be a participant.
        if !store.user_exists(requester).map_err(unexpected)? {
            return Err(ChatError::Unauthorized(
                "requester is not a participant of this conversation".to_string(),
            ));
        }

        let conversation = store.get_conversation(conversation_id).map_err(|e| match e {
            StoreError::NotFound => {
                ChatError::NotFound(format!("conversation {conversation_id}"))
            }
            other => unexpected(other),
        })?;
        if !conversation.has_participant(requester) {
            return Err(ChatError::Unauthorized(
                "requester is not a participant of this conversation".to_string(),
            ));
        }

        // Fetch one extra row: its presence answers has_more, its id is the
        // cursor the next page starts at.
        let mut page = store
            .conversation_message_page(conversation_id, limit + 1, cursor)
            .map_err(|e| ChatError::FetchFailed(e.to_string()))?;

        let has_more = page.len() as u32 > limit;
        let next_cursor = if has_more {
            Some(page[limit as usize].id)
        } else {
            None
        };
        page.truncate(limit as usize);

        let messages = page.iter().map(|m| views::message_view(&store, m)).collect();

        Ok(ServerEvent::MessagesPaginated {
            messages,
            has_more,
            next_cursor,
        })
    }

    /// `get_chats`: offset-paginated conversation list for one user, each
    /// entry carrying both participants and the single most recent message.
    ///
    /// An empty page is reported as the explicit `CONVERSATION_NOT_YET`
    /// condition rather than an empty success payload, and `has_more` is
    /// the "page was full" approximation.
    pub fn get_chats(
        &self,
        user: UserId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ServerEvent, ChatError> {
        let page = page_or_first(page);
        let limit = clamp_limit(limit, 10, 100);
        let offset = page_offset(page, limit);

        let store = self.store();
        let conversations = store
            .conversations_for_user(user, limit, offset)
            .map_err(|e| ChatError::FetchFailed(e.to_string()))?;

        if conversations.is_empty() {
            return Err(ChatError::ConversationNotYet);
        }

        let mut chats = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            chats.push(
                views::chat_view(&store, conversation)
                    .map_err(|e| ChatError::FetchFailed(e.to_string()))?,
            );
        }

        let has_more = chats.len() as u32 == limit;
        Ok(ServerEvent::ChatsPaginated {
            chats,
            page,
            limit,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use nido_shared::events::MediaPayload;
    use nido_shared::media::MediaKind;

    use super::super::test_support::*;
    use super::*;

    fn payload(sender: UserId, receiver: UserId, content: &str) -> SendMessagePayload {
        SendMessagePayload {
            sender: Some(sender),
            receiver: Some(receiver),
            content: Some(content.to_string()),
            media: None,
            reply_to: None,
        }
    }

    async fn send(service: &ChatService, sender: UserId, receiver: UserId, content: &str) -> MessageId {
        match service.send_message(payload(sender, receiver, content)).await.unwrap() {
            ServerEvent::MessageSent { message } => message.id,
            other => panic!("unexpected ack: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_send_creates_conversation_and_delivers() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        let mut rx_b = connect(&service, b);
        drain(&mut rx_b);

        let ack = service.send_message(payload(a, b, "hi")).await.unwrap();
        let ServerEvent::MessageSent { message } = ack else {
            panic!("expected MessageSent");
        };
        assert_eq!(message.content.as_deref(), Some("hi"));
        assert_eq!(message.sender.id, a);

        // The receiver's connection saw the same message.
        let delivered = drain(&mut rx_b);
        assert!(delivered.iter().any(|e| matches!(
            e,
            ServerEvent::ReceiveMessage { message: m } if m.id == message.id
        )));

        assert_eq!(service.store().count_for_pair(a, b).unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_receiver_is_validation_error_and_persists_nothing() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");

        let err = service
            .send_message(SendMessagePayload {
                sender: Some(a),
                receiver: None,
                content: Some("hi".to_string()),
                media: None,
                reply_to: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "VALIDATION_ERROR");
        assert_eq!(
            service.store().conversations_for_user(a, 10, 0).unwrap().len(),
            0
        );
    }

    #[tokio::test]
    async fn unknown_user_reports_how_many_resolved() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");

        let err = service
            .send_message(payload(a, UserId::new(), "hi"))
            .await
            .unwrap_err();
        match err {
            ChatError::UserNotFound { expected: 2, found: 1 } => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");

        let err = service
            .send_message(SendMessagePayload {
                sender: Some(a),
                receiver: Some(b),
                content: Some("   ".to_string()),
                media: None,
                reply_to: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "EMPTY_MESSAGE");
    }

    #[tokio::test]
    async fn dangling_reply_reference_rejected() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        let id = send(&service, a, b, "original").await;

        // Concurrent delete wins before the reply arrives.
        service.delete_message(a, id).unwrap();

        let err = service
            .send_message(SendMessagePayload {
                reply_to: Some(id),
                ..payload(a, b, "replying")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MESSAGE_NOT_FOUND");
    }

    #[tokio::test]
    async fn media_send_attaches_descriptor() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");

        let ack = service
            .send_message(SendMessagePayload {
                sender: Some(a),
                receiver: Some(b),
                content: None,
                media: Some(MediaPayload {
                    bytes: b"pixels".to_vec(),
                    mime_type: "image/png".to_string(),
                    filename: "bump.png".to_string(),
                }),
                reply_to: None,
            })
            .await
            .unwrap();

        let ServerEvent::MessageSent { message } = ack else {
            panic!("expected MessageSent");
        };
        assert_eq!(message.media.len(), 1);
        assert_eq!(message.media[0].kind, MediaKind::Image);
        assert_eq!(message.media[0].format.as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn media_upload_failure_aborts_send() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");

        // Over the 1 MiB test-storage cap.
        let err = service
            .send_message(SendMessagePayload {
                sender: Some(a),
                receiver: Some(b),
                content: None,
                media: Some(MediaPayload {
                    bytes: vec![0u8; 1024 * 1024 + 1],
                    mime_type: "video/mp4".to_string(),
                    filename: "clip.mp4".to_string(),
                }),
                reply_to: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "MEDIA_UPLOAD_ERROR");
        assert_eq!(service.store().count_for_pair(a, b).unwrap(), 0);
    }

    #[tokio::test]
    async fn only_the_sender_may_edit_or_delete() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        let id = send(&service, a, b, "mine").await;

        let err = service.update_message(b, id, "hijacked".to_string()).unwrap_err();
        assert_eq!(err.kind(), "UNAUTHORIZED");
        let err = service.delete_message(b, id).unwrap_err();
        assert_eq!(err.kind(), "UNAUTHORIZED");

        // Unchanged.
        let message = service.store().get_message(id).unwrap();
        assert_eq!(message.content.as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn edit_and_delete_broadcast_to_all_connections() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        let bystander = seed(&service, "Cleo");
        let mut rx = connect(&service, bystander);
        let id = send(&service, a, b, "v1").await;
        drain(&mut rx);

        service.update_message(a, id, "v2".to_string()).unwrap();
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::MessageUpdated { message } if message.content.as_deref() == Some("v2")
        )));

        service.delete_message(a, id).unwrap();
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::MessageDeleted { message_id } if *message_id == id)));
        assert!(matches!(
            service.store().get_message(id),
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn pagination_walks_history_per_the_cursor_contract() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");

        let mut ids = Vec::new();
        for i in 1..=5 {
            ids.push(send(&service, a, b, &format!("m{i}")).await);
        }
        let conversation = service.store().find_for_pair(a, b).unwrap().unwrap().id;

        // Page 1: the two newest, cursor points at the 3rd-newest.
        let ServerEvent::MessagesPaginated { messages, has_more, next_cursor } =
            service.get_messages(a, conversation, Some(2), None).unwrap()
        else {
            panic!("expected MessagesPaginated");
        };
        assert_eq!(messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);
        assert!(has_more);
        assert_eq!(next_cursor, Some(ids[2]));

        // Page 2.
        let ServerEvent::MessagesPaginated { messages, has_more, next_cursor } = service
            .get_messages(a, conversation, Some(2), next_cursor)
            .unwrap()
        else {
            panic!("expected MessagesPaginated");
        };
        assert_eq!(messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
        assert!(has_more);
        assert_eq!(next_cursor, Some(ids[0]));

        // Page 3: the oldest message, exhausted.
        let ServerEvent::MessagesPaginated { messages, has_more, next_cursor } = service
            .get_messages(a, conversation, Some(2), next_cursor)
            .unwrap()
        else {
            panic!("expected MessagesPaginated");
        };
        assert_eq!(messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[0]]);
        assert!(!has_more);
        assert_eq!(next_cursor, None);
    }

    #[tokio::test]
    async fn history_is_participants_only() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        let outsider = seed(&service, "Cleo");
        send(&service, a, b, "private").await;
        let conversation = service.store().find_for_pair(a, b).unwrap().unwrap().id;

        let err = service
            .get_messages(outsider, conversation, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), "UNAUTHORIZED");

        // A requester the directory does not know at all gets the same
        // answer as a known non-participant.
        let err = service
            .get_messages(UserId::new(), conversation, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn chat_list_populates_last_message_only() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        send(&service, a, b, "first").await;
        let last = send(&service, a, b, "latest").await;

        let ServerEvent::ChatsPaginated { chats, page, limit, has_more } =
            service.get_chats(a, None, None).unwrap()
        else {
            panic!("expected ChatsPaginated");
        };
        assert_eq!((page, limit), (1, 10));
        assert!(!has_more);
        assert_eq!(chats.len(), 1);
        let last_message = chats[0].last_message.as_ref().unwrap();
        assert_eq!(last_message.id, last);
        assert_eq!(chats[0].participants.len(), 2);
    }

    #[tokio::test]
    async fn empty_chat_list_is_conversation_not_yet() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");

        let err = service.get_chats(a, None, None).unwrap_err();
        assert_eq!(err.kind(), "CONVERSATION_NOT_YET");
    }

    #[tokio::test]
    async fn huge_page_numbers_yield_an_empty_page_not_a_panic() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        send(&service, a, b, "hi").await;

        let err = service.get_chats(a, Some(u32::MAX), Some(100)).unwrap_err();
        assert_eq!(err.kind(), "CONVERSATION_NOT_YET");
    }

    #[tokio::test]
    async fn chat_has_more_is_the_full_page_approximation() {
        let (service, _dir) = test_service().await;
        let a = seed(&service, "Alice");
        let b = seed(&service, "Bea");
        let c = seed(&service, "Cleo");
        send(&service, a, b, "one").await;
        send(&service, a, c, "two").await;

        let ServerEvent::ChatsPaginated { chats, has_more, .. } =
            service.get_chats(a, Some(1), Some(2)).unwrap()
        else {
            panic!("expected ChatsPaginated");
        };
        assert_eq!(chats.len(), 2);
        // Exactly-full page claims more even though none remain.
        assert!(has_more);
    }
}
