//! The WebSocket connection layer.
//!
//! One socket per user.  The upgrade handshake authenticates against the
//! user directory; after that the connection is a pipe: inbound text frames
//! are parsed into [`ClientEvent`]s and dispatched to the service, outbound
//! events are pumped from the connection's channel back as text frames.
//!
//! Failures of an operation go to the invoking connection only, as `error`
//! events; they never tear the socket down.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nido_shared::error::ChatError;
use nido_shared::events::{ClientEvent, ServerEvent};
use nido_shared::types::UserId;

use crate::api::AppState;
use crate::error::ServerError;
use crate::service::ChatService;

#[derive(Deserialize)]
pub struct ConnectParams {
    pub user_id: UserId,
}

/// `GET /ws?user_id=<uuid>`: authenticate and upgrade.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let user = params.user_id;
    let known = state
        .service
        .user_exists(user)
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    if !known {
        return Err(ServerError::Forbidden(format!("unknown user {user}")));
    }

    Ok(ws.on_upgrade(move |socket| handle_connection(state, socket, user)))
}

async fn handle_connection(state: AppState, socket: WebSocket, user: UserId) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.service.presence().register(user, tx.clone());
    info!(%user, "connection established");

    // Outbound pump: everything queued for this connection becomes a text
    // frame, in queue order.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match event.to_json() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%user, error = %e, "socket error");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                if let Some(reply) = handle_frame(&state.service, user, &text).await {
                    // Replies go through this connection's own channel, not a
                    // presence lookup: a concurrent reconnect may already have
                    // replaced the registered handle.
                    if tx.send(reply).is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            _ => {}
        }
    }

    state.service.presence().unregister(user);
    writer.abort();
    info!(%user, "connection closed");
}

/// Parse one frame and run its operation.  The returned event, if any, is
/// for the invoking connection only; deliveries and broadcasts have already
/// happened inside the operation.
async fn handle_frame(service: &ChatService, user: UserId, text: &str) -> Option<ServerEvent> {
    let event = match ClientEvent::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(%user, error = %e, "malformed frame");
            let err = ChatError::Unexpected(format!("malformed frame: {e}"));
            return Some(ServerEvent::Error(err.to_event()));
        }
    };

    match dispatch(service, user, event).await {
        Ok(reply) => reply,
        Err(e) => Some(ServerEvent::Error(e.to_event())),
    }
}

async fn dispatch(
    service: &ChatService,
    user: UserId,
    event: ClientEvent,
) -> Result<Option<ServerEvent>, ChatError> {
    match event {
        ClientEvent::SendMessage(mut payload) => {
            // The connection's authenticated identity always wins over what
            // the frame claims.
            payload.sender = Some(user);
            service.send_message(payload).await.map(Some)
        }
        ClientEvent::UpdateMessage { message_id, content } => {
            service.update_message(user, message_id, content)?;
            Ok(None)
        }
        ClientEvent::DeleteMessage { message_id } => {
            service.delete_message(user, message_id)?;
            Ok(None)
        }
        ClientEvent::GetMessages {
            conversation_id,
            limit,
            cursor,
        } => service
            .get_messages(user, conversation_id, limit, cursor)
            .map(Some),
        ClientEvent::GetChats { page, limit } => service.get_chats(user, page, limit).map(Some),
        ClientEvent::SearchUsers { term, page, limit } => {
            service.search_users(&term, page, limit).map(Some)
        }
        ClientEvent::CreateThread(mut payload) => {
            payload.creator = Some(user);
            service.create_thread(payload).await?;
            Ok(None)
        }
        ClientEvent::ReplyToThread(mut payload) => {
            payload.sender = Some(user);
            service.reply_to_thread(payload).await?;
            Ok(None)
        }
        ClientEvent::DeleteThread { thread_id } => {
            service.delete_thread(user, thread_id)?;
            Ok(None)
        }
        ClientEvent::UpdateThread { thread_id, title } => {
            service.update_thread(user, thread_id, title)?;
            Ok(None)
        }
        ClientEvent::GetThreads { page, limit } => {
            service.get_threads(page, limit)?;
            Ok(None)
        }
        ClientEvent::SearchThreads {
            term,
            page,
            limit,
            include_messages,
            include_users,
        } => {
            service.search_threads(&term, page, limit, include_messages, include_users)?;
            Ok(None)
        }
        ClientEvent::RequestOnlineUsers => Ok(Some(service.online_users())),
    }
}

#[cfg(test)]
mod tests {
    use nido_shared::events::SendMessagePayload;

    use super::*;
    use crate::service::test_support::*;

    #[tokio::test]
    async fn malformed_frame_yields_error_event() {
        let (service, _dir) = test_service().await;
        let user = seed(&service, "Alice");

        let reply = handle_frame(&service, user, "{not json").await;
        match reply {
            Some(ServerEvent::Error(event)) => assert_eq!(event.kind, "UNEXPECTED_ERROR"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn operation_failure_is_an_error_event_not_a_disconnect() {
        let (service, _dir) = test_service().await;
        let user = seed(&service, "Alice");

        let frame = ClientEvent::GetChats {
            page: None,
            limit: None,
        }
        .to_json()
        .unwrap();
        let reply = handle_frame(&service, user, &frame).await;
        match reply {
            Some(ServerEvent::Error(event)) => assert_eq!(event.kind, "CONVERSATION_NOT_YET"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sender_is_overridden_by_connection_identity() {
        let (service, _dir) = test_service().await;
        let alice = seed(&service, "Alice");
        let bea = seed(&service, "Bea");
        let mallory = seed(&service, "Mallory");

        // Mallory's connection claims to be Alice; the frame's sender is
        // ignored.
        let frame = ClientEvent::SendMessage(SendMessagePayload {
            sender: Some(alice),
            receiver: Some(bea),
            content: Some("spoofed".to_string()),
            media: None,
            reply_to: None,
        })
        .to_json()
        .unwrap();

        let reply = handle_frame(&service, mallory, &frame).await;
        match reply {
            Some(ServerEvent::MessageSent { message }) => {
                assert_eq!(message.sender.id, mallory);
            }
            other => panic!("expected send ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn online_users_request_is_answered_inline() {
        let (service, _dir) = test_service().await;
        let user = seed(&service, "Alice");
        let _rx = connect(&service, user);

        let frame = ClientEvent::RequestOnlineUsers.to_json().unwrap();
        let reply = handle_frame(&service, user, &frame).await;
        match reply {
            Some(ServerEvent::OnlineUsersChanged { online }) => assert_eq!(online, vec![user]),
            other => panic!("expected online set, got {other:?}"),
        }
    }
}
