//! Builders for the display-enriched result shapes.

use nido_shared::views::{ChatView, MessageView, SearchMatch, ThreadView, UserView};
use nido_store::{Conversation, Database, Message, StoreError, Thread, User};

use nido_shared::types::UserId;

pub(crate) fn view_of_user(user: User) -> UserView {
    UserView {
        id: user.id,
        display_name: user.display_name,
        email: user.email,
        role: user.role,
    }
}

/// Directory lookup with a stable fallback: a user removed from the
/// directory after sending messages must not break history listings.
pub(crate) fn user_view(db: &Database, id: UserId) -> UserView {
    match db.get_user(id) {
        Ok(user) => view_of_user(user),
        Err(_) => UserView {
            id,
            display_name: "unknown".to_string(),
            email: String::new(),
            role: "member".to_string(),
        },
    }
}

pub(crate) fn message_view(db: &Database, message: &Message) -> MessageView {
    MessageView {
        id: message.id,
        sender: user_view(db, message.sender),
        receiver: message.receiver.map(|r| user_view(db, r)),
        content: message.content.clone(),
        media: message.media.clone(),
        reply_to: message.reply_to,
        thread: message.thread,
        created_at: message.created_at,
        updated_at: message.updated_at,
    }
}

pub(crate) fn chat_view(db: &Database, conversation: &Conversation) -> Result<ChatView, StoreError> {
    let last_message = db
        .latest_conversation_message(conversation.id)?
        .map(|m| message_view(db, &m));

    Ok(ChatView {
        id: conversation.id,
        participants: conversation
            .participants
            .iter()
            .map(|&p| user_view(db, p))
            .collect(),
        last_message,
        created_at: conversation.created_at,
    })
}

pub(crate) fn thread_view(
    db: &Database,
    thread: &Thread,
    search_match: Option<SearchMatch>,
) -> Result<ThreadView, StoreError> {
    let messages = db
        .thread_messages(thread.id)?
        .iter()
        .map(|m| message_view(db, m))
        .collect();

    Ok(ThreadView {
        id: thread.id,
        creator: user_view(db, thread.creator),
        title: thread.title.clone(),
        participants: thread
            .participants
            .iter()
            .map(|&p| user_view(db, p))
            .collect(),
        messages,
        media: thread.media.clone(),
        created_at: thread.created_at,
        search_match,
    })
}
