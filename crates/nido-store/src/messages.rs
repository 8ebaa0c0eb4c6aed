//! CRUD and cursor pagination for [`Message`] records.
//!
//! Message ownership is relational: the `conversation_id` / `thread_id`
//! columns name the owning aggregate, so deleting a message detaches it from
//! whichever aggregate owns it, with no list to patch up.

use chrono::Utc;
use rusqlite::params;

use nido_shared::types::{ConversationId, MessageId, ThreadId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{parse_media_col, parse_timestamp_col, parse_uuid_col, Message, NewMessage};

/// The aggregate a new message is written into.
#[derive(Debug, Clone, Copy)]
pub enum Owner {
    Conversation(ConversationId),
    Thread(ThreadId),
}

/// Insert a message row owned by `owner`.  Shared by the conversation and
/// thread write paths; callable inside a transaction (a
/// `rusqlite::Transaction` derefs to `Connection`).
pub(crate) fn insert_message_in(
    conn: &rusqlite::Connection,
    owner: Owner,
    new: &NewMessage,
) -> Result<Message> {
    let now = Utc::now();
    let (conversation, thread) = match owner {
        Owner::Conversation(id) => (Some(id), None),
        Owner::Thread(id) => (None, Some(id)),
    };

    conn.execute(
        "INSERT INTO messages
             (sender, receiver, conversation_id, thread_id, content, media,
              reply_to, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            new.sender.to_string(),
            new.receiver.map(|r| r.to_string()),
            conversation.map(|c| c.to_string()),
            thread.map(|t| t.to_string()),
            new.content,
            serde_json::to_string(&new.media)?,
            new.reply_to,
            now.to_rfc3339(),
        ],
    )?;

    Ok(Message {
        id: conn.last_insert_rowid(),
        sender: new.sender,
        receiver: new.receiver,
        conversation,
        thread,
        content: new.content.clone(),
        media: new.media.clone(),
        reply_to: new.reply_to,
        created_at: now,
        updated_at: now,
    })
}

const MESSAGE_COLS: &str =
    "id, sender, receiver, conversation_id, thread_id, content, media, reply_to, created_at, updated_at";

impl Database {
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn message_exists(&self, id: MessageId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Replace a message's content and bump `updated_at`.  Returns the
    /// refreshed row.
    pub fn update_message_content(&self, id: MessageId, content: &str) -> Result<Message> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, content, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_message(id)
    }

    /// Delete a message.  Returns `true` if a row was deleted.  Ownership is
    /// relational, so no conversation or thread list needs updating.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// One page of a conversation's history, newest first.
    ///
    /// `cursor` is the id of the first message the page should start at
    /// ("load older"): it was fetched as the overflow row of the previous
    /// page and excluded from it, so the bound is inclusive.  The caller
    /// passes `limit + 1` as `fetch_limit` to detect whether more pages
    /// exist.
    pub fn conversation_message_page(
        &self,
        conversation: ConversationId,
        fetch_limit: u32,
        cursor: Option<MessageId>,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLS} FROM messages
             WHERE conversation_id = ?1 AND (?2 IS NULL OR id <= ?2)
             ORDER BY id DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(
            params![conversation.to_string(), cursor, fetch_limit],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// All replies of a thread in send order.
    pub fn thread_messages(&self, thread: ThreadId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLS} FROM messages
             WHERE thread_id = ?1
             ORDER BY id ASC"
        ))?;

        let rows = stmt.query_map(params![thread.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// The single most recent message of a conversation, if any.
    pub fn latest_conversation_message(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<Message>> {
        let result = self.conn().query_row(
            &format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY id DESC LIMIT 1"
            ),
            params![conversation.to_string()],
            row_to_message,
        );

        match result {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: MessageId = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: Option<String> = row.get(2)?;
    let conversation_str: Option<String> = row.get(3)?;
    let thread_str: Option<String> = row.get(4)?;
    let content: Option<String> = row.get(5)?;
    let media_str: String = row.get(6)?;
    let reply_to: Option<MessageId> = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let receiver = receiver_str
        .map(|s| parse_uuid_col(2, &s).map(UserId))
        .transpose()?;
    let conversation = conversation_str
        .map(|s| parse_uuid_col(3, &s).map(ConversationId))
        .transpose()?;
    let thread = thread_str
        .map(|s| parse_uuid_col(4, &s).map(ThreadId))
        .transpose()?;

    Ok(Message {
        id,
        sender: UserId(parse_uuid_col(1, &sender_str)?),
        receiver,
        conversation,
        thread,
        content,
        media: parse_media_col(6, &media_str)?,
        reply_to,
        created_at: parse_timestamp_col(8, &created_str)?,
        updated_at: parse_timestamp_col(9, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn send(db: &mut Database, a: UserId, b: UserId, content: &str) -> Message {
        db.send_direct_message(a, b, Some(content.to_string()), Vec::new(), None)
            .unwrap()
    }

    #[test]
    fn ids_strictly_increase() {
        let mut db = test_db();
        let (a, b) = (UserId::new(), UserId::new());
        let m1 = send(&mut db, a, b, "one");
        let m2 = send(&mut db, a, b, "two");
        assert!(m2.id > m1.id);
    }

    #[test]
    fn update_bumps_updated_at() {
        let mut db = test_db();
        let (a, b) = (UserId::new(), UserId::new());
        let m = send(&mut db, a, b, "draft");

        let updated = db.update_message_content(m.id, "final").unwrap();
        assert_eq!(updated.content.as_deref(), Some("final"));
        assert!(updated.updated_at >= m.updated_at);
        assert_eq!(updated.created_at, m.created_at);
    }

    #[test]
    fn delete_is_idempotent_about_missing_rows() {
        let db = test_db();
        assert!(!db.delete_message(4242).unwrap());
    }

    #[test]
    fn cursor_page_walks_history_exactly_once() {
        let mut db = test_db();
        let (a, b) = (UserId::new(), UserId::new());
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(send(&mut db, a, b, &format!("m{i}")).id);
        }
        let conversation = db.find_for_pair(a, b).unwrap().unwrap().id;

        // limit 2 per page, fetch limit+1 to detect more; the overflow row's
        // id becomes the next cursor.
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = db.conversation_message_page(conversation, 3, cursor).unwrap();
            let has_more = page.len() > 2;
            for m in page.iter().take(2) {
                seen.push(m.id);
            }
            if !has_more {
                break;
            }
            cursor = Some(page[2].id);
        }

        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(seen, expected);
        assert!(seen.windows(2).all(|w| w[0] > w[1]));
    }
}
