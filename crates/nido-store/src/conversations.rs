//! CRUD for [`Conversation`] records and the send-and-link write path.

use chrono::Utc;
use rusqlite::params;

use nido_shared::media::MediaDescriptor;
use nido_shared::types::{ConversationId, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{insert_message_in, Owner};
use crate::models::{parse_timestamp_col, parse_uuid_col, Conversation, Message, NewMessage};

/// Normalize an unordered user pair to (low, high) by uuid ordering, so the
/// at-most-one-conversation-per-pair lookup is a plain equality query.
fn normalize_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Database {
    /// Find the conversation for an unordered user pair, if one exists.
    pub fn find_for_pair(&self, a: UserId, b: UserId) -> Result<Option<Conversation>> {
        let (low, high) = normalize_pair(a, b);
        let result = self.conn().query_row(
            "SELECT id, participant_low, participant_high, created_at
             FROM conversations
             WHERE participant_low = ?1 AND participant_high = ?2",
            params![low.to_string(), high.to_string()],
            row_to_conversation,
        );

        match result {
            Ok(conversation) => Ok(Some(conversation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, participant_low, participant_high, created_at
                 FROM conversations WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Count how many conversations exist for a pair.  The invariant is "at
    /// most one"; tests use this to verify it.
    pub fn count_for_pair(&self, a: UserId, b: UserId) -> Result<u64> {
        let (low, high) = normalize_pair(a, b);
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE participant_low = ?1 AND participant_high = ?2",
            params![low.to_string(), high.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Persist a direct message, linking it to the pair's conversation and
    /// lazily creating the conversation on first contact.
    ///
    /// Lookup, (optional) creation and the message insert run inside one
    /// transaction: if any step fails everything rolls back, so a message can
    /// never be left dangling without its conversation linkage.
    pub fn send_direct_message(
        &mut self,
        sender: UserId,
        receiver: UserId,
        content: Option<String>,
        media: Vec<MediaDescriptor>,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        let tx = self.conn_mut().transaction()?;
        let (low, high) = normalize_pair(sender, receiver);

        let existing: Option<String> = {
            let result = tx.query_row(
                "SELECT id FROM conversations
                 WHERE participant_low = ?1 AND participant_high = ?2",
                params![low.to_string(), high.to_string()],
                |row| row.get(0),
            );
            match result {
                Ok(id) => Some(id),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(other) => return Err(StoreError::Sqlite(other)),
            }
        };

        let conversation_id = match existing {
            Some(id_str) => ConversationId(
                uuid::Uuid::parse_str(&id_str).map_err(StoreError::Uuid)?,
            ),
            None => {
                let id = ConversationId::new();
                tx.execute(
                    "INSERT INTO conversations
                         (id, participant_low, participant_high, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        id.to_string(),
                        low.to_string(),
                        high.to_string(),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                tracing::debug!(conversation = %id, "created conversation on first contact");
                id
            }
        };

        let message = insert_message_in(
            &tx,
            Owner::Conversation(conversation_id),
            &NewMessage {
                sender,
                receiver: Some(receiver),
                content,
                media,
                reply_to,
            },
        )?;

        tx.commit()?;
        Ok(message)
    }

    /// Conversations the user participates in, offset-paginated, most recent
    /// activity first.
    pub fn conversations_for_user(
        &self,
        user: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.participant_low, c.participant_high, c.created_at
             FROM conversations c
             WHERE c.participant_low = ?1 OR c.participant_high = ?1
             ORDER BY COALESCE(
                 (SELECT MAX(m.id) FROM messages m WHERE m.conversation_id = c.id), 0
             ) DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(
            params![user.to_string(), limit, offset],
            row_to_conversation,
        )?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }
}

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let low_str: String = row.get(1)?;
    let high_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    Ok(Conversation {
        id: ConversationId(parse_uuid_col(0, &id_str)?),
        participants: [
            UserId(parse_uuid_col(1, &low_str)?),
            UserId(parse_uuid_col(2, &high_str)?),
        ],
        created_at: parse_timestamp_col(3, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn first_message_creates_conversation_lazily() {
        let mut db = test_db();
        let (a, b) = (UserId::new(), UserId::new());
        assert!(db.find_for_pair(a, b).unwrap().is_none());

        let message = db
            .send_direct_message(a, b, Some("hi".to_string()), Vec::new(), None)
            .unwrap();

        let conversation = db.find_for_pair(a, b).unwrap().unwrap();
        assert_eq!(message.conversation, Some(conversation.id));
        assert!(conversation.has_participant(a));
        assert!(conversation.has_participant(b));
    }

    #[test]
    fn at_most_one_conversation_per_pair() {
        let mut db = test_db();
        let (a, b) = (UserId::new(), UserId::new());

        // Sends in both directions reuse the same conversation.
        db.send_direct_message(a, b, Some("one".to_string()), Vec::new(), None)
            .unwrap();
        db.send_direct_message(b, a, Some("two".to_string()), Vec::new(), None)
            .unwrap();
        db.send_direct_message(a, b, Some("three".to_string()), Vec::new(), None)
            .unwrap();

        assert_eq!(db.count_for_pair(a, b).unwrap(), 1);
        let conversation = db.find_for_pair(b, a).unwrap().unwrap();
        let page = db.conversation_message_page(conversation.id, 10, None).unwrap();
        assert_eq!(page.len(), 3);
    }

    #[test]
    fn listing_orders_by_recent_activity() {
        let mut db = test_db();
        let me = UserId::new();
        let (x, y) = (UserId::new(), UserId::new());

        db.send_direct_message(me, x, Some("to x".to_string()), Vec::new(), None)
            .unwrap();
        db.send_direct_message(me, y, Some("to y".to_string()), Vec::new(), None)
            .unwrap();
        // Newer traffic with x moves that conversation back to the top.
        db.send_direct_message(x, me, Some("reply".to_string()), Vec::new(), None)
            .unwrap();

        let listed = db.conversations_for_user(me, 10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].has_participant(x));
        assert!(listed[1].has_participant(y));

        // Offset pagination.
        let second_page = db.conversations_for_user(me, 1, 1).unwrap();
        assert_eq!(second_page.len(), 1);
        assert!(second_page[0].has_participant(y));
    }
}
