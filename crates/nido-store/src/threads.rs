//! CRUD, cascade delete and search for [`Thread`] records.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, params_from_iter};

use nido_shared::media::MediaDescriptor;
use nido_shared::types::{ThreadId, UserId};
use nido_shared::views::SearchMatch;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{insert_message_in, Owner};
use crate::models::{parse_media_col, parse_timestamp_col, parse_uuid_col, Message, NewMessage, Thread};
use crate::users::like_pattern;

/// A thread returned by search, annotated with what the term matched on.
#[derive(Debug, Clone)]
pub struct ThreadSearchHit {
    pub thread: Thread,
    pub matched: SearchMatch,
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new thread with its participant list.
    ///
    /// The creator is always included as the first participant; duplicates
    /// in `participants` are dropped while preserving join order.
    pub fn create_thread(
        &mut self,
        creator: UserId,
        title: &str,
        participants: &[UserId],
        media: Vec<MediaDescriptor>,
    ) -> Result<Thread> {
        let id = ThreadId::new();
        let now = Utc::now();

        let mut ordered = vec![creator];
        for &user in participants {
            if !ordered.contains(&user) {
                ordered.push(user);
            }
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO threads (id, creator, title, media, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                creator.to_string(),
                title,
                serde_json::to_string(&media)?,
                now.to_rfc3339(),
            ],
        )?;

        for (position, user) in ordered.iter().enumerate() {
            tx.execute(
                "INSERT INTO thread_participants (thread_id, user_id, position)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), user.to_string(), position as i64],
            )?;
        }
        tx.commit()?;

        Ok(Thread {
            id,
            creator,
            title: title.to_string(),
            participants: ordered,
            media,
            created_at: now,
        })
    }

    /// Append a reply message to a thread.  The caller is responsible for
    /// checking that the thread exists.
    pub fn insert_thread_reply(
        &self,
        thread: ThreadId,
        sender: UserId,
        content: Option<String>,
        media: Vec<MediaDescriptor>,
    ) -> Result<Message> {
        insert_message_in(
            self.conn(),
            Owner::Thread(thread),
            &NewMessage {
                sender,
                receiver: None,
                content,
                media,
                reply_to: None,
            },
        )
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single thread with its participant list.
    pub fn get_thread(&self, id: ThreadId) -> Result<Thread> {
        let mut thread = self
            .conn()
            .query_row(
                "SELECT id, creator, title, media, created_at
                 FROM threads WHERE id = ?1",
                params![id.to_string()],
                row_to_thread,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        thread.participants = self.thread_participants(id)?;
        Ok(thread)
    }

    pub fn thread_exists(&self, id: ThreadId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM threads WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_threads(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Threads newest-first, offset-paginated, participants populated.
    pub fn list_threads(&self, limit: u32, offset: u32) -> Result<Vec<Thread>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, creator, title, media, created_at
             FROM threads
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        for thread in &mut threads {
            thread.participants = self.thread_participants(thread.id)?;
        }
        Ok(threads)
    }

    /// Participant ids of a thread in join order.
    pub fn thread_participants(&self, id: ThreadId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM thread_participants
             WHERE thread_id = ?1
             ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            Ok(UserId(parse_uuid_col(0, &user_str)?))
        })?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    // ------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------

    /// Replace a thread's title.  Returns the refreshed thread.
    pub fn update_thread_title(&self, id: ThreadId, title: &str) -> Result<Thread> {
        let affected = self.conn().execute(
            "UPDATE threads SET title = ?2 WHERE id = ?1",
            params![id.to_string(), title],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_thread(id)
    }

    /// Delete a thread and everything it owns: replies first, then the
    /// participant list, then the thread row, all in one transaction.
    ///
    /// Returns the number of replies removed.  If the thread row turns out
    /// to be gone after the children were deleted, the whole transaction is
    /// abandoned and [`StoreError::CascadeIncomplete`] is returned so the
    /// caller can report the inconsistency.
    pub fn delete_thread_cascade(&mut self, id: ThreadId) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;

        let children_removed = tx.execute(
            "DELETE FROM messages WHERE thread_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM thread_participants WHERE thread_id = ?1",
            params![id.to_string()],
        )?;
        let parents_removed = tx.execute(
            "DELETE FROM threads WHERE id = ?1",
            params![id.to_string()],
        )?;

        if parents_removed == 0 {
            // Children before parent is the contract; a missing parent here
            // means the thread vanished between the existence check and this
            // call.  Roll everything back and report it.
            drop(tx);
            return Err(StoreError::CascadeIncomplete { children_removed });
        }

        tx.commit()?;
        tracing::debug!(thread = %id, replies = children_removed, "deleted thread cascade");
        Ok(children_removed)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Multi-field thread search.
    ///
    /// Always matches thread titles; `include_messages` additionally matches
    /// reply content, `include_users` matches participant display names and
    /// emails (the creator is always a participant, so creator matches come
    /// through the join table).  The three match-sets are unioned by thread
    /// id with title > reply > participant priority for the `matched`
    /// annotation, ordered newest-first and offset-paginated.
    ///
    /// Returns the page of hits plus the total size of the union.
    pub fn search_threads(
        &self,
        term: &str,
        include_messages: bool,
        include_users: bool,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ThreadSearchHit>, u64)> {
        let pattern = like_pattern(term);
        let mut matches: HashMap<String, SearchMatch> = HashMap::new();

        // Title hits take priority over everything else.
        {
            let mut stmt = self.conn().prepare(
                "SELECT id FROM threads WHERE lower_unicode(title) LIKE ?1 ESCAPE '\\'",
            )?;
            let rows = stmt.query_map(params![pattern], |row| row.get::<_, String>(0))?;
            for row in rows {
                matches.insert(row?, SearchMatch::Title);
            }
        }

        if include_messages {
            let mut stmt = self.conn().prepare(
                "SELECT thread_id, MIN(id) FROM messages
                 WHERE thread_id IS NOT NULL
                   AND content IS NOT NULL
                   AND lower_unicode(content) LIKE ?1 ESCAPE '\\'
                 GROUP BY thread_id",
            )?;
            let rows = stmt.query_map(params![pattern], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (thread_id, message_id) = row?;
                matches
                    .entry(thread_id)
                    .or_insert(SearchMatch::Reply { message_id });
            }
        }

        if include_users {
            let mut stmt = self.conn().prepare(
                "SELECT DISTINCT tp.thread_id, u.id
                 FROM thread_participants tp
                 JOIN users u ON u.id = tp.user_id
                 WHERE lower_unicode(u.display_name) LIKE ?1 ESCAPE '\\'
                    OR lower_unicode(u.email) LIKE ?1 ESCAPE '\\'",
            )?;
            let rows = stmt.query_map(params![pattern], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (thread_id, user_str) = row?;
                let user = UserId(uuid::Uuid::parse_str(&user_str)?);
                matches
                    .entry(thread_id)
                    .or_insert(SearchMatch::Participant { user_id: user });
            }
        }

        let total = matches.len() as u64;
        if matches.is_empty() {
            return Ok((Vec::new(), 0));
        }

        // Re-query the union with full rows, newest-first, then page.
        let ids: Vec<String> = matches.keys().cloned().collect();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, creator, title, media, created_at
             FROM threads
             WHERE id IN ({placeholders})
             ORDER BY created_at DESC, rowid DESC"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_thread)?;

        let mut all = Vec::new();
        for row in rows {
            all.push(row?);
        }

        let mut hits = Vec::new();
        for mut thread in all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
        {
            thread.participants = self.thread_participants(thread.id)?;
            let matched = matches
                .get(&thread.id.to_string())
                .cloned()
                .unwrap_or(SearchMatch::Title);
            hits.push(ThreadSearchHit { thread, matched });
        }

        Ok((hits, total))
    }
}

/// Map a `rusqlite::Row` to a [`Thread`] (participants filled in later).
fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    let id_str: String = row.get(0)?;
    let creator_str: String = row.get(1)?;
    let title: String = row.get(2)?;
    let media_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(Thread {
        id: ThreadId(parse_uuid_col(0, &id_str)?),
        creator: UserId(parse_uuid_col(1, &creator_str)?),
        title,
        participants: Vec::new(),
        media: parse_media_col(3, &media_str)?,
        created_at: parse_timestamp_col(4, &created_str)?,
    })
}
