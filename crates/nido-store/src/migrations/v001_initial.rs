//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `users` (directory mirror),
//! `conversations`, `threads`, `thread_participants` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (read-only mirror of the external user directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4, assigned by the directory
    display_name TEXT NOT NULL,
    email        TEXT NOT NULL,
    role         TEXT NOT NULL DEFAULT 'member',
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Direct conversations (exactly two participants, stored as the
-- normalized unordered pair: low < high by uuid ordering)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id               TEXT PRIMARY KEY NOT NULL, -- UUID v4
    participant_low  TEXT NOT NULL,
    participant_high TEXT NOT NULL,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_pair
    ON conversations(participant_low, participant_high);

-- ----------------------------------------------------------------
-- Threads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS threads (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    creator    TEXT NOT NULL,
    title      TEXT NOT NULL,
    media      TEXT NOT NULL DEFAULT '[]',    -- JSON array of media descriptors
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS thread_participants (
    thread_id TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    position  INTEGER NOT NULL,               -- preserves join order
    PRIMARY KEY (thread_id, user_id),
    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages
--
-- The integer primary key is the message id; AUTOINCREMENT keeps it
-- strictly increasing, which cursor pagination relies on.  Each
-- message is owned by exactly one aggregate: a conversation XOR a
-- thread.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sender          TEXT NOT NULL,
    receiver        TEXT,                     -- set for direct messages only
    conversation_id TEXT,                     -- owning conversation
    thread_id       TEXT,                     -- owning thread
    content         TEXT,
    media           TEXT NOT NULL DEFAULT '[]',
    reply_to        INTEGER,                  -- may dangle after deletes
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    CHECK ((conversation_id IS NULL) != (thread_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(conversation_id, id DESC);

CREATE INDEX IF NOT EXISTS idx_messages_thread
    ON messages(thread_id, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
