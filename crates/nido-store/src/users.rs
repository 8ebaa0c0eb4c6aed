//! CRUD and search over the user-directory mirror.

use chrono::Utc;
use rusqlite::{params, params_from_iter};

use nido_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{parse_timestamp_col, parse_uuid_col, User};

impl Database {
    /// Insert or replace a directory entry.  Deployments sync the external
    /// user directory through this; tests seed fixtures with it.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO users (id, display_name, email, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.display_name,
                user.email,
                user.role,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Convenience used by seeding and tests: create a member with the
    /// current timestamp.
    pub fn seed_user(&self, id: UserId, display_name: &str, email: &str) -> Result<User> {
        let user = User {
            id,
            display_name: display_name.to_string(),
            email: email.to_string(),
            role: "member".to_string(),
            created_at: Utc::now(),
        };
        self.upsert_user(&user)?;
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, display_name, email, role, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fetch all users among `ids` that exist.  The result may be shorter
    /// than the input; callers use the length difference for diagnostics.
    pub fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, display_name, email, role, created_at
             FROM users WHERE id IN ({placeholders})"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(ids.iter().map(|id| id.to_string())),
            row_to_user,
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Count users whose display name or email contains `term`
    /// (case-insensitive).
    pub fn count_users_matching(&self, term: &str) -> Result<u64> {
        let pattern = like_pattern(term);
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users
             WHERE lower_unicode(display_name) LIKE ?1 ESCAPE '\\'
                OR lower_unicode(email) LIKE ?1 ESCAPE '\\'",
            params![pattern],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Case-insensitive substring search over display name OR email,
    /// offset-paginated, name-ordered.
    pub fn search_users(&self, term: &str, limit: u32, offset: u32) -> Result<Vec<User>> {
        let pattern = like_pattern(term);
        let mut stmt = self.conn().prepare(
            "SELECT id, display_name, email, role, created_at
             FROM users
             WHERE lower_unicode(display_name) LIKE ?1 ESCAPE '\\'
                OR lower_unicode(email) LIKE ?1 ESCAPE '\\'
             ORDER BY display_name ASC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![pattern, limit, offset], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

/// Build a `%term%` LIKE pattern with `\`-escaped wildcards, lowercased
/// with Rust's Unicode tables.  Matched against `lower_unicode(column)`
/// (registered in `database.rs`), never plain `LOWER`, which folds ASCII
/// only.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if c == '%' || c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let role: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(User {
        id: UserId(parse_uuid_col(0, &id_str)?),
        display_name,
        email,
        role,
        created_at: parse_timestamp_col(4, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn seed_and_lookup() {
        let db = test_db();
        let id = UserId::new();
        db.seed_user(id, "Alice", "alice@example.com").unwrap();

        assert!(db.user_exists(id).unwrap());
        assert!(!db.user_exists(UserId::new()).unwrap());

        let user = db.get_user(id).unwrap();
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.role, "member");
    }

    #[test]
    fn get_users_reports_partial_hits() {
        let db = test_db();
        let a = UserId::new();
        db.seed_user(a, "Alice", "alice@example.com").unwrap();

        let found = db.get_users(&[a, UserId::new()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
    }

    #[test]
    fn search_matches_name_or_email_case_insensitive() {
        let db = test_db();
        db.seed_user(UserId::new(), "Alice", "alice@example.com")
            .unwrap();
        db.seed_user(UserId::new(), "Bob", "bob@alicorn.net").unwrap();
        db.seed_user(UserId::new(), "Carol", "carol@example.com")
            .unwrap();

        let hits = db.search_users("ALIC", 10, 0).unwrap();
        // Alice by name, Bob by email domain.
        assert_eq!(hits.len(), 2);
        assert_eq!(db.count_users_matching("alic").unwrap(), 2);
    }

    #[test]
    fn search_folds_case_beyond_ascii() {
        let db = test_db();
        db.seed_user(UserId::new(), "ÉLISE", "elise@example.com")
            .unwrap();

        let hits = db.search_users("élise", 10, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name, "ÉLISE");
        assert_eq!(db.count_users_matching("élise").unwrap(), 1);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }
}
