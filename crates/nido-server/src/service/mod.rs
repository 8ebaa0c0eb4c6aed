//! The operation layer behind the event surface.
//!
//! [`ChatService`] owns the store, the media ingestion adapter and a handle
//! to the presence registry.  Every chat operation lives here so it can be
//! exercised without a WebSocket; the connection layer only parses frames
//! and forwards them.
//!
//! Side-effect convention: targeted deliveries and broadcasts happen inside
//! the operation (via the presence registry); the event returned from an
//! operation, if any, is the ack for the invoking connection.

mod messages;
mod threads;
mod views;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nido_media::MediaIngest;
use nido_shared::error::ChatError;
use nido_shared::events::ServerEvent;
use nido_shared::types::UserId;
use nido_store::Database;

use crate::presence::PresenceRegistry;

pub struct ChatService {
    store: Mutex<Database>,
    media: MediaIngest,
    presence: Arc<PresenceRegistry>,
}

impl ChatService {
    pub fn new(store: Database, media: MediaIngest, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            store: Mutex::new(store),
            media,
            presence,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    // SQLite rolls an interrupted transaction back on drop, so a poisoned
    // lock holds no broken state and can be recovered.
    pub(crate) fn store(&self) -> MutexGuard<'_, Database> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn media(&self) -> &MediaIngest {
        &self.media
    }

    /// Whether `user` exists in the user directory.  Used both by the
    /// connection handshake and by per-operation validation.
    pub fn user_exists(&self, user: UserId) -> Result<bool, ChatError> {
        self.store()
            .user_exists(user)
            .map_err(|e| ChatError::Unexpected(e.to_string()))
    }

    /// `search_users`: case-insensitive substring match on display name OR
    /// email, offset-paginated.  Returns only public directory fields.
    pub fn search_users(
        &self,
        term: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ServerEvent, ChatError> {
        let page = page_or_first(page);
        let limit = clamp_limit(limit, 10, 100);
        let offset = page_offset(page, limit);

        let store = self.store();
        let total_users = store
            .count_users_matching(term)
            .map_err(|e| ChatError::SearchFailed(e.to_string()))?;
        let users = store
            .search_users(term, limit, offset)
            .map_err(|e| ChatError::SearchFailed(e.to_string()))?
            .into_iter()
            .map(views::view_of_user)
            .collect();

        let total_pages = if total_users == 0 {
            0
        } else {
            ((total_users + limit as u64 - 1) / limit as u64) as u32
        };

        Ok(ServerEvent::UsersPaginated {
            users,
            total_users,
            total_pages,
            page,
            limit,
        })
    }

    /// The implicit `request_online_users` event: report the current online
    /// set to the requester only.
    pub fn online_users(&self) -> ServerEvent {
        ServerEvent::OnlineUsersChanged {
            online: self.presence.list_online(),
        }
    }
}

/// Clamp an optional requested page size into `1..=max`.
pub(crate) fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Pages are 1-based; anything below 1 is treated as the first page.
pub(crate) fn page_or_first(page: Option<u32>) -> u32 {
    page.unwrap_or(1).max(1)
}

/// Row offset of a 1-based page.  Saturates instead of overflowing, so an
/// absurd page number yields an empty page rather than wrapping around to
/// an arbitrary earlier one.
pub(crate) fn page_offset(page: u32, limit: u32) -> u32 {
    (page - 1).saturating_mul(limit)
}

/// Treat missing and whitespace-only content identically: a message body
/// either has text or it does not.
pub(crate) fn normalize_content(content: Option<String>) -> Option<String> {
    content.filter(|c| !c.trim().is_empty())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn search_users_paginates_with_totals() {
        let (service, _dir) = test_service().await;
        seed(&service, "Alice");
        seed(&service, "Alina");
        seed(&service, "Bob");

        match service.search_users("ali", Some(1), Some(1)).unwrap() {
            ServerEvent::UsersPaginated {
                users,
                total_users,
                total_pages,
                page,
                limit,
            } => {
                assert_eq!(users.len(), 1);
                assert_eq!(total_users, 2);
                assert_eq!(total_pages, 2);
                assert_eq!((page, limit), (1, 1));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_users_never_exposes_sensitive_fields() {
        let (service, _dir) = test_service().await;
        seed(&service, "Alice");

        let event = service.search_users("alice", None, None).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        let user = &json["data"]["users"][0];
        assert!(user.get("password").is_none());
        assert!(user.get("display_name").is_some());
        assert!(user.get("role").is_some());
    }

    #[tokio::test]
    async fn online_users_reflects_presence() {
        let (service, _dir) = test_service().await;
        let user = seed(&service, "Alice");
        let _rx = connect(&service, user);

        match service.online_users() {
            ServerEvent::OnlineUsersChanged { online } => assert_eq!(online, vec![user]),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 50, 100), 50);
        assert_eq!(clamp_limit(Some(0), 50, 100), 1);
        assert_eq!(clamp_limit(Some(500), 50, 100), 100);
        assert_eq!(page_or_first(Some(0)), 1);
        assert_eq!(page_or_first(None), 1);
    }

    #[test]
    fn page_offsets_saturate_instead_of_wrapping() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(u32::MAX, 100), u32::MAX);
    }

    #[test]
    fn content_normalization() {
        assert_eq!(normalize_content(Some("  hi ".into())).as_deref(), Some("  hi "));
        assert_eq!(normalize_content(Some("   ".into())), None);
        assert_eq!(normalize_content(None), None);
    }
}
