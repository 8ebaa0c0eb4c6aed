//! Discussion-thread operations: create, reply, rename, cascade delete,
//! listing and multi-field search.
//!
//! Thread mutations and listings are announced to every connection; the
//! invoking connection hears the result through the broadcast like everyone
//! else, so these operations return no separate ack.

use nido_shared::error::ChatError;
use nido_shared::events::{CreateThreadPayload, ReplyToThreadPayload, ServerEvent};
use nido_shared::types::{ThreadId, UserId};
use nido_shared::views::Pagination;
use nido_store::StoreError;

use super::views;
use super::{clamp_limit, normalize_content, page_offset, page_or_first, ChatService};

fn unexpected(e: StoreError) -> ChatError {
    ChatError::Unexpected(e.to_string())
}

impl ChatService {
    /// `create_thread`: validate, upload media, insert the thread with its
    /// participant list, and turn a non-empty opening post into the first
    /// reply.  Broadcasts `thread_created` with the populated thread.
    pub async fn create_thread(&self, payload: CreateThreadPayload) -> Result<(), ChatError> {
        let creator = payload.creator.ok_or(ChatError::Validation {
            missing: vec!["creator".to_string()],
        })?;

        // Everyone referenced must exist in the directory before anything is
        // written.
        let mut referenced = vec![creator];
        for &user in &payload.participants {
            if !referenced.contains(&user) {
                referenced.push(user);
            }
        }
        let found = self
            .store()
            .get_users(&referenced)
            .map_err(unexpected)?
            .len();
        if found < referenced.len() {
            return Err(ChatError::UserNotFound {
                expected: referenced.len(),
                found,
            });
        }

        let title = payload.title.ok_or(ChatError::Validation {
            missing: vec!["title".to_string()],
        })?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::InvalidTitle);
        }

        let media = match payload.media {
            Some(m) => vec![self
                .media()
                .ingest(&m.bytes, &m.mime_type, &m.filename)
                .await
                .map_err(|e| ChatError::MediaUploadFailed(e.to_string()))?],
            None => Vec::new(),
        };

        let view = {
            let mut store = self.store();
            let thread = store
                .create_thread(creator, title, &payload.participants, media)
                .map_err(unexpected)?;

            if let Some(content) = normalize_content(payload.content) {
                store
                    .insert_thread_reply(thread.id, creator, Some(content), Vec::new())
                    .map_err(unexpected)?;
            }

            views::thread_view(&store, &thread, None).map_err(unexpected)?
        };

        tracing::info!(thread = %view.id, %creator, "thread created");
        self.presence()
            .broadcast(ServerEvent::ThreadCreated { thread: view });
        Ok(())
    }

    /// `reply_to_thread`: append a message to a thread and broadcast it.
    pub async fn reply_to_thread(&self, payload: ReplyToThreadPayload) -> Result<(), ChatError> {
        let sender = payload.sender.ok_or(ChatError::Validation {
            missing: vec!["sender".to_string()],
        })?;
        let thread_id = payload.thread_id;

        {
            let store = self.store();
            if !store.thread_exists(thread_id).map_err(unexpected)? {
                return Err(ChatError::ThreadNotFound(thread_id));
            }
            if !store.user_exists(sender).map_err(unexpected)? {
                return Err(ChatError::UserNotFound {
                    expected: 1,
                    found: 0,
                });
            }
        }

        let content = normalize_content(payload.content);
        if content.is_none() && payload.media.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let media = match payload.media {
            Some(m) => vec![self
                .media()
                .ingest(&m.bytes, &m.mime_type, &m.filename)
                .await
                .map_err(|e| ChatError::MediaUploadFailed(e.to_string()))?],
            None => Vec::new(),
        };

        let view = {
            let store = self.store();
            let message = store
                .insert_thread_reply(thread_id, sender, content, media)
                .map_err(unexpected)?;
            views::message_view(&store, &message)
        };

        self.presence().broadcast(ServerEvent::ThreadReplyAdded {
            thread_id,
            message: view,
        });
        Ok(())
    }

    /// `update_thread`: creator-only title change, broadcast with the
    /// refreshed thread.
    pub fn update_thread(
        &self,
        requester: UserId,
        thread_id: ThreadId,
        title: String,
    ) -> Result<(), ChatError> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(ChatError::InvalidTitle);
        }

        let view = {
            let store = self.store();
            let thread = store.get_thread(thread_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::ThreadNotFound(thread_id),
                other => unexpected(other),
            })?;
            if thread.creator != requester {
                return Err(ChatError::Unauthorized(
                    "only the creator can rename a thread".to_string(),
                ));
            }

            let updated = store
                .update_thread_title(thread_id, &title)
                .map_err(|e| ChatError::UpdateFailed(e.to_string()))?;
            views::thread_view(&store, &updated, None)
                .map_err(|e| ChatError::UpdateFailed(e.to_string()))?
        };

        self.presence()
            .broadcast(ServerEvent::ThreadUpdated { thread: view });
        Ok(())
    }

    /// `delete_thread`: creator-only.  Replies go first, then the thread,
    /// in one transaction, so no orphaned replies can survive the delete.
    pub fn delete_thread(&self, requester: UserId, thread_id: ThreadId) -> Result<(), ChatError> {
        {
            let mut store = self.store();
            let thread = store.get_thread(thread_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::ThreadNotFound(thread_id),
                other => unexpected(other),
            })?;
            if thread.creator != requester {
                return Err(ChatError::Unauthorized(
                    "only the creator can delete a thread".to_string(),
                ));
            }

            store
                .delete_thread_cascade(thread_id)
                .map_err(|e| ChatError::DeleteFailed(e.to_string()))?;
        }

        tracing::info!(thread = %thread_id, %requester, "thread deleted");
        self.presence()
            .broadcast(ServerEvent::ThreadDeleted { thread_id });
        Ok(())
    }

    /// `get_threads`: offset-paginated listing, newest first.  Emits the
    /// legacy unpaginated `all_threads` alongside `paginated_threads`; older
    /// clients only understand the former.
    pub fn get_threads(&self, page: Option<u32>, limit: Option<u32>) -> Result<(), ChatError> {
        let page = page_or_first(page);
        let limit = clamp_limit(limit, 10, 50);
        let offset = page_offset(page, limit);

        let (all, paged, total) = {
            let store = self.store();
            let total = store
                .count_threads()
                .map_err(|e| ChatError::FetchFailed(e.to_string()))?;
            let all = store
                .list_threads(u32::MAX, 0)
                .map_err(|e| ChatError::FetchFailed(e.to_string()))?;
            let mut all_views = Vec::with_capacity(all.len());
            for thread in &all {
                all_views.push(
                    views::thread_view(&store, thread, None)
                        .map_err(|e| ChatError::FetchFailed(e.to_string()))?,
                );
            }
            let paged = all_views
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect::<Vec<_>>();
            (all_views, paged, total)
        };

        self.presence()
            .broadcast(ServerEvent::AllThreads { threads: all });
        self.presence().broadcast(ServerEvent::PaginatedThreads {
            threads: paged,
            pagination: Pagination::new(page, limit, total),
        });
        Ok(())
    }

    /// `search_threads`: title matching always on, reply-content and
    /// participant matching behind their flags.  Results are broadcast with
    /// the term echoed back so clients can correlate.
    pub fn search_threads(
        &self,
        term: &str,
        page: Option<u32>,
        limit: Option<u32>,
        include_messages: bool,
        include_users: bool,
    ) -> Result<(), ChatError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(ChatError::Validation {
                missing: vec!["term".to_string()],
            });
        }

        let page = page_or_first(page);
        let limit = clamp_limit(limit, 10, 50);
        let offset = page_offset(page, limit);

        let (threads, total) = {
            let store = self.store();
            let (hits, total) = store
                .search_threads(term, include_messages, include_users, limit, offset)
                .map_err(|e| ChatError::SearchError(e.to_string()))?;

            let mut threads = Vec::with_capacity(hits.len());
            for hit in hits {
                threads.push(
                    views::thread_view(&store, &hit.thread, Some(hit.matched))
                        .map_err(|e| ChatError::SearchError(e.to_string()))?,
                );
            }
            (threads, total)
        };

        self.presence().broadcast(ServerEvent::SearchResults {
            threads,
            pagination: Pagination::new(page, limit, total),
            term: term.to_string(),
        });
        Ok(())
    }
}
