//! # nido-store
//!
//! SQLite persistence for the Nido messaging core.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! aggregate: the user directory mirror, direct conversations, threads and
//! messages.  Multi-step writes (send-and-link, cascade deletes) run inside
//! a single SQLite transaction so partial state can never leak.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod threads;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use threads::ThreadSearchHit;
