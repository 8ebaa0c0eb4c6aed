//! # nido-media
//!
//! The media ingestion adapter: classifies an in-memory byte payload from its
//! MIME type, delegates the bytes to an [`ObjectStorage`] backend, and returns
//! the `{url, kind, format}` descriptor that messages and threads attach.
//!
//! Upload failure is a hard precondition failure for the caller: no message
//! or thread may be created if its media could not be stored.

pub mod ingest;
pub mod mime;
pub mod storage;

mod error;

pub use error::MediaError;
pub use ingest::MediaIngest;
pub use storage::{FsObjectStorage, ObjectStorage};
