//! # nido-shared
//!
//! Types shared between the Nido chat server and its clients: typed
//! identifiers, the JSON event protocol, the media descriptor model and the
//! closed chat error taxonomy.

pub mod b64;
pub mod error;
pub mod events;
pub mod media;
pub mod types;
pub mod views;

pub use error::{ChatError, ErrorEvent};
pub use events::{ClientEvent, ServerEvent};
pub use media::{MediaDescriptor, MediaKind};
pub use types::{ConversationId, MessageId, ThreadId, UserId};
