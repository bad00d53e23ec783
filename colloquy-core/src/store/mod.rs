//! Conversation persistence
//!
//! [`DocumentStore`] is the seam to the path-addressed store; the
//! [`ConversationStore`] layers chats, messages and profiles on top of it.

mod conversation;
mod document;

pub use conversation::{ChatListWatch, ConversationStore, MAX_APPEND_ATTEMPTS};
pub use document::{paths, Document, DocumentChange, DocumentStore};
