//! Conversation storage on top of a [`DocumentStore`].
//!
//! Layout:
//! - `users/{uid}`: [`UserProfile`]
//! - `users/{uid}/chats/{chatId}`: [`Chat`] with its full message array
//!
//! Appends re-read the chat, push the message and write back with
//! compare-and-swap on the document version. A writer that loses the race
//! re-reads and tries again, so two views appending to the same chat never
//! drop each other's messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::document::{paths, Document, DocumentChange, DocumentStore};
use crate::error::{Error, Result};
use crate::types::{Chat, Message, Role, UserProfile};

/// How many times an append re-reads after losing a compare-and-swap
pub const MAX_APPEND_ATTEMPTS: usize = 5;

/// Chats and profiles for every user, backed by a document store
#[derive(Clone)]
pub struct ConversationStore {
    docs: Arc<dyn DocumentStore>,
}

impl ConversationStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    /// The underlying document store
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.docs
    }

    // ============================================
    // Profiles
    // ============================================

    /// Read the profile stored for `uid`
    pub fn profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        match self.docs.read(&paths::user(uid)?)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc.value)?)),
            None => Ok(None),
        }
    }

    /// Replace the profile stored for `uid`
    pub fn save_profile(&self, uid: &str, profile: &UserProfile) -> Result<()> {
        self.docs
            .write(&paths::user(uid)?, &serde_json::to_value(profile)?)
    }

    /// Record a successful sign-in
    pub fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> Result<()> {
        self.docs
            .update(&paths::user(uid)?, &json!({ "lastLogin": at }))
    }

    // ============================================
    // Chats
    // ============================================

    /// Create an empty chat for `uid` and return its id
    pub fn create_chat(&self, uid: &str) -> Result<String> {
        let chat = Chat::new(Utc::now());
        let id = self
            .docs
            .push(&paths::chats(uid)?, &serde_json::to_value(&chat)?)?;
        tracing::info!(uid, chat_id = %id, "Created chat");
        Ok(id)
    }

    /// Append a message to a chat and return the updated record.
    pub fn append_message(
        &self,
        uid: &str,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Chat> {
        let path = paths::chat(uid, chat_id)?;

        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let doc = self
                .docs
                .read(&path)?
                .ok_or_else(|| Error::ChatNotFound(chat_id.to_string()))?;
            let mut chat = decode_chat(&doc)?;

            let now = Utc::now();
            chat.push_message(Message {
                role,
                content: content.to_string(),
                timestamp: now,
            });
            chat.updated_at = now.max(chat.created_at);

            if self
                .docs
                .compare_and_swap(&path, doc.version, &serde_json::to_value(&chat)?)?
            {
                tracing::debug!(
                    chat_id,
                    role = %role,
                    messages = chat.messages.len(),
                    "Appended message"
                );
                return Ok(chat);
            }

            tracing::debug!(attempt, path = %path, "Chat changed during append, retrying");
        }

        tracing::warn!(path = %path, "Giving up on append after repeated conflicts");
        Err(Error::WriteConflict {
            path,
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }

    /// Load a chat for rendering
    pub fn load_chat(&self, uid: &str, chat_id: &str) -> Result<Chat> {
        let doc = self
            .docs
            .read(&paths::chat(uid, chat_id)?)?
            .ok_or_else(|| Error::ChatNotFound(chat_id.to_string()))?;
        decode_chat(&doc)
    }

    /// All chats for `uid`, most recently active first.
    ///
    /// Records that fail to decode are skipped and logged rather than
    /// hiding every other chat.
    pub fn list_chats(&self, uid: &str) -> Result<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .docs
            .children(&paths::chats(uid)?)?
            .iter()
            .filter_map(|doc| match decode_chat(doc) {
                Ok(chat) => Some(chat),
                Err(e) => {
                    tracing::warn!(path = %doc.path, error = %e, "Skipping unreadable chat");
                    None
                }
            })
            .collect();
        chats.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(chats)
    }

    /// Live chat list for `uid`.
    ///
    /// The first call to [`ChatListWatch::next`] yields the current list;
    /// later calls wait for a change below the user's chats path.
    pub fn watch_chats(&self, uid: &str) -> Result<ChatListWatch> {
        Ok(ChatListWatch {
            prefix: paths::chats(uid)?,
            uid: uid.to_string(),
            rx: self.docs.subscribe(),
            store: self.clone(),
            primed: false,
        })
    }
}

fn decode_chat(doc: &Document) -> Result<Chat> {
    let mut chat: Chat = serde_json::from_value(doc.value.clone())?;
    chat.id = doc.key().to_string();
    Ok(chat)
}

/// Push-based view of one user's chat list
pub struct ChatListWatch {
    store: ConversationStore,
    uid: String,
    prefix: String,
    rx: broadcast::Receiver<DocumentChange>,
    primed: bool,
}

impl ChatListWatch {
    /// Wait for the next version of the list.
    ///
    /// Returns `None` once the store has shut down.
    pub async fn next(&mut self) -> Option<Result<Vec<Chat>>> {
        if !self.primed {
            self.primed = true;
            return Some(self.store.list_chats(&self.uid));
        }

        loop {
            match self.rx.recv().await {
                Ok(change) if change.is_under(&self.prefix) => {
                    return Some(self.store.list_chats(&self.uid));
                }
                Ok(_) => continue,
                // Missed notifications; the list itself is still readable.
                Err(RecvError::Lagged(_)) => return Some(self.store.list_chats(&self.uid)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant for polling front ends.
    ///
    /// Drains pending notifications and returns a fresh list only if one of
    /// them touched this user's chats.
    pub fn try_next(&mut self) -> Option<Result<Vec<Chat>>> {
        let mut changed = !self.primed;
        self.primed = true;

        loop {
            match self.rx.try_recv() {
                Ok(change) => changed |= change.is_under(&self.prefix),
                Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        changed.then(|| self.store.list_chats(&self.uid))
    }
}
