//! Path-addressed document store seam.
//!
//! Records are JSON values stored at slash-separated paths
//! (`users/{uid}`, `users/{uid}/chats/{chatId}`). The SQLite-backed
//! [`Database`](crate::db::Database) is the shipped implementation; anything
//! with the same read/write/push/subscribe surface can stand in for it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{Error, Result};

/// A stored record and its bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub value: Value,
    /// Incremented on every write; used for compare-and-swap
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// The last path segment (the record's key under its parent)
    pub fn key(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Notification that the record at `path` changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub path: String,
}

impl DocumentChange {
    /// True if the change is at `prefix` or anywhere below it
    pub fn is_under(&self, prefix: &str) -> bool {
        self.path == prefix
            || (self.path.starts_with(prefix) && self.path[prefix.len()..].starts_with('/'))
    }
}

/// Path-addressed JSON document storage.
///
/// Every method is synchronous; implementations are expected to be cheap
/// local calls or to do their own blocking.
pub trait DocumentStore: Send + Sync {
    /// Read the record at `path`
    fn read(&self, path: &str) -> Result<Option<Document>>;

    /// Replace (or create) the record at `path`
    fn write(&self, path: &str, value: &Value) -> Result<()>;

    /// Shallow-merge the keys of `partial` into the record at `path`,
    /// creating it when absent
    fn update(&self, path: &str, partial: &Value) -> Result<()>;

    /// Store `value` under a freshly generated key below `parent`; returns the key
    fn push(&self, parent: &str, value: &Value) -> Result<String>;

    /// Replace the record only if its version still equals `expected_version`.
    /// Returns false when another writer got there first.
    fn compare_and_swap(&self, path: &str, expected_version: i64, value: &Value) -> Result<bool>;

    /// Direct children of `parent`, oldest first
    fn children(&self, parent: &str) -> Result<Vec<Document>>;

    /// Receive a [`DocumentChange`] after every successful write
    fn subscribe(&self) -> broadcast::Receiver<DocumentChange>;
}

/// Path builders for the records colloquy stores.
pub mod paths {
    use super::*;

    /// `users/{uid}`
    pub fn user(uid: &str) -> Result<String> {
        Ok(format!("users/{}", segment(uid)?))
    }

    /// `users/{uid}/chats`
    pub fn chats(uid: &str) -> Result<String> {
        Ok(format!("users/{}/chats", segment(uid)?))
    }

    /// `users/{uid}/chats/{chat_id}`
    pub fn chat(uid: &str, chat_id: &str) -> Result<String> {
        Ok(format!("users/{}/chats/{}", segment(uid)?, segment(chat_id)?))
    }

    /// Everything before the last `/`, or the empty string for top-level paths
    pub fn parent_of(path: &str) -> &str {
        path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }

    fn segment(s: &str) -> Result<&str> {
        if s.is_empty() || s.contains('/') {
            return Err(Error::Validation(format!("invalid path segment: {:?}", s)));
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(paths::user("u1").unwrap(), "users/u1");
        assert_eq!(paths::chats("u1").unwrap(), "users/u1/chats");
        assert_eq!(paths::chat("u1", "c9").unwrap(), "users/u1/chats/c9");
        assert!(paths::chat("u1", "a/b").is_err());
        assert!(paths::user("").is_err());
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(paths::parent_of("users/u1/chats/c9"), "users/u1/chats");
        assert_eq!(paths::parent_of("users"), "");
    }

    #[test]
    fn test_change_is_under() {
        let change = DocumentChange {
            path: "users/u1/chats/c9".to_string(),
        };
        assert!(change.is_under("users/u1/chats"));
        assert!(change.is_under("users/u1/chats/c9"));
        assert!(!change.is_under("users/u1/chat"));
        assert!(!change.is_under("users/u2/chats"));
    }
}
