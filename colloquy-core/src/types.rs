//! Core domain types for colloquy
//!
//! These types are what gets persisted in the document store and passed
//! between the session, store, completion and rendering layers.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Identity** | Who the identity provider says is signed in |
//! | **UserProfile** | Display metadata mirrored into the document store |
//! | **Chat** | A titled, ordered conversation thread owned by one user |
//! | **Message** | One turn in a Chat, authored by the user or the assistant |
//! | **ModelDescriptor** | Static metadata for a remote completion/vision/image model |
//!
//! Stored records use camelCase field names (`createdAt`, `lastLogin`, ...)
//! so documents written by other clients of the same store stay readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to chats before the first exchange completes
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Number of characters of the first user message kept in a chat title
pub const TITLE_PREFIX_CHARS: usize = 50;

// ============================================
// Identity and profile
// ============================================

/// A signed-in identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id assigned by the provider
    pub uid: String,
    /// Email the account was registered with
    pub email: String,
    /// Display name, if the provider knows one
    pub display_name: Option<String>,
}

/// Profile record stored at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// When the profile was first written
    pub created_at: DateTime<Utc>,
    /// Most recent successful sign-in
    pub last_login: DateTime<Utc>,
}

impl UserProfile {
    /// Default profile for an identity that has no stored record yet.
    pub fn for_identity(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            name: identity
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "User".to_string()),
            email: identity.email.clone(),
            created_at: now,
            last_login: now,
        }
    }
}

// ============================================
// Messages and chats
// ============================================

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Returns the identifier used on the wire and in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// One turn in a chat. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation thread stored at `users/{uid}/chats/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Store-assigned key; lives in the path, not the record
    #[serde(skip)]
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Chat {
    /// A fresh, empty chat
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            title: DEFAULT_CHAT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Append a message, retitling after the first exchange.
    ///
    /// The title changes exactly once: when the appended message is the
    /// chat's first assistant reply. Failed replies are never stored, so
    /// user turns before it may outnumber one.
    pub fn push_message(&mut self, message: Message) {
        let retitle = message.role == Role::Assistant
            && !self.messages.iter().any(|m| m.role == Role::Assistant);
        if message.timestamp > self.updated_at {
            self.updated_at = message.timestamp;
        }
        self.messages.push(message);
        if retitle {
            if let Some(first) = self.messages.iter().find(|m| m.role == Role::User) {
                self.title = title_from(&first.content);
            }
        }
    }

    /// Sort key for chat lists (most recent first)
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.max(self.created_at)
    }
}

/// Derive a chat title from the first user message.
///
/// Keeps the first 50 characters and appends `...` when anything was cut.
pub fn title_from(first_message: &str) -> String {
    let mut chars = first_message.chars();
    let prefix: String = chars.by_ref().take(TITLE_PREFIX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

// ============================================
// Models
// ============================================

/// What a model can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Text,
    Vision,
    Image,
}

impl ModelKind {
    /// Returns the identifier used in config and listings
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Text => "text",
            ModelKind::Vision => "vision",
            ModelKind::Image => "image",
        }
    }

    /// Heading used when grouping models for display
    pub fn group_label(&self) -> &'static str {
        match self {
            ModelKind::Text => "Text Models",
            ModelKind::Image => "Image Generation",
            ModelKind::Vision => "Vision Models",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static metadata for a remote model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    /// Provider-qualified id, e.g. `provider-3/deepseek-v3`
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    pub kind: ModelKind,
}
