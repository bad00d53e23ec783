//! # colloquy-core
//!
//! Core library for colloquy - an LLM chat client.
//!
//! This library provides:
//! - Domain types for profiles, chats, messages and models
//! - A versioned document store on SQLite, with conversation storage on top
//! - A local identity provider and the auth-driven session gate
//! - The completion client with endpoint fallback, web search augmentation
//!   and image upload/generation
//! - The send pipeline and an in-memory transcript for front ends to draw
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A message flows through:
//! - **Search:** optional snippets folded into the prompt
//! - **Completion:** configured endpoints tried from the last healthy one
//! - **Store:** user and assistant turns appended with compare-and-swap
//! - **Render:** entries appended to the view's [`Transcript`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use colloquy_core::{ChatService, Config, ConversationStore, Database};
//!
//! # async fn run() -> colloquy_core::Result<()> {
//! let config = Config::load()?;
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let store = ConversationStore::new(Arc::new(db));
//! let chat = ChatService::from_config(&config, store)?;
//! let mut ctx = chat.context("some-user-id");
//! chat.send_message(&mut ctx, "What's the weather today?").await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use chat::{ChatContext, ChatService, Reply, ReplyRequest, SendOutcome};
pub use completion::{CompletionClient, CompletionError};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use identity::{AuthError, IdentityProvider, LocalIdentityProvider};
pub use image::{ImagePipeline, UploadOutcome};
pub use models::ModelRegistry;
pub use render::{RenderedEntry, RoleStyles, Transcript};
pub use search::SearchAugmenter;
pub use session::{AuthFlow, Screen, SessionGate};
pub use store::{ConversationStore, DocumentStore};
pub use types::*;

// Public modules
pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod identity;
pub mod image;
pub mod logging;
pub mod models;
pub mod render;
pub mod search;
pub mod session;
pub mod store;
pub mod types;
