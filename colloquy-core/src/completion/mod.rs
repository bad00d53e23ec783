//! Completion client
//!
//! Chat, vision and image-generation requests against OpenAI-compatible
//! endpoints, with ordered endpoint fallback and user-facing failure
//! classification.

mod client;
mod error;
pub mod request;

pub use client::{CompletionClient, ProbeResult, SendState};
pub use error::CompletionError;
