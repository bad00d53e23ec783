//! Database layer for colloquy
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - A path-addressed document table with versioned writes
//! - Accounts for the local identity provider

pub mod repo;
pub mod schema;

pub use repo::{AccountRecord, Database};
