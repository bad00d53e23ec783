//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: path-addressed document store
    r#"
    -- Every record lives at a slash-separated path, e.g.
    --   users/{uid}
    --   users/{uid}/chats/{chatId}
    -- `parent` is the path minus its last segment so children can be listed
    -- without LIKE scans. `version` increments on every write and backs
    -- compare-and-swap updates.

    CREATE TABLE IF NOT EXISTS documents (
        path             TEXT PRIMARY KEY,
        parent           TEXT NOT NULL,
        value            JSON NOT NULL,
        version          INTEGER NOT NULL DEFAULT 1,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent);
    "#,
    // Version 2: local identity provider accounts
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        uid              TEXT PRIMARY KEY,
        email            TEXT NOT NULL UNIQUE COLLATE NOCASE,
        display_name     TEXT,
        password_hash    TEXT NOT NULL,
        disabled         INTEGER NOT NULL DEFAULT 0,
        created_at       DATETIME NOT NULL
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
