//! Database repository layer
//!
//! SQLite implementation of the document store plus the account table used
//! by the local identity provider.

use crate::error::{Error, Result};
use crate::store::{paths, Document, DocumentChange, DocumentStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Capacity of the change-notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A local account row.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Argon2 PHC string; carries its own salt
    pub password_hash: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<DocumentChange>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets a second colloquy process read while this one writes
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self::with_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    fn notify(&self, path: &str) {
        // No receivers is fine; nobody is watching.
        let _ = self.changes.send(DocumentChange {
            path: path.to_string(),
        });
    }

    // ============================================
    // Document operations
    // ============================================

    fn read_locked(conn: &Connection, path: &str) -> Result<Option<Document>> {
        conn.query_row(
            "SELECT * FROM documents WHERE path = ?",
            [path],
            DocumentRow::from_row,
        )
        .optional()?
        .map(DocumentRow::into_document)
        .transpose()
    }

    fn upsert_locked(conn: &Connection, path: &str, value: &Value) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO documents (path, parent, value, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(path) DO UPDATE SET
                value = excluded.value,
                version = documents.version + 1,
                updated_at = excluded.updated_at
            "#,
            params![path, paths::parent_of(path), value.to_string(), now],
        )?;
        Ok(())
    }

    // ============================================
    // Account operations
    // ============================================

    /// Insert a new account. Fails if the email is already registered.
    pub fn insert_account(&self, account: &AccountRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO accounts (uid, email, display_name, password_hash, disabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                account.uid,
                account.email,
                account.display_name,
                account.password_hash,
                account.disabled,
                account.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up an account by email (case-insensitive)
    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM accounts WHERE email = ?",
            [email],
            Self::row_to_account,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Look up an account by uid
    pub fn get_account(&self, uid: &str) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM accounts WHERE uid = ?",
            [uid],
            Self::row_to_account,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Enable or disable an account
    pub fn set_account_disabled(&self, uid: &str, disabled: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts SET disabled = ?1 WHERE uid = ?2",
            params![disabled, uid],
        )?;
        Ok(changed == 1)
    }

    fn row_to_account(row: &Row) -> rusqlite::Result<AccountRecord> {
        let created_at_str: String = row.get("created_at")?;
        Ok(AccountRecord {
            uid: row.get("uid")?,
            email: row.get("email")?,
            display_name: row.get("display_name")?,
            password_hash: row.get("password_hash")?,
            disabled: row.get("disabled")?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

impl DocumentStore for Database {
    fn read(&self, path: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        Self::read_locked(&conn, path)
    }

    fn write(&self, path: &str, value: &Value) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            Self::upsert_locked(&conn, path, value)?;
        }
        self.notify(path);
        Ok(())
    }

    fn update(&self, path: &str, partial: &Value) -> Result<()> {
        let Value::Object(fields) = partial else {
            return Err(Error::Validation(format!(
                "update of {} needs an object, got {}",
                path, partial
            )));
        };

        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let merged = match Self::read_locked(&tx, path)? {
                Some(Document {
                    value: Value::Object(mut existing),
                    ..
                }) => {
                    for (key, value) in fields {
                        existing.insert(key.clone(), value.clone());
                    }
                    Value::Object(existing)
                }
                _ => partial.clone(),
            };
            Self::upsert_locked(&tx, path, &merged)?;
            tx.commit()?;
        }
        self.notify(path);
        Ok(())
    }

    fn push(&self, parent: &str, value: &Value) -> Result<String> {
        let key = uuid::Uuid::new_v4().simple().to_string();
        let path = format!("{}/{}", parent, key);
        {
            let conn = self.conn.lock().unwrap();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"
                INSERT INTO documents (path, parent, value, version, created_at, updated_at)
                VALUES (?1, ?2, ?3, 1, ?4, ?4)
                "#,
                params![path, parent, value.to_string(), now],
            )?;
        }
        self.notify(&path);
        Ok(key)
    }

    fn compare_and_swap(&self, path: &str, expected_version: i64, value: &Value) -> Result<bool> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                r#"
                UPDATE documents
                SET value = ?1, version = version + 1, updated_at = ?2
                WHERE path = ?3 AND version = ?4
                "#,
                params![
                    value.to_string(),
                    Utc::now().to_rfc3339(),
                    path,
                    expected_version
                ],
            )?
        };
        if changed == 1 {
            self.notify(path);
        }
        Ok(changed == 1)
    }

    fn children(&self, parent: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM documents WHERE parent = ? ORDER BY created_at, path")?;
        let rows = stmt
            .query_map([parent], DocumentRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

/// A documents row whose value is still JSON text
struct DocumentRow {
    path: String,
    value: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get("path")?,
            value: row.get("value")?,
            version: row.get("version")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_document(self) -> Result<Document> {
        Ok(Document {
            value: serde_json::from_str(&self.value)?,
            path: self.path,
            version: self.version,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_write_and_read() {
        let db = test_db();
        db.write("users/u1", &json!({"name": "Ada"})).unwrap();

        let doc = db.read("users/u1").unwrap().unwrap();
        assert_eq!(doc.value["name"], "Ada");
        assert_eq!(doc.version, 1);
        assert_eq!(doc.key(), "u1");

        db.write("users/u1", &json!({"name": "Grace"})).unwrap();
        let doc = db.read("users/u1").unwrap().unwrap();
        assert_eq!(doc.value["name"], "Grace");
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn test_read_missing() {
        let db = test_db();
        assert!(db.read("users/nobody").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let db = test_db();
        db.write("users/u1/chats/c1", &json!({"title": "a"})).unwrap();
        db.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE documents SET value = '{not json' WHERE path = ?",
                ["users/u1/chats/c1"],
            )
            .unwrap();

        assert!(matches!(db.read("users/u1/chats/c1"), Err(Error::Json(_))));
        assert!(matches!(db.children("users/u1/chats"), Err(Error::Json(_))));
    }

    #[test]
    fn test_update_merges_keys() {
        let db = test_db();
        db.write("users/u1", &json!({"name": "Ada", "email": "ada@example.com"}))
            .unwrap();
        db.update("users/u1", &json!({"lastLogin": "2025-01-01T00:00:00Z"}))
            .unwrap();

        let doc = db.read("users/u1").unwrap().unwrap();
        assert_eq!(doc.value["name"], "Ada");
        assert_eq!(doc.value["lastLogin"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn test_update_creates_missing_record() {
        let db = test_db();
        db.update("users/u2", &json!({"lastLogin": "now"})).unwrap();
        assert!(db.read("users/u2").unwrap().is_some());
    }

    #[test]
    fn test_update_rejects_non_object() {
        let db = test_db();
        assert!(db.update("users/u1", &json!(42)).is_err());
    }

    #[test]
    fn test_push_and_children() {
        let db = test_db();
        let a = db.push("users/u1/chats", &json!({"title": "a"})).unwrap();
        let b = db.push("users/u1/chats", &json!({"title": "b"})).unwrap();
        db.push("users/u2/chats", &json!({"title": "other"})).unwrap();
        assert_ne!(a, b);

        let children = db.children("users/u1/chats").unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().any(|d| d.key() == a));
        assert!(children.iter().any(|d| d.key() == b));
    }

    #[test]
    fn test_compare_and_swap() {
        let db = test_db();
        db.write("users/u1/chats/c1", &json!({"n": 1})).unwrap();

        assert!(db
            .compare_and_swap("users/u1/chats/c1", 1, &json!({"n": 2}))
            .unwrap());
        // Stale version loses
        assert!(!db
            .compare_and_swap("users/u1/chats/c1", 1, &json!({"n": 3}))
            .unwrap());

        let doc = db.read("users/u1/chats/c1").unwrap().unwrap();
        assert_eq!(doc.value["n"], 2);
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn test_writes_notify_subscribers() {
        let db = test_db();
        let mut rx = db.subscribe();

        db.write("users/u1", &json!({})).unwrap();
        let key = db.push("users/u1/chats", &json!({})).unwrap();

        assert_eq!(rx.try_recv().unwrap().path, "users/u1");
        assert_eq!(
            rx.try_recv().unwrap().path,
            format!("users/u1/chats/{}", key)
        );
    }

    #[test]
    fn test_account_crud() {
        let db = test_db();
        let account = AccountRecord {
            uid: "u1".to_string(),
            email: "ada@example.com".to_string(),
            display_name: Some("Ada".to_string()),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            disabled: false,
            created_at: Utc::now(),
        };
        db.insert_account(&account).unwrap();
        assert!(db.insert_account(&account).is_err());

        let found = db.get_account_by_email("ADA@example.com").unwrap().unwrap();
        assert_eq!(found.uid, "u1");
        assert!(!found.disabled);

        assert!(db.set_account_disabled("u1", true).unwrap());
        assert!(db.get_account("u1").unwrap().unwrap().disabled);
    }
}
