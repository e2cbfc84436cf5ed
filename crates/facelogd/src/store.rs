//! Durable slot store for the two collections.
//!
//! Each collection lives in one string slot as its full JSON
//! serialization. Slots are read once at startup and rewritten whole on
//! every mutation.

use facelog_core::{AttendanceRecord, User};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

pub const USERS_SLOT: &str = "facelog_users";
pub const RECORDS_SLOT: &str = "facelog_records";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("slot {slot} holds malformed data: {source}")]
    Corrupt {
        slot: &'static str,
        source: serde_json::Error,
    },
    #[error("cannot serialize slot {slot}: {source}")]
    Serialize {
        slot: &'static str,
        source: serde_json::Error,
    },
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "store opened");
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn load_users(&self) -> Result<Vec<User>, StoreError> {
        self.load(USERS_SLOT)
    }

    pub fn load_records(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.load(RECORDS_SLOT)
    }

    pub fn save_users(&self, users: &[User]) -> Result<(), StoreError> {
        self.save(USERS_SLOT, users)
    }

    pub fn save_records(&self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        self.save(RECORDS_SLOT, records)
    }

    /// A missing slot reads as an empty collection.
    fn load<T: DeserializeOwned>(&self, slot: &'static str) -> Result<Vec<T>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM slots WHERE key = ?1", params![slot], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            None => Ok(Vec::new()),
            Some(json) => {
                serde_json::from_str(&json).map_err(|source| StoreError::Corrupt { slot, source })
            }
        }
    }

    fn save<T: Serialize>(&self, slot: &'static str, items: &[T]) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(items).map_err(|source| StoreError::Serialize { slot, source })?;
        self.conn.execute(
            "INSERT INTO slots (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![slot, json],
        )?;
        tracing::debug!(slot, count = items.len(), bytes = json.len(), "slot saved");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, slot: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO slots (key, value) VALUES (?1, ?2)",
            params![slot, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use facelog_core::AttendanceStatus;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: "Ada".into(),
            role: "Analyst".into(),
            registered_at: Utc::now(),
            photo_base64: "QUJD".into(),
        }
    }

    fn record(id: &str, user_id: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: id.into(),
            user_id: user_id.into(),
            user_name: "Ada".into(),
            timestamp: Utc::now(),
            status: AttendanceStatus::Present,
            confidence: 0.91,
            mood: Some("calm".into()),
        }
    }

    #[test]
    fn test_empty_store_loads_empty_collections() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_users().unwrap().is_empty());
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_save_rewrites_whole_slot() {
        let store = Store::open_in_memory().unwrap();
        store.save_users(&[user("a"), user("b")]).unwrap();
        store.save_users(&[user("c")]).unwrap();
        let users = store.load_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "c");
    }

    #[test]
    fn test_collections_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("attendance.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_users(&[user("u1")]).unwrap();
            store.save_records(&[record("r1", "u1")]).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.load_users().unwrap()[0].id, "u1");
        let records = store.load_records().unwrap();
        assert_eq!(records[0].id, "r1");
        assert_eq!(records[0].mood.as_deref(), Some("calm"));
    }

    #[test]
    fn test_corrupt_slot_is_reported() {
        let store = Store::open_in_memory().unwrap();
        store.put_raw(RECORDS_SLOT, "{not json").unwrap();
        assert!(matches!(
            store.load_records(),
            Err(StoreError::Corrupt { slot: RECORDS_SLOT, .. })
        ));
        assert!(store.load_users().unwrap().is_empty());
    }
}
