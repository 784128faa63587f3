//! Typed query helpers for the `kv_state` table.

use chrono::Utc;
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;

impl Database {
    /// Get a key-value state entry.
    pub fn get_state(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv_state WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(val)) => Ok(Some(val)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Set a key-value state entry (upsert).
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        debug!(key, value, "set kv_state");
        Ok(())
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete_state(&self, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM kv_state WHERE key = ?1", params![key])?;
        debug!(key, removed, "delete kv_state");
        Ok(removed > 0)
    }

    /// All keys starting with `prefix`, in order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT key FROM kv_state WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix, prefix.chars().count() as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Read a JSON-encoded entry.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DatabaseError> {
        match self.get_state(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DatabaseError::CorruptValue {
                    key: key.to_string(),
                    detail: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Store `value` JSON-encoded.
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(value).map_err(|e| DatabaseError::CorruptValue {
            key: key.to_string(),
            detail: e.to_string(),
        })?;
        self.set_state(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn setup_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_kv_state() {
        let db = setup_db();
        assert!(db.get_state("foo").unwrap().is_none());
        db.set_state("foo", "bar").unwrap();
        assert_eq!(db.get_state("foo").unwrap().as_deref(), Some("bar"));
        db.set_state("foo", "baz").unwrap();
        assert_eq!(db.get_state("foo").unwrap().as_deref(), Some("baz"));
        assert!(db.delete_state("foo").unwrap());
        assert!(!db.delete_state("foo").unwrap());
        assert!(db.get_state("foo").unwrap().is_none());
    }

    #[test]
    fn test_prefix_listing_is_literal() {
        let db = setup_db();
        db.set_state("a.b_1", "1").unwrap();
        db.set_state("a.b_2", "2").unwrap();
        db.set_state("a.bx3", "3").unwrap();
        db.set_state("z", "4").unwrap();

        assert_eq!(db.keys_with_prefix("a.b_").unwrap(), vec!["a.b_1", "a.b_2"]);
    }

    #[test]
    fn test_json_values() {
        let db = setup_db();
        db.set_json("setting", &json!({"enabled": false})).unwrap();
        let value: Option<Value> = db.get_json("setting").unwrap();
        assert_eq!(value, Some(json!({"enabled": false})));

        db.set_json("unset", &Value::Null).unwrap();
        let value: Option<Value> = db.get_json("unset").unwrap();
        assert_eq!(value, Some(Value::Null));

        db.set_state("broken", "{not json").unwrap();
        let result: Result<Option<Value>, _> = db.get_json("broken");
        assert!(matches!(result, Err(DatabaseError::CorruptValue { .. })));
    }
}
