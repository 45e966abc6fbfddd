use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::models::Document;

/// SQLite-backed durable storage.
///
/// Holds two things: the key-value table the local caches persist into, and
/// the `documents` table behind the development document store. Cloning is
/// cheap and clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS local_storage (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS documents (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_key
                    ON documents(collection, id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Key-value storage ---

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    /// Read and decode a JSON value. `Ok(None)` when the key is absent, `Err`
    /// when the stored payload does not parse.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt value under storage key '{key}'"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to encode value for storage key '{key}'"))?;
        self.set_item(key, &raw)
    }

    // --- Document collections ---

    pub fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY seq")?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, data)| {
                let fields = serde_json::from_str(&data)
                    .with_context(|| format!("Corrupt document {collection}/{id}"))?;
                Ok(Document { id, fields })
            })
            .collect()
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        read_document(&self.conn(), collection, id)
    }

    pub fn insert_document(&self, collection: &str, doc: &Document) -> Result<()> {
        let data = serde_json::to_string(&doc.fields)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO documents (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![collection, doc.id, data, now],
            )
            .with_context(|| format!("Failed to insert document {collection}/{}", doc.id))?;
        Ok(())
    }

    /// Read, modify and write back one document while holding the connection,
    /// so concurrent patches to the same document never interleave.
    pub fn update_document(
        &self,
        collection: &str,
        id: &str,
        apply: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<Option<Document>> {
        let conn = self.conn();
        let Some(mut doc) = read_document(&conn, collection, id)? else {
            return Ok(None);
        };
        apply(&mut doc.fields);
        let data = serde_json::to_string(&doc.fields)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE documents SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
            params![data, now, collection, id],
        )
        .with_context(|| format!("Failed to update document {collection}/{id}"))?;
        Ok(Some(doc))
    }

    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(rows > 0)
    }
}

fn read_document(conn: &Connection, collection: &str, id: &str) -> Result<Option<Document>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(data) = data else {
        return Ok(None);
    };
    let fields = serde_json::from_str(&data)
        .with_context(|| format!("Corrupt document {collection}/{id}"))?;
    Ok(Some(Document {
        id: id.to_string(),
        fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, name: &str) -> Document {
        let mut fields = serde_json::Map::new();
        fields.insert("name".to_string(), json!(name));
        Document {
            id: id.to_string(),
            fields,
        }
    }

    #[test]
    fn test_item_set_get_remove() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_item("k").unwrap().is_none());

        db.set_item("k", "one").unwrap();
        assert_eq!(db.get_item("k").unwrap().as_deref(), Some("one"));

        // Overwrite
        db.set_item("k", "two").unwrap();
        assert_eq!(db.get_item("k").unwrap().as_deref(), Some("two"));

        assert!(db.remove_item("k").unwrap());
        assert!(db.get_item("k").unwrap().is_none());
        assert!(!db.remove_item("k").unwrap());
    }

    #[test]
    fn test_json_round_trip_and_corrupt_payload() {
        let db = Database::open_in_memory().unwrap();
        db.set_json("list", &vec![1, 2, 3]).unwrap();
        let list: Vec<i32> = db.get_json("list").unwrap().unwrap();
        assert_eq!(list, vec![1, 2, 3]);

        let missing: Option<Vec<i32>> = db.get_json("missing").unwrap();
        assert!(missing.is_none());

        db.set_item("list", "[1, 2,").unwrap();
        assert!(db.get_json::<Vec<i32>>("list").is_err());
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        db.set_item("shared", "yes").unwrap();
        assert_eq!(other.get_item("shared").unwrap().as_deref(), Some("yes"));
    }

    #[test]
    fn test_documents_crud_keeps_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document("recipes", &doc("b", "Second")).unwrap();
        db.insert_document("recipes", &doc("a", "First")).unwrap();
        db.insert_document("other", &doc("c", "Elsewhere")).unwrap();

        let docs = db.list_documents("recipes").unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let renamed = db
            .update_document("recipes", "a", |fields| {
                fields.insert("name".to_string(), json!("Renamed"));
            })
            .unwrap()
            .unwrap();
        assert_eq!(renamed.fields["name"], "Renamed");
        let a = db.get_document("recipes", "a").unwrap().unwrap();
        assert_eq!(a.fields["name"], "Renamed");
        assert_eq!(db.list_documents("recipes").unwrap()[1].id, "a");

        assert!(db.update_document("recipes", "zzz", |_| {}).unwrap().is_none());

        assert!(db.delete_document("recipes", "b").unwrap());
        assert!(!db.delete_document("recipes", "b").unwrap());
        assert_eq!(db.list_documents("recipes").unwrap().len(), 1);
        assert_eq!(db.list_documents("other").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_document_id_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document("recipes", &doc("a", "One")).unwrap();
        assert!(db.insert_document("recipes", &doc("a", "Two")).is_err());
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookoo.db");
        {
            let db = Database::open(&path).unwrap();
            db.set_item("k", "v").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
