//! SQLite-backed document store.
//!
//! Documents are stored as JSON text in the `documents` table. Atomic
//! increments are evaluated by SQLite (`json_set` over `json_extract`), so
//! concurrent increments on the same document never lose updates. Commits run
//! inside one sqlx transaction that first advances `store_clock`, which also
//! takes the write lock before any precondition is checked.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{
    DocRef, Document, DocumentStore, FieldOp, FieldUpdate, Fields, StoreError, Transaction, Write,
};
use crate::db::Database;

const SELECT_COLUMNS: &str = "SELECT collection, id, data, version FROM documents";

/// Document store persisted in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    /// Create a store over an opened (and migrated) database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// JSON path addressing a top-level key, quoted so that any key is literal.
    fn json_path(field: &str) -> String {
        format!("$.\"{}\"", field.replace('"', ""))
    }

    /// Field names that may be inlined into SQL (and hit expression indexes).
    fn is_plain_field(field: &str) -> bool {
        !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn row_to_document(row: &SqliteRow) -> Result<Document, StoreError> {
        let collection: String = row.try_get("collection")?;
        let id: String = row.try_get("id")?;
        let data: String = row.try_get("data")?;
        let version: i64 = row.try_get("version")?;

        let data: Fields = serde_json::from_str(&data)?;
        Ok(Document {
            reference: DocRef::new(collection, id),
            data,
            version: version as u64,
        })
    }

    async fn current_version(
        conn: &mut SqliteConnection,
        doc: &DocRef,
    ) -> Result<Option<u64>, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM documents WHERE collection = ? AND id = ?")
                .bind(doc.collection())
                .bind(doc.id())
                .fetch_optional(&mut *conn)
                .await?;
        Ok(version.map(|v| v as u64))
    }

    async fn apply_write(
        conn: &mut SqliteConnection,
        write: &Write,
        version: i64,
    ) -> Result<(), StoreError> {
        match write {
            Write::Set { doc, data } => {
                let json = serde_json::to_string(data)?;
                sqlx::query(
                    "INSERT INTO documents (collection, id, data, version) VALUES (?, ?, ?, ?)
                     ON CONFLICT(collection, id)
                     DO UPDATE SET data = excluded.data, version = excluded.version",
                )
                .bind(doc.collection())
                .bind(doc.id())
                .bind(json)
                .bind(version)
                .execute(&mut *conn)
                .await?;
            }
            Write::Update { doc, updates } => {
                if updates.is_empty() && Self::current_version(conn, doc).await?.is_none() {
                    return Err(StoreError::NotFound(doc.to_string()));
                }
                for update in updates {
                    Self::apply_field_update(conn, doc, update, version).await?;
                }
            }
            Write::Delete { doc } => {
                sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                    .bind(doc.collection())
                    .bind(doc.id())
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn apply_field_update(
        conn: &mut SqliteConnection,
        doc: &DocRef,
        update: &FieldUpdate,
        version: i64,
    ) -> Result<(), StoreError> {
        let path = Self::json_path(&update.field);
        let result = match &update.op {
            FieldOp::Increment(by) => {
                sqlx::query(
                    "UPDATE documents
                     SET data = json_set(data, ?, COALESCE(json_extract(data, ?), 0) + ?),
                         version = ?
                     WHERE collection = ? AND id = ?",
                )
                .bind(&path)
                .bind(&path)
                .bind(*by)
                .bind(version)
                .bind(doc.collection())
                .bind(doc.id())
                .execute(&mut *conn)
                .await?
            }
            FieldOp::Set(value) => {
                let json = serde_json::to_string(value)?;
                sqlx::query(
                    "UPDATE documents
                     SET data = json_set(data, ?, json(?)),
                         version = ?
                     WHERE collection = ? AND id = ?",
                )
                .bind(&path)
                .bind(json)
                .bind(version)
                .bind(doc.collection())
                .bind(doc.id())
                .execute(&mut *conn)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(doc.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        let sql = format!("{} WHERE collection = ? AND id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(doc.collection())
            .bind(doc.id())
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn set(&self, doc: &DocRef, data: Fields) -> Result<(), StoreError> {
        let mut tx = Transaction::new();
        tx.set(doc.clone(), data);
        self.commit(tx).await
    }

    async fn update(&self, doc: &DocRef, updates: &[FieldUpdate]) -> Result<(), StoreError> {
        let mut tx = Transaction::new();
        tx.update(doc.clone(), updates.to_vec());
        self.commit(tx).await
    }

    async fn delete(&self, doc: &DocRef) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(doc.collection())
            .bind(doc.id())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let sql = format!("{} WHERE collection = ? ORDER BY id", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(collection)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(Self::row_to_document).collect()
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        if !Self::is_plain_field(field) {
            return Err(StoreError::Codec(format!("unsupported query field: {}", field)));
        }

        let sql = format!(
            "{} WHERE collection = ? AND json_extract(data, '$.{}') = ? ORDER BY id",
            SELECT_COLUMNS, field
        );
        let query = sqlx::query(&sql).bind(collection);
        let query = match value {
            Value::String(s) => query.bind(s.clone()),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            other => {
                return Err(StoreError::Codec(format!(
                    "unsupported query value: {}",
                    other
                )))
            }
        };

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(Self::row_to_document).collect()
    }

    async fn commit(&self, tx: Transaction) -> Result<(), StoreError> {
        let mut db_tx = self.db.pool().begin().await?;

        let version: i64 =
            sqlx::query_scalar("UPDATE store_clock SET tick = tick + 1 WHERE id = 1 RETURNING tick")
                .fetch_one(&mut *db_tx)
                .await?;

        for guard in tx.reads() {
            let current = Self::current_version(&mut db_tx, &guard.doc).await?;
            if current != guard.version {
                return Err(StoreError::Conflict(guard.doc.to_string()));
            }
        }

        for write in tx.writes() {
            Self::apply_write(&mut db_tx, write, version).await?;
        }

        db_tx.commit().await?;
        Ok(())
    }
}
