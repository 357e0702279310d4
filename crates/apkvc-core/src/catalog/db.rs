//! SQLite catalog database
//!
//! One `artifacts` table. The shared partition stores its client as `''` so
//! `UNIQUE(client, stored_file_name)` covers it too.

use std::path::{Path, PathBuf};

use apkvc_schema::{ArtifactRecord, ListFilter, NewArtifact};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, Row, params};

use super::CatalogError;

const COLUMNS: &str =
    "id, name, version, client, size_bytes, created_at, storage_path, stored_file_name";

/// Catalog database connection. Not `Sync`; see [`super::DatabaseCatalog`].
#[derive(Debug)]
pub struct CatalogDb {
    conn: Connection,
}

impl CatalogDb {
    /// Open or create the catalog at `path`.
    pub fn open_at(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Private in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                client TEXT NOT NULL DEFAULT '',
                size_bytes INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                storage_path TEXT NOT NULL,
                stored_file_name TEXT NOT NULL,
                UNIQUE (client, stored_file_name)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_created_at ON artifacts(created_at);
            CREATE INDEX IF NOT EXISTS idx_artifacts_name ON artifacts(name);
            ",
        )?;
        Ok(())
    }

    /// Insert a record in its own transaction.
    pub fn insert(&mut self, artifact: &NewArtifact) -> Result<ArtifactRecord, CatalogError> {
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO artifacts
                (name, version, client, size_bytes, created_at, storage_path, stored_file_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                artifact.name,
                artifact.version,
                artifact.client.as_deref().unwrap_or(""),
                artifact.size_bytes,
                artifact.created_at.timestamp_micros(),
                artifact.storage_path.to_string_lossy().into_owned(),
                artifact.stored_file_name,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(CatalogError::Duplicate {
                    client: artifact.client.clone(),
                    stored_file_name: artifact.stored_file_name.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(artifact.clone().into_record(id))
    }

    /// Get a record by id.
    pub fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CatalogError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM artifacts WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(record_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Every record, in id order.
    pub fn all(&self) -> Result<Vec<ArtifactRecord>, CatalogError> {
        self.query(&ListFilter::default())
    }

    /// Records matching `filter`, in id order.
    pub fn query(&self, filter: &ListFilter) -> Result<Vec<ArtifactRecord>, CatalogError> {
        let filter = filter.normalized();
        let name = filter.name.as_deref().map(like_pattern);
        let client = filter.client.as_deref().map(like_pattern);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM artifacts
             WHERE (?1 IS NULL OR version = ?1)
               AND (?2 IS NULL OR lower(name) LIKE ?2 ESCAPE '\\')
               AND (?3 IS NULL OR (client <> '' AND lower(client) LIKE ?3 ESCAPE '\\'))
             ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![filter.version, name, client], |row| {
            Ok(record_from_row(row))
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }

    /// Delete a record in its own transaction. Returns whether it existed.
    pub fn delete(&mut self, id: i64) -> Result<bool, CatalogError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM artifacts WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

fn record_from_row(row: &Row<'_>) -> Result<ArtifactRecord, CatalogError> {
    let id: i64 = row.get(0)?;
    let client: String = row.get(3)?;
    let micros: i64 = row.get(5)?;
    let storage_path: String = row.get(6)?;

    let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| CatalogError::Corrupt(format!("artifact {id} has created_at {micros}")))?;

    Ok(ArtifactRecord {
        id,
        name: row.get(1)?,
        version: row.get(2)?,
        client: (!client.is_empty()).then_some(client),
        size_bytes: row.get(4)?,
        created_at,
        storage_path: PathBuf::from(storage_path),
        stored_file_name: row.get(7)?,
    })
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
